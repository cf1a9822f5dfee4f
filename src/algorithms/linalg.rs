//! 线性代数内核
//!
//! 矩阵存储使用 nalgebra 的动态矩阵；线性方程组求解采用
//! 列主元高斯消元，奇异判定的容差与矩阵无穷范数成比例。

use nalgebra::{DMatrix, DVector};

use crate::error::LinalgError;

pub type Matrix = DMatrix<f64>;
pub type Vector = DVector<f64>;

/// 默认相对奇异容差
pub const DEFAULT_SINGULAR_EPSILON: f64 = 1e-12;

pub fn transpose(matrix: &Matrix) -> Matrix {
    matrix.transpose()
}

/// 矩阵 × 矩阵
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix, LinalgError> {
    if a.ncols() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            op: "multiply",
            left: a.shape(),
            right: b.shape(),
        });
    }
    Ok(a * b)
}

/// 矩阵 × 向量
pub fn multiply_vector(a: &Matrix, v: &Vector) -> Result<Vector, LinalgError> {
    if a.ncols() != v.len() {
        return Err(LinalgError::DimensionMismatch {
            op: "multiply_vector",
            left: a.shape(),
            right: v.shape(),
        });
    }
    Ok(a * v)
}

/// 无穷范数（最大行绝对值和）
pub fn infinity_norm(matrix: &Matrix) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// 求解 A·x = b
///
/// 列主元高斯消元：每一列选绝对值最大的主元并交换行，
/// 消元后回代。主元满足 `|pivot| <= epsilon · ‖A‖∞` 时判定为奇异。
pub fn solve(a: &Matrix, b: &Vector, epsilon: f64) -> Result<Vector, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            op: "solve",
            left: a.shape(),
            right: b.shape(),
        });
    }

    let tolerance = epsilon * infinity_norm(a);
    let mut augmented = Matrix::from_fn(n, n + 1, |i, j| if j < n { a[(i, j)] } else { b[i] });

    for col in 0..n {
        let mut pivot_row = col;
        for row in col + 1..n {
            if augmented[(row, col)].abs() > augmented[(pivot_row, col)].abs() {
                pivot_row = row;
            }
        }

        let pivot = augmented[(pivot_row, col)];
        if pivot.abs() <= tolerance || !pivot.is_finite() {
            return Err(LinalgError::SingularSystem {
                column: col,
                pivot,
                tolerance,
            });
        }
        augmented.swap_rows(col, pivot_row);

        for row in col + 1..n {
            let factor = augmented[(row, col)] / augmented[(col, col)];
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                augmented[(row, k)] -= factor * augmented[(col, k)];
            }
        }
    }

    let mut x = Vector::zeros(n);
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| augmented[(i, j)] * x[j]).sum();
        x[i] = (augmented[(i, n)] - tail) / augmented[(i, i)];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose() {
        let m = Matrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = transpose(&m);
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t[(2, 0)], 3.0);
        assert_eq!(t[(0, 1)], 4.0);
    }

    #[test]
    fn test_multiply() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_row_slice(2, 1, &[5.0, 6.0]);
        let c = multiply(&a, &b).unwrap();
        assert_eq!(c[(0, 0)], 17.0);
        assert_eq!(c[(1, 0)], 39.0);

        let v = Vector::from_vec(vec![5.0, 6.0]);
        let w = multiply_vector(&a, &v).unwrap();
        assert_eq!(w, Vector::from_vec(vec![17.0, 39.0]));
    }

    #[test]
    fn test_multiply_dimension_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        assert!(matches!(
            multiply(&a, &b),
            Err(LinalgError::DimensionMismatch { op: "multiply", .. })
        ));
        assert!(multiply_vector(&a, &Vector::zeros(2)).is_err());
    }

    #[test]
    fn test_solve_requires_pivoting() {
        // 第一列首元素为零，必须换行
        let a = Matrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let expected = Vector::from_vec(vec![1.0, -2.0, 3.0]);
        let b = &a * &expected;
        let x = solve(&a, &b, DEFAULT_SINGULAR_EPSILON).unwrap();
        for i in 0..3 {
            assert!((x[i] - expected[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_solve_singular() {
        let a = Matrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 0.0]);
        let b = Vector::from_vec(vec![1.0, 0.0]);
        assert!(matches!(
            solve(&a, &b, DEFAULT_SINGULAR_EPSILON),
            Err(LinalgError::SingularSystem { column: 1, .. })
        ));
    }

    #[test]
    fn test_solve_tolerance_scales_with_norm() {
        // 秩亏矩阵经浮点运算后残留极小主元，也应判定为奇异
        let a = Matrix::from_row_slice(2, 2, &[1e6, 2e6, 0.5e6, 1e6 + 1e-7]);
        let b = Vector::from_vec(vec![1.0, 1.0]);
        assert!(solve(&a, &b, 1e-12).is_err());

        // 整体缩放的良态矩阵不受影响
        let small = Matrix::from_row_slice(2, 2, &[2e-9, 0.0, 0.0, 4e-9]);
        let x = solve(&small, &Vector::from_vec(vec![2e-9, 4e-9]), 1e-12).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_zero_matrix() {
        let a = Matrix::zeros(2, 2);
        assert!(solve(&a, &Vector::zeros(2), DEFAULT_SINGULAR_EPSILON).is_err());
    }
}
