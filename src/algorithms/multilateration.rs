//! 多边定位求解器
//!
//! 在局部平面投影上做高斯-牛顿非线性最小二乘：
//! - 以第一个观测点为投影参考点
//! - 平面坐标与距离统一除以最大距离，在归一化坐标系中迭代，
//!   残差与雅可比单位一致
//! - 初值取观测点质心
//! - 每步求解 2×2 法方程 JᵗJ·δ = Jᵗr
//! - 迭代预算耗尽时返回当前估计，并标记为未收敛

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::algorithms::linalg::{self, Matrix, Vector, DEFAULT_SINGULAR_EPSILON};
use crate::algorithms::{
    ConvergenceCriterion, GeoPoint, LocalProjection, MultilaterationFix, PlanarFix, PlanarPoint,
};
use crate::error::{LinalgError, SolveError};

/// 至少需要的观测点数量
pub const MIN_OBSERVATIONS: usize = 3;

/// 求解器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// 最大迭代次数
    pub max_iterations: usize,
    /// 收敛阈值，单位由 `convergence` 决定
    pub convergence_threshold: f64,
    /// 收敛判据单位
    pub convergence: ConvergenceCriterion,
    /// 相对奇异容差（乘以 ‖JᵗJ‖∞）
    pub singular_epsilon: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: 100,
            convergence_threshold: 1e-4,
            convergence: ConvergenceCriterion::PlanarMeters,
            singular_epsilon: DEFAULT_SINGULAR_EPSILON,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("最大迭代次数应大于 0".to_string());
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(format!(
                "收敛阈值应为正数，当前为 {}",
                self.convergence_threshold
            ));
        }
        if !(self.singular_epsilon.is_finite() && self.singular_epsilon >= 0.0) {
            return Err(format!(
                "奇异容差应为非负数，当前为 {}",
                self.singular_epsilon
            ));
        }
        Ok(())
    }
}

/// 高斯-牛顿多边定位求解器
///
/// 纯计算、无 I/O、迭代次数有上限，可在任意线程上调用。
#[derive(Clone, Debug, Default)]
pub struct Multilaterator {
    config: SolverConfig,
}

impl Multilaterator {
    pub fn new(config: SolverConfig) -> Self {
        Multilaterator { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// 地理坐标多边定位
    ///
    /// # 参数
    /// - `points`: 观测点，第一个点作为投影参考点
    /// - `distances`: 与观测点一一对应的距离（米）
    pub fn solve(
        &self,
        points: &[GeoPoint],
        distances: &[f64],
    ) -> Result<MultilaterationFix, SolveError> {
        check_input(points.len(), distances.len())?;
        if !LocalProjection::supports_reference(&points[0]) {
            return Err(SolveError::PolarReference {
                latitude: points[0].latitude,
            });
        }

        let projection = LocalProjection::new(points[0]);
        let planar_points: Vec<PlanarPoint> =
            points.iter().map(|p| projection.to_planar(p)).collect();
        debug!(
            "参考点 {}, 平面观测点 {:?}, 距离 {:?}",
            projection.reference(),
            planar_points,
            distances
        );

        let planar = self.solve_planar(&planar_points, distances)?;
        let position = projection.to_geographic(&planar.position);
        debug!("解算结果 {} ({})", position, planar);

        Ok(MultilaterationFix::new(
            position,
            projection.reference(),
            planar,
            points.len(),
        ))
    }

    /// 平面坐标多边定位（坐标与距离单位均为米）
    pub fn solve_planar(
        &self,
        points: &[PlanarPoint],
        distances: &[f64],
    ) -> Result<PlanarFix, SolveError> {
        check_input(points.len(), distances.len())?;

        if distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(SolveError::DegenerateInput);
        }
        let max_distance = distances.iter().copied().fold(0.0, f64::max);
        if max_distance <= 0.0 {
            return Err(SolveError::DegenerateInput);
        }

        let scale = 1.0 / max_distance;
        let normalized_points: Vec<PlanarPoint> = points.iter().map(|p| p.scale(scale)).collect();
        let normalized_distances: Vec<f64> = distances.iter().map(|d| d * scale).collect();

        let mut estimate =
            PlanarPoint::centroid(&normalized_points).ok_or(SolveError::DegenerateInput)?;
        trace!("初始估计 {:?}", estimate.scale(max_distance));

        let n = normalized_points.len();
        let mut iterations = 0;
        let mut converged = false;
        let mut last_step = f64::INFINITY;

        while iterations < self.config.max_iterations {
            let iteration = iterations;
            let mut jacobian = Matrix::zeros(n, 2);
            let mut residuals = Vector::zeros(n);

            for (i, (point, target)) in normalized_points
                .iter()
                .zip(normalized_distances.iter())
                .enumerate()
            {
                let dx = estimate.x - point.x;
                let dy = estimate.y - point.y;
                let dist = dx.hypot(dy);
                if dist == 0.0 {
                    return Err(SolveError::DegenerateGeometry {
                        iteration,
                        point: i,
                    });
                }
                jacobian[(i, 0)] = dx / dist;
                jacobian[(i, 1)] = dy / dist;
                residuals[i] = target - dist;
            }

            let jacobian_t = linalg::transpose(&jacobian);
            let jtj = linalg::multiply(&jacobian_t, &jacobian)?;
            let jtr = linalg::multiply_vector(&jacobian_t, &residuals)?;

            let delta = linalg::solve(&jtj, &jtr, self.config.singular_epsilon).map_err(
                |err| match err {
                    LinalgError::SingularSystem { .. } => SolveError::SingularSystem { iteration },
                    other => SolveError::Linalg(other),
                },
            )?;

            estimate = PlanarPoint::new(estimate.x + delta[0], estimate.y + delta[1]);
            iterations += 1;

            let step = delta[0].hypot(delta[1]);
            last_step = step * max_distance;
            trace!(
                "第 {} 次迭代: 估计 {:?}, 步长 {:.3e} m",
                iteration,
                estimate.scale(max_distance),
                last_step
            );

            let step_in_criterion_units = match self.config.convergence {
                ConvergenceCriterion::PlanarMeters => last_step,
                ConvergenceCriterion::Normalized => step,
            };
            if step_in_criterion_units < self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        if converged {
            debug!("{} 次迭代后收敛", iterations);
        } else {
            debug!(
                "迭代 {} 次未收敛，最后步长 {:.3e} m，返回当前估计",
                iterations, last_step
            );
        }

        let residual_rms_normalized = residual_rms(&normalized_points, &normalized_distances, &estimate);

        Ok(PlanarFix {
            position: estimate.scale(max_distance),
            iterations,
            converged,
            criterion: self.config.convergence,
            last_step_m: last_step,
            residual_rms_m: residual_rms_normalized * max_distance,
            residual_rms_normalized,
            max_distance_m: max_distance,
        })
    }
}

fn check_input(points: usize, distances: usize) -> Result<(), SolveError> {
    if points < MIN_OBSERVATIONS || points != distances {
        return Err(SolveError::InsufficientInput { points, distances });
    }
    Ok(())
}

fn residual_rms(points: &[PlanarPoint], distances: &[f64], estimate: &PlanarPoint) -> f64 {
    let sum: f64 = points
        .iter()
        .zip(distances)
        .map(|(p, d)| (d - p.distance_to(estimate)).powi(2))
        .sum();
    (sum / points.len() as f64).sqrt()
}
