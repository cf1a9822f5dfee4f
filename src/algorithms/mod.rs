//! 基站定位算法模块
//!
//! 该模块提供基站定位的数值核心：
//! - 信号强度 → 距离转换（按网络制式参数化的对数距离模型）
//! - 地理坐标与局部平面坐标的相互投影
//! - 线性代数内核（转置、乘法、列主元高斯消元）
//! - 高斯-牛顿多边定位求解器

pub mod cell;
pub mod geodesy;
pub mod linalg;
pub mod multilateration;
pub mod path_loss;
pub mod results;

pub use cell::*;
pub use geodesy::*;
pub use multilateration::*;
pub use path_loss::*;
pub use results::*;
