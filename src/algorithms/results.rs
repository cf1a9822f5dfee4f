//! 定位结果数据结构
//!
//! 包含解算位置以及收敛状态、残差等质量信息

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::algorithms::{GeoPoint, PlanarPoint};

/// 收敛判据所使用的单位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceCriterion {
    /// 以平面坐标中的步长（米）判断
    #[default]
    PlanarMeters,
    /// 以距离归一化坐标中的步长（无量纲）判断
    Normalized,
}

impl fmt::Display for ConvergenceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceCriterion::PlanarMeters => f.write_str("m"),
            ConvergenceCriterion::Normalized => f.write_str("normalized"),
        }
    }
}

/// 平面坐标系下的解算结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarFix {
    /// 估计位置（米）
    pub position: PlanarPoint,
    /// 实际迭代次数
    pub iterations: usize,
    /// 是否在迭代预算内满足收敛判据
    pub converged: bool,
    /// 本次解算使用的收敛判据
    pub criterion: ConvergenceCriterion,
    /// 最后一步的步长（米）
    pub last_step_m: f64,
    /// 距离残差均方根（米）
    pub residual_rms_m: f64,
    /// 距离残差均方根（以最大距离归一化）
    pub residual_rms_normalized: f64,
    /// 归一化所用的最大距离（米）
    pub max_distance_m: f64,
}

impl fmt::Display for PlanarFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} 次迭代, {}, RMS {:.2} m]",
            self.position,
            self.iterations,
            if self.converged { "已收敛" } else { "未收敛" },
            self.residual_rms_m
        )
    }
}

/// 多边定位结果（地理坐标）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultilaterationFix {
    /// 估计位置
    pub position: GeoPoint,
    /// 投影参考点（第一个观测点）
    pub reference: GeoPoint,
    /// 平面解算细节
    pub planar: PlanarFix,
    /// 观测点数量
    pub observation_count: usize,
    /// 解算时间
    pub timestamp: DateTime<Utc>,
}

impl MultilaterationFix {
    pub fn new(
        position: GeoPoint,
        reference: GeoPoint,
        planar: PlanarFix,
        observation_count: usize,
    ) -> Self {
        MultilaterationFix {
            position,
            reference,
            planar,
            observation_count,
            timestamp: Utc::now(),
        }
    }

    pub fn converged(&self) -> bool {
        self.planar.converged
    }

    pub fn iterations(&self) -> usize {
        self.planar.iterations
    }

    pub fn residual_rms_m(&self) -> f64 {
        self.planar.residual_rms_m
    }

    /// 获取详细描述
    pub fn detailed_description(&self) -> String {
        format!(
            "位置: {}, 参考点: {}, 平面: {}, 观测数: {}, 收敛判据: {}",
            self.position,
            self.reference,
            self.planar,
            self.observation_count,
            self.planar.criterion
        )
    }
}

impl fmt::Display for MultilaterationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.position,
            if self.converged() { "已收敛" } else { "未收敛" }
        )
    }
}
