//! 运行配置
//!
//! 所有可调参数集中在 `CellnavConfig` 中，以 JSON 文件加载，
//! 缺省字段使用默认值。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::algorithms::{PathLossTable, SolverConfig, MIN_OBSERVATIONS};
use crate::error::ConfigError;

/// 样本入库参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// 判定同一观测位置的经纬度容差（度）
    pub location_tolerance_deg: f64,
    /// 单写入通道的缓冲容量
    pub lane_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        IngestionConfig {
            location_tolerance_deg: 1e-4,
            lane_capacity: 100,
        }
    }
}

/// 重复解算的新鲜度策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPolicy {
    /// 每个周期都重新解算
    #[default]
    Always,
    /// 样本数与上次成功解算时相同则跳过
    SampleCount,
    /// 最新样本时间戳与上次成功解算时相同则跳过
    LatestTimestamp,
}

/// 定位触发器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// 触发周期（毫秒）
    pub interval_ms: u64,
    /// 参与解算的最少样本数
    pub min_samples: usize,
    pub freshness: FreshnessPolicy,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            interval_ms: 10_000,
            min_samples: MIN_OBSERVATIONS,
            freshness: FreshnessPolicy::Always,
        }
    }
}

impl TriggerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 完整配置
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellnavConfig {
    pub path_loss: PathLossTable,
    pub solver: SolverConfig,
    pub ingestion: IngestionConfig,
    pub trigger: TriggerConfig,
}

impl CellnavConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CellnavConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 验证配置的合理性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.path_loss.validate().map_err(ConfigError::Invalid)?;
        self.solver.validate().map_err(ConfigError::Invalid)?;

        let tolerance = self.ingestion.location_tolerance_deg;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "位置容差应为正数，当前为 {}",
                tolerance
            )));
        }
        if self.ingestion.lane_capacity == 0 {
            return Err(ConfigError::Invalid("入库通道容量应大于 0".to_string()));
        }
        if self.trigger.interval_ms == 0 {
            return Err(ConfigError::Invalid("触发周期应大于 0".to_string()));
        }
        if self.trigger.min_samples < MIN_OBSERVATIONS {
            return Err(ConfigError::Invalid(format!(
                "最少样本数不能小于 {}，当前为 {}",
                MIN_OBSERVATIONS, self.trigger.min_samples
            )));
        }
        Ok(())
    }
}
