//! 信号强度 → 距离转换模型
//!
//! 对数距离路径损耗模型，按网络制式分别参数化：
//!
//! d = d₀ · 10^((PL(d₀) − RSS) / (10 · n))

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::algorithms::Generation;
use crate::error::EstimateError;

/// 单一制式的路径损耗参数
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathLossParams {
    /// 参考距离处的路径损耗 PL(d₀) (dB)
    pub reference_loss_db: f64,
    /// 路径损耗指数 n
    pub exponent: f64,
    /// 参考距离 d₀ (米)，同时也是距离估计的下限
    #[serde(default = "default_reference_distance")]
    pub reference_distance_m: f64,
}

/// 距离估计的绝对下限（米）
pub const MIN_DISTANCE_M: f64 = 1.0;

fn default_reference_distance() -> f64 {
    1.0
}

impl PathLossParams {
    pub const fn new(reference_loss_db: f64, exponent: f64) -> Self {
        PathLossParams {
            reference_loss_db,
            exponent,
            reference_distance_m: 1.0,
        }
    }

    /// 根据信号强度 (dBm) 计算距离（米），不低于参考距离与 `MIN_DISTANCE_M`
    pub fn distance(&self, signal_dbm: i32) -> f64 {
        let exponent = (self.reference_loss_db - signal_dbm as f64) / (10.0 * self.exponent);
        let distance = self.reference_distance_m * 10_f64.powf(exponent);
        distance.max(self.reference_distance_m).max(MIN_DISTANCE_M)
    }

    /// 反算：给定距离处的预期信号强度 (dBm)
    pub fn rssi_at(&self, distance_m: f64) -> f64 {
        if distance_m <= 0.0 {
            return f64::INFINITY;
        }
        self.reference_loss_db - 10.0 * self.exponent * (distance_m / self.reference_distance_m).log10()
    }

    /// 验证参数的合理性
    pub fn validate(&self) -> Result<(), String> {
        if !(self.exponent.is_finite() && self.exponent > 0.0) {
            return Err(format!("路径损耗指数 n 应为正数，当前为 {}", self.exponent));
        }
        if !(self.reference_distance_m.is_finite() && self.reference_distance_m >= MIN_DISTANCE_M) {
            return Err(format!(
                "参考距离 d₀ 不能小于 {} m，当前为 {}",
                MIN_DISTANCE_M, self.reference_distance_m
            ));
        }
        if !self.reference_loss_db.is_finite() {
            return Err("参考路径损耗 PL(d₀) 应为有限值".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for PathLossParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PL(d₀)={:.2} dB, n={:.2}, d₀={:.2} m",
            self.reference_loss_db, self.exponent, self.reference_distance_m
        )
    }
}

/// 各制式的路径损耗参数表
///
/// 缺省某一制式即视为不支持该制式。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathLossTable {
    #[serde(rename = "2G", default, skip_serializing_if = "Option::is_none")]
    pub gsm: Option<PathLossParams>,
    #[serde(rename = "3G", default, skip_serializing_if = "Option::is_none")]
    pub wcdma: Option<PathLossParams>,
    #[serde(rename = "4G", default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<PathLossParams>,
}

impl PathLossTable {
    pub const GSM: PathLossParams = PathLossParams::new(35.0, 3.75);
    pub const WCDMA: PathLossParams = PathLossParams::new(40.0, 4.00);
    pub const LTE: PathLossParams = PathLossParams::new(38.0, 3.95);

    /// 空表（不支持任何制式）
    pub fn empty() -> Self {
        PathLossTable {
            gsm: None,
            wcdma: None,
            lte: None,
        }
    }

    pub fn with(mut self, generation: Generation, params: PathLossParams) -> Self {
        match generation {
            Generation::Gsm => self.gsm = Some(params),
            Generation::Wcdma => self.wcdma = Some(params),
            Generation::Lte => self.lte = Some(params),
        }
        self
    }

    pub fn params(&self, generation: Generation) -> Result<&PathLossParams, EstimateError> {
        let params = match generation {
            Generation::Gsm => self.gsm.as_ref(),
            Generation::Wcdma => self.wcdma.as_ref(),
            Generation::Lte => self.lte.as_ref(),
        };
        params.ok_or_else(|| EstimateError::UnsupportedGeneration(generation.to_string()))
    }

    pub fn estimate_distance(
        &self,
        signal_dbm: i32,
        generation: Generation,
    ) -> Result<f64, EstimateError> {
        Ok(self.params(generation)?.distance(signal_dbm))
    }

    pub fn distance_to_rssi(
        &self,
        distance_m: f64,
        generation: Generation,
    ) -> Result<f64, EstimateError> {
        Ok(self.params(generation)?.rssi_at(distance_m))
    }

    pub fn validate(&self) -> Result<(), String> {
        for generation in Generation::ALL {
            if let Ok(params) = self.params(generation) {
                params
                    .validate()
                    .map_err(|err| format!("{} 参数无效: {}", generation, err))?;
            }
        }
        Ok(())
    }
}

impl Default for PathLossTable {
    fn default() -> Self {
        PathLossTable {
            gsm: Some(Self::GSM),
            wcdma: Some(Self::WCDMA),
            lte: Some(Self::LTE),
        }
    }
}

/// 使用默认参数表估计距离（米）
pub fn estimate_distance(signal_dbm: i32, generation: Generation) -> Result<f64, EstimateError> {
    PathLossTable::default().estimate_distance(signal_dbm, generation)
}
