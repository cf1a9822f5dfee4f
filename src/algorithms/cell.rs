//! 蜂窝小区观测数据定义
//!
//! 包含：
//! - 网络制式 `Generation`
//! - 平台原始读数 `RawReading` 与规范化后的 `Reading`
//! - 样本 `Sample`、新样本 `NewSample`、更新命令 `UpdateSample`
//! - 定位结果 `Tower`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::algorithms::GeoPoint;
use crate::error::EstimateError;

/// 小区标识（GSM/WCDMA 的 CID，LTE 的 CI）
pub type TransmitterId = u64;

/// 网络制式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Generation {
    #[serde(rename = "2G")]
    Gsm,
    #[serde(rename = "3G")]
    Wcdma,
    #[serde(rename = "4G")]
    Lte,
}

impl Generation {
    pub const ALL: [Generation; 3] = [Generation::Gsm, Generation::Wcdma, Generation::Lte];

    pub fn label(&self) -> &'static str {
        match self {
            Generation::Gsm => "2G",
            Generation::Wcdma => "3G",
            Generation::Lte => "4G",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Generation {
    type Err = EstimateError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "2G" | "GSM" => Ok(Generation::Gsm),
            "3G" | "WCDMA" | "UMTS" => Ok(Generation::Wcdma),
            "4G" | "LTE" => Ok(Generation::Lte),
            _ => Err(EstimateError::UnsupportedGeneration(tag.to_string())),
        }
    }
}

/// 移动网络编码（MCC + MNC）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkCode {
    pub mcc: String,
    pub mnc: String,
}

impl NetworkCode {
    pub fn new(mcc: impl Into<String>, mnc: impl Into<String>) -> Self {
        NetworkCode {
            mcc: mcc.into(),
            mnc: mnc.into(),
        }
    }
}

impl fmt::Display for NetworkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mcc, self.mnc)
    }
}

/// 平台上报的原始读数，制式以文本标签给出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub generation: String,
    pub cell_id: TransmitterId,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub mcc: Option<String>,
    #[serde(default)]
    pub mnc: Option<String>,
    pub signal_dbm: i32,
}

/// 规范化后的单小区读数
///
/// 各制式的标识字段名称不同（GSM/WCDMA 为 `cid`，LTE 为 `ci`），
/// 在入库边界统一解析一次，之后通过访问器读取。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "generation")]
pub enum Reading {
    #[serde(rename = "2G")]
    Gsm {
        cid: TransmitterId,
        operator: String,
        network: Option<NetworkCode>,
        signal_dbm: i32,
    },
    #[serde(rename = "3G")]
    Wcdma {
        cid: TransmitterId,
        operator: String,
        network: Option<NetworkCode>,
        signal_dbm: i32,
    },
    #[serde(rename = "4G")]
    Lte {
        ci: TransmitterId,
        operator: String,
        network: Option<NetworkCode>,
        signal_dbm: i32,
    },
}

impl Reading {
    pub fn new(
        generation: Generation,
        transmitter_id: TransmitterId,
        operator: impl Into<String>,
        network: Option<NetworkCode>,
        signal_dbm: i32,
    ) -> Self {
        let operator = operator.into();
        match generation {
            Generation::Gsm => Reading::Gsm {
                cid: transmitter_id,
                operator,
                network,
                signal_dbm,
            },
            Generation::Wcdma => Reading::Wcdma {
                cid: transmitter_id,
                operator,
                network,
                signal_dbm,
            },
            Generation::Lte => Reading::Lte {
                ci: transmitter_id,
                operator,
                network,
                signal_dbm,
            },
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            Reading::Gsm { .. } => Generation::Gsm,
            Reading::Wcdma { .. } => Generation::Wcdma,
            Reading::Lte { .. } => Generation::Lte,
        }
    }

    pub fn transmitter_id(&self) -> TransmitterId {
        match self {
            Reading::Gsm { cid, .. } | Reading::Wcdma { cid, .. } => *cid,
            Reading::Lte { ci, .. } => *ci,
        }
    }

    pub fn signal_strength(&self) -> i32 {
        match self {
            Reading::Gsm { signal_dbm, .. }
            | Reading::Wcdma { signal_dbm, .. }
            | Reading::Lte { signal_dbm, .. } => *signal_dbm,
        }
    }

    pub fn network_code(&self) -> Option<&NetworkCode> {
        match self {
            Reading::Gsm { network, .. }
            | Reading::Wcdma { network, .. }
            | Reading::Lte { network, .. } => network.as_ref(),
        }
    }

    pub fn operator(&self) -> &str {
        match self {
            Reading::Gsm { operator, .. }
            | Reading::Wcdma { operator, .. }
            | Reading::Lte { operator, .. } => operator,
        }
    }
}

impl TryFrom<RawReading> for Reading {
    type Error = EstimateError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        let generation = raw.generation.parse::<Generation>()?;
        // MCC 与 MNC 必须同时存在
        let network = match (raw.mcc, raw.mnc) {
            (Some(mcc), Some(mnc)) => Some(NetworkCode::new(mcc, mnc)),
            _ => None,
        };
        Ok(Reading::new(
            generation,
            raw.cell_id,
            raw.operator,
            network,
            raw.signal_dbm,
        ))
    }
}

/// 样本在存储中的主键
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 已入库的观测样本
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub transmitter_id: TransmitterId,
    pub operator: String,
    pub generation: Generation,
    pub network: Option<NetworkCode>,
    /// 信号强度 (dBm)
    pub signal_strength: i32,
    /// 估计距离 (米)，不低于 1.0
    pub estimated_distance: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// 最近一次写入（追加或原位更新）的时间
    pub observed_at: DateTime<Utc>,
    /// 原位更新次数，追加时为 0
    pub revision: u32,
}

impl Sample {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// 应用更新命令：信号强度、距离与观测时间可变，位置与身份不变
    pub fn apply(&mut self, update: &UpdateSample) {
        self.signal_strength = update.signal_strength;
        self.estimated_distance = update.estimated_distance;
        self.observed_at = update.observed_at;
        self.revision += 1;
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {}, CID: {}, {} {}",
            self.id, self.transmitter_id, self.generation, self.operator
        )?;
        if let Some(network) = &self.network {
            write!(f, ", NET: {}", network)?;
        }
        write!(
            f,
            ", RSS: {} dBm, DIST: {:.1} m, LAT: {:.6}, LON: {:.6}",
            self.signal_strength, self.estimated_distance, self.latitude, self.longitude
        )
    }
}

/// 待追加的新样本（主键由存储分配）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub transmitter_id: TransmitterId,
    pub operator: String,
    pub generation: Generation,
    pub network: Option<NetworkCode>,
    pub signal_strength: i32,
    pub estimated_distance: f64,
    pub location: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

impl NewSample {
    pub fn from_reading(reading: &Reading, estimated_distance: f64, location: GeoPoint) -> Self {
        NewSample {
            transmitter_id: reading.transmitter_id(),
            operator: reading.operator().to_string(),
            generation: reading.generation(),
            network: reading.network_code().cloned(),
            signal_strength: reading.signal_strength(),
            estimated_distance,
            location,
            observed_at: Utc::now(),
        }
    }

    pub fn into_sample(self, id: SampleId) -> Sample {
        Sample {
            id,
            transmitter_id: self.transmitter_id,
            operator: self.operator,
            generation: self.generation,
            network: self.network,
            signal_strength: self.signal_strength,
            estimated_distance: self.estimated_distance,
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            observed_at: self.observed_at,
            revision: 0,
        }
    }
}

/// 原位更新命令
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateSample {
    pub id: SampleId,
    pub signal_strength: i32,
    pub estimated_distance: f64,
    pub observed_at: DateTime<Utc>,
}

/// 解算出的基站位置，按小区标识唯一
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub transmitter_id: TransmitterId,
    pub operator: String,
    pub generation: Generation,
    pub network: Option<NetworkCode>,
    pub latitude: f64,
    pub longitude: f64,
    /// 迭代是否在预算内收敛
    pub converged: bool,
    /// 参与解算的样本数
    pub sample_count: usize,
}

impl Tower {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

impl fmt::Display for Tower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CID: {} {} {}, LAT: {:.6}, LON: {:.6} ({} 个样本{})",
            self.transmitter_id,
            self.generation,
            self.operator,
            self.latitude,
            self.longitude,
            self.sample_count,
            if self.converged { "" } else { ", 未收敛" }
        )
    }
}
