//! 错误类型定义
//!
//! 每个关注点一个错误枚举，调用方通过 `?` 向上传播。

use thiserror::Error;

use crate::algorithms::SampleId;

/// 距离估计错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimateError {
    /// 未知的或未配置路径损耗参数的网络制式
    #[error("不支持的网络制式: `{0}`")]
    UnsupportedGeneration(String),
}

/// 线性代数内核错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("{op}: 维度不匹配 {left:?} vs {right:?}")]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    /// 主元低于容差（与矩阵范数成比例）
    #[error("奇异矩阵: 第 {column} 列主元 {pivot:e} 低于容差 {tolerance:e}")]
    SingularSystem {
        column: usize,
        pivot: f64,
        tolerance: f64,
    },
}

/// 多边定位求解错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// 少于 3 个观测点，或点数与距离数不一致
    #[error("输入不足: {points} 个观测点, {distances} 个距离")]
    InsufficientInput { points: usize, distances: usize },
    /// 所有距离为零（或存在非有限值），无法归一化
    #[error("退化输入: 最大距离为零或距离非有限")]
    DegenerateInput,
    /// 投影参考点位于极点或坐标非法，经度方向无法展开
    #[error("投影参考点纬度 {latitude} 不可用")]
    PolarReference { latitude: f64 },
    /// 迭代估计与某个观测点重合
    #[error("退化几何: 第 {iteration} 次迭代时估计点与观测点 #{point} 重合")]
    DegenerateGeometry { iteration: usize, point: usize },
    /// 法方程 JᵗJ 奇异
    #[error("第 {iteration} 次迭代法方程奇异")]
    SingularSystem { iteration: usize },
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// 存储错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("样本 {0} 不存在")]
    UnknownSample(SampleId),
}

/// 样本入库错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error(transparent)]
    Estimate(#[from] EstimateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("无效的观测位置 ({latitude}, {longitude})")]
    InvalidLocation { latitude: f64, longitude: f64 },
    /// 单写入通道已关闭
    #[error("入库通道已关闭")]
    LaneClosed,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("配置无效: {0}")]
    Invalid(String),
}
