//! 蜂窝基站定位
//!
//! 从带位置标注的信号读数中估计基站位置：
//! - 读数经路径损耗模型换算为距离，按观测位置去重后入库
//! - 触发器周期性地对样本充足的小区执行多边定位，结果写入基站表

pub mod algorithms;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod positioning;
pub mod store;

pub mod prelude {
    pub use crate::algorithms::{
        GeoPoint, Generation, MultilaterationFix, Multilaterator, NetworkCode, PathLossParams,
        PathLossTable, RawReading, Reading, Sample, SampleId, Tower, TransmitterId,
    };
    pub use crate::config::CellnavConfig;
    pub use crate::error::{IngestError, SolveError, StoreError};
    pub use crate::ingestion::{IngestOutcome, IngestionController, IngestionLane};
    pub use crate::positioning::{CycleReport, TriggerSelector};
    pub use crate::store::{MemoryStore, SampleStore, TowerStore};
}
