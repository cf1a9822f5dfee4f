//! 样本入库控制
//!
//! 每条读数先换算为距离，再决定追加新样本还是原位更新：
//! - 该小区没有样本，或最近样本的位置与当前位置相差达到容差 → 追加
//! - 否则 → 更新最近样本的信号强度与距离
//!
//! "读取-判断-写入" 不是原子操作，同一小区的入库必须串行化。
//! 控制器内部按小区加锁；`IngestionLane` 则把所有写入汇入单一通道。

use chrono::Utc;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::algorithms::{
    GeoPoint, NewSample, PathLossTable, RawReading, Reading, SampleId, TransmitterId, UpdateSample,
};
use crate::config::{CellnavConfig, IngestionConfig};
use crate::error::IngestError;
use crate::store::SampleStore;

/// 入库结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 新观测位置，追加了样本
    Inserted(SampleId),
    /// 同一观测位置，原位更新了样本
    Updated(SampleId),
}

impl IngestOutcome {
    pub fn sample_id(&self) -> SampleId {
        match self {
            IngestOutcome::Inserted(id) | IngestOutcome::Updated(id) => *id,
        }
    }
}

/// 按小区标识的互斥锁表
///
/// 表项在最后一个持有者释放后移除，表的大小只与正在入库的小区数有关。
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<TransmitterId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: TransmitterId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// 守卫释放后调用；引用计数只在表锁内增加，计数为 1 说明没有其他持有者或等待者
    async fn release(&self, key: TransmitterId) {
        let mut locks = self.locks.lock().await;
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// 样本入库控制器
pub struct IngestionController<S> {
    store: Arc<S>,
    path_loss: PathLossTable,
    location_tolerance_deg: f64,
    locks: KeyedLocks,
}

impl<S: SampleStore> IngestionController<S> {
    pub fn new(store: Arc<S>, path_loss: PathLossTable, config: &IngestionConfig) -> Self {
        IngestionController {
            store,
            path_loss,
            location_tolerance_deg: config.location_tolerance_deg,
            locks: KeyedLocks::default(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &CellnavConfig) -> Self {
        Self::new(store, config.path_loss.clone(), &config.ingestion)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 处理一条读数
    ///
    /// # 参数
    /// - `reading`: 规范化读数
    /// - `location`: 观测者当前位置
    pub async fn ingest(
        &self,
        reading: &Reading,
        location: GeoPoint,
    ) -> Result<IngestOutcome, IngestError> {
        if !location.is_valid() {
            warn!("拒绝读数: 无效位置 {}", location);
            return Err(IngestError::InvalidLocation {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }

        let transmitter_id = reading.transmitter_id();
        let distance = self
            .path_loss
            .estimate_distance(reading.signal_strength(), reading.generation())
            .inspect_err(|err| warn!("拒绝小区 {} 的读数: {}", transmitter_id, err))?;

        let guard = self.locks.acquire(transmitter_id).await;
        let outcome = self.insert_or_update(reading, location, distance).await;
        drop(guard);
        self.locks.release(transmitter_id).await;
        outcome
    }

    /// 持有小区锁时执行的 "读取-判断-写入"
    async fn insert_or_update(
        &self,
        reading: &Reading,
        location: GeoPoint,
        distance: f64,
    ) -> Result<IngestOutcome, IngestError> {
        let transmitter_id = reading.transmitter_id();
        let previous = self.store.most_recent(transmitter_id).await?;
        match previous {
            Some(sample) if !sample.location().differs_from(&location, self.location_tolerance_deg) => {
                let update = UpdateSample {
                    id: sample.id,
                    signal_strength: reading.signal_strength(),
                    estimated_distance: distance,
                    observed_at: Utc::now(),
                };
                self.store.update(update).await?;
                debug!(
                    "小区 {} 样本 {} 原位更新: {} dBm → {:.1} m",
                    transmitter_id,
                    sample.id,
                    reading.signal_strength(),
                    distance
                );
                Ok(IngestOutcome::Updated(sample.id))
            }
            _ => {
                let id = self
                    .store
                    .append(NewSample::from_reading(reading, distance, location))
                    .await?;
                debug!(
                    "小区 {} 新增样本 {} @ {}: {} dBm → {:.1} m",
                    transmitter_id,
                    id,
                    location,
                    reading.signal_strength(),
                    distance
                );
                Ok(IngestOutcome::Inserted(id))
            }
        }
    }

    /// 处理平台原始读数，制式标签在此解析
    pub async fn ingest_raw(
        &self,
        raw: RawReading,
        location: GeoPoint,
    ) -> Result<IngestOutcome, IngestError> {
        let reading = Reading::try_from(raw).inspect_err(|err| warn!("拒绝原始读数: {}", err))?;
        self.ingest(&reading, location).await
    }
}

/// 单写入通道中的一条观测
struct Observation {
    reading: Reading,
    location: GeoPoint,
    reply: Option<oneshot::Sender<Result<IngestOutcome, IngestError>>>,
}

/// 单写入通道
///
/// 所有写入经由同一个任务按到达顺序处理。克隆得到的是同一通道的发送端；
/// 全部发送端释放后任务结束，返回处理的读数条数。
#[derive(Clone)]
pub struct IngestionLane {
    tx: mpsc::Sender<Observation>,
}

impl IngestionLane {
    pub fn spawn<S>(controller: IngestionController<S>, capacity: usize) -> (Self, JoinHandle<usize>)
    where
        S: SampleStore + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Observation>(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut processed = 0;
            while let Some(observation) = rx.recv().await {
                let result = controller
                    .ingest(&observation.reading, observation.location)
                    .await;
                processed += 1;
                match observation.reply {
                    Some(reply) => {
                        // 调用方可能已放弃等待
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            warn!("入库失败: {}", err);
                        }
                    }
                }
            }
            debug!("入库通道关闭，共处理 {} 条读数", processed);
            processed
        });
        (IngestionLane { tx }, handle)
    }

    /// 提交读数并等待入库结果
    pub async fn submit(
        &self,
        reading: Reading,
        location: GeoPoint,
    ) -> Result<IngestOutcome, IngestError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Observation {
                reading,
                location,
                reply: Some(reply),
            })
            .await
            .map_err(|_| IngestError::LaneClosed)?;
        response.await.map_err(|_| IngestError::LaneClosed)?
    }

    /// 提交读数，不等待结果
    pub async fn send(&self, reading: Reading, location: GeoPoint) -> Result<(), IngestError> {
        self.tx
            .send(Observation {
                reading,
                location,
                reply: None,
            })
            .await
            .map_err(|_| IngestError::LaneClosed)
    }
}
