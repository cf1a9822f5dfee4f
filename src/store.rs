//! 样本与基站存储
//!
//! 核心只依赖读写契约（`SampleStore` / `TowerStore`），持久化方式由调用方决定。
//! `MemoryStore` 是线程安全的内存实现：克隆得到的是同一份数据的句柄，
//! 在进程启动时显式创建并传入入库控制器和触发器。

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::algorithms::{NewSample, Sample, SampleId, Tower, TransmitterId, UpdateSample};
use crate::error::StoreError;

/// 样本存储契约，单行读写需保证原子性
pub trait SampleStore: Send + Sync {
    /// 追加新样本，返回分配的主键
    fn append(&self, sample: NewSample)
    -> impl Future<Output = Result<SampleId, StoreError>> + Send;

    /// 某小区最近一次追加的样本
    fn most_recent(
        &self,
        transmitter_id: TransmitterId,
    ) -> impl Future<Output = Result<Option<Sample>, StoreError>> + Send;

    /// 按主键原位更新信号强度与距离
    fn update(&self, update: UpdateSample) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 某小区的全部样本（按追加顺序）
    fn all_for_transmitter(
        &self,
        transmitter_id: TransmitterId,
    ) -> impl Future<Output = Result<Vec<Sample>, StoreError>> + Send;

    /// 样本数不少于 `n` 的小区
    fn transmitter_ids_with_count_at_least(
        &self,
        n: usize,
    ) -> impl Future<Output = Result<Vec<TransmitterId>, StoreError>> + Send;
}

/// 基站存储契约
pub trait TowerStore: Send + Sync {
    /// 按小区标识整体替换写入
    fn upsert(&self, tower: Tower) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(
        &self,
        transmitter_id: TransmitterId,
    ) -> impl Future<Output = Result<Option<Tower>, StoreError>> + Send;

    fn all(&self) -> impl Future<Output = Result<Vec<Tower>, StoreError>> + Send;
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    samples: BTreeMap<SampleId, Sample>,
    /// 小区 → 样本主键（递增）
    by_transmitter: BTreeMap<TransmitterId, Vec<SampleId>>,
    towers: HashMap<TransmitterId, Tower>,
}

/// 内存存储（线程安全）
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部样本，最新的在前
    pub async fn all_samples(&self) -> Vec<Sample> {
        let state = self.state.lock().await;
        state.samples.values().rev().cloned().collect()
    }

    pub async fn sample_count(&self) -> usize {
        self.state.lock().await.samples.len()
    }

    pub async fn tower_count(&self) -> usize {
        self.state.lock().await.towers.len()
    }
}

impl SampleStore for MemoryStore {
    async fn append(&self, sample: NewSample) -> Result<SampleId, StoreError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = SampleId(state.next_id);
        let transmitter_id = sample.transmitter_id;
        state.samples.insert(id, sample.into_sample(id));
        state.by_transmitter.entry(transmitter_id).or_default().push(id);
        Ok(id)
    }

    async fn most_recent(&self, transmitter_id: TransmitterId) -> Result<Option<Sample>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_transmitter
            .get(&transmitter_id)
            .and_then(|ids| ids.last())
            .and_then(|id| state.samples.get(id))
            .cloned())
    }

    async fn update(&self, update: UpdateSample) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let sample = state
            .samples
            .get_mut(&update.id)
            .ok_or(StoreError::UnknownSample(update.id))?;
        sample.apply(&update);
        Ok(())
    }

    async fn all_for_transmitter(
        &self,
        transmitter_id: TransmitterId,
    ) -> Result<Vec<Sample>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_transmitter
            .get(&transmitter_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.samples.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transmitter_ids_with_count_at_least(
        &self,
        n: usize,
    ) -> Result<Vec<TransmitterId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_transmitter
            .iter()
            .filter(|(_, ids)| ids.len() >= n)
            .map(|(transmitter_id, _)| *transmitter_id)
            .collect())
    }
}

impl TowerStore for MemoryStore {
    async fn upsert(&self, tower: Tower) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.towers.insert(tower.transmitter_id, tower);
        Ok(())
    }

    async fn get(&self, transmitter_id: TransmitterId) -> Result<Option<Tower>, StoreError> {
        Ok(self.state.lock().await.towers.get(&transmitter_id).cloned())
    }

    async fn all(&self) -> Result<Vec<Tower>, StoreError> {
        let state = self.state.lock().await;
        let mut towers: Vec<_> = state.towers.values().cloned().collect();
        towers.sort_by_key(|tower| tower.transmitter_id);
        Ok(towers)
    }
}
