//! 基站定位触发器
//!
//! 功能：
//! - 周期性扫描样本存储，挑出样本数足够的小区
//! - 对每个小区调用多边定位求解器
//! - 成功则整体替换写入基站位置；失败则记录日志并保留旧结果，样本不删除
//! - 可选的新鲜度策略，跳过自上次解算以来没有变化的小区

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::algorithms::{GeoPoint, Multilaterator, Sample, Tower, TransmitterId};
use crate::config::{CellnavConfig, FreshnessPolicy, TriggerConfig};
use crate::error::{SolveError, StoreError};
use crate::store::{SampleStore, TowerStore};

/// 单个周期的执行报告
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    /// 调用了求解器的小区
    pub attempted: Vec<TransmitterId>,
    /// 解算成功并写入的基站
    pub solved: Vec<TransmitterId>,
    /// 其中未在迭代预算内收敛的基站
    pub unconverged: Vec<TransmitterId>,
    /// 求解失败的小区
    pub failed: Vec<(TransmitterId, SolveError)>,
    /// 因新鲜度策略跳过的小区
    pub skipped_fresh: Vec<TransmitterId>,
}

/// 上次成功解算时的样本状态
///
/// 原位更新不改变样本数，因此同时记录各样本更新次数之和。
#[derive(Clone, Copy, Debug, PartialEq)]
struct Watermark {
    sample_count: usize,
    revisions: u64,
    latest_observed: Option<DateTime<Utc>>,
}

impl Watermark {
    fn of(samples: &[Sample]) -> Self {
        Watermark {
            sample_count: samples.len(),
            revisions: samples.iter().map(|s| u64::from(s.revision)).sum(),
            latest_observed: samples.iter().map(|s| s.observed_at).max(),
        }
    }
}

/// 基站定位触发器
pub struct TriggerSelector<S, T> {
    samples: Arc<S>,
    towers: Arc<T>,
    solver: Multilaterator,
    min_samples: usize,
    freshness: FreshnessPolicy,
    watermarks: Mutex<HashMap<TransmitterId, Watermark>>,
}

impl<S: SampleStore, T: TowerStore> TriggerSelector<S, T> {
    pub fn new(samples: Arc<S>, towers: Arc<T>, solver: Multilaterator, config: &TriggerConfig) -> Self {
        TriggerSelector {
            samples,
            towers,
            solver,
            min_samples: config.min_samples,
            freshness: config.freshness,
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(samples: Arc<S>, towers: Arc<T>, config: &CellnavConfig) -> Self {
        Self::new(
            samples,
            towers,
            Multilaterator::new(config.solver.clone()),
            &config.trigger,
        )
    }

    /// 执行一个触发周期
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let candidates = self
            .samples
            .transmitter_ids_with_count_at_least(self.min_samples)
            .await?;
        debug!("本周期候选小区: {:?}", candidates);
        self.watermarks
            .lock()
            .await
            .retain(|transmitter_id, _| candidates.contains(transmitter_id));

        let mut report = CycleReport::default();
        for transmitter_id in candidates {
            let samples = self.samples.all_for_transmitter(transmitter_id).await?;
            if samples.len() < self.min_samples {
                continue;
            }

            let watermark = Watermark::of(&samples);
            if self.is_fresh(transmitter_id, &watermark).await {
                report.skipped_fresh.push(transmitter_id);
                continue;
            }

            report.attempted.push(transmitter_id);
            match self.localize(transmitter_id, &samples) {
                Ok(tower) => {
                    if !tower.converged {
                        warn!(
                            "小区 {} 在迭代预算内未收敛，写入当前估计",
                            transmitter_id
                        );
                        report.unconverged.push(transmitter_id);
                    }
                    self.towers.upsert(tower).await?;
                    self.watermarks.lock().await.insert(transmitter_id, watermark);
                    report.solved.push(transmitter_id);
                }
                Err(err) => {
                    warn!("小区 {} 定位失败，保留原有结果: {}", transmitter_id, err);
                    report.failed.push((transmitter_id, err));
                }
            }
        }

        info!(
            "定位周期完成: 解算 {}，失败 {}，跳过 {}",
            report.solved.len(),
            report.failed.len(),
            report.skipped_fresh.len()
        );
        Ok(report)
    }

    /// 对单个小区的样本集解算基站位置
    pub fn localize(&self, transmitter_id: TransmitterId, samples: &[Sample]) -> Result<Tower, SolveError> {
        let points: Vec<GeoPoint> = samples.iter().map(Sample::location).collect();
        let distances: Vec<f64> = samples.iter().map(|s| s.estimated_distance).collect();
        let fix = self.solver.solve(&points, &distances)?;
        debug!("小区 {}: {}", transmitter_id, fix.detailed_description());

        // 身份字段取自参考样本
        let reference = &samples[0];
        Ok(Tower {
            transmitter_id,
            operator: reference.operator.clone(),
            generation: reference.generation,
            network: reference.network.clone(),
            latitude: fix.position.latitude,
            longitude: fix.position.longitude,
            converged: fix.converged(),
            sample_count: samples.len(),
        })
    }

    async fn is_fresh(&self, transmitter_id: TransmitterId, current: &Watermark) -> bool {
        let watermarks = self.watermarks.lock().await;
        let Some(previous) = watermarks.get(&transmitter_id) else {
            return false;
        };
        match self.freshness {
            FreshnessPolicy::Always => false,
            FreshnessPolicy::SampleCount => {
                previous.sample_count == current.sample_count
                    && previous.revisions == current.revisions
            }
            FreshnessPolicy::LatestTimestamp => previous.latest_observed == current.latest_observed,
        }
    }

    /// 按固定周期执行，直到 `shutdown` 置为 true 或发送端释放
    ///
    /// 返回执行的周期数。周期为零时不启动。
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) -> usize {
        if period.is_zero() {
            error!("定位触发周期不能为零，触发器未启动");
            return 0;
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_cycle().await {
                        error!("定位周期失败: {}", err);
                    }
                    cycles += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("定位触发器已停止，共执行 {} 个周期", cycles);
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{Generation, NewSample, Reading};
    use crate::ingestion::{IngestOutcome, IngestionController};
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, transmitter_id: TransmitterId, locations: &[(f64, f64)]) {
        let reading = Reading::new(Generation::Lte, transmitter_id, "op", None, -70);
        for &(lat, lon) in locations {
            let sample = NewSample::from_reading(&reading, 542.2221, GeoPoint::new(lat, lon));
            store.append(sample).await.unwrap();
        }
    }

    fn selector(store: &Arc<MemoryStore>, freshness: FreshnessPolicy) -> TriggerSelector<MemoryStore, MemoryStore> {
        let config = TriggerConfig {
            freshness,
            ..TriggerConfig::default()
        };
        TriggerSelector::new(Arc::clone(store), Arc::clone(store), Multilaterator::default(), &config)
    }

    const TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (0.0, 0.01), (0.01, 0.0)];

    #[tokio::test]
    async fn test_only_transmitters_with_enough_samples() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, &TRIANGLE).await;
        seed(&store, 2, &TRIANGLE[..2]).await;

        let report = selector(&store, FreshnessPolicy::Always).run_cycle().await.unwrap();
        assert_eq!(report.attempted, vec![1]);
        assert_eq!(report.solved, vec![1]);
        assert!(store.get(1).await.unwrap().is_some());
        assert!(store.get(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_tower() {
        let store = Arc::new(MemoryStore::new());
        let previous = Tower {
            transmitter_id: 9,
            operator: "op".to_string(),
            generation: Generation::Lte,
            network: None,
            latitude: 1.0,
            longitude: 1.0,
            converged: true,
            sample_count: 3,
        };
        store.upsert(previous.clone()).await.unwrap();
        // 三点共线 → 法方程奇异
        seed(&store, 9, &[(0.0, 0.0), (0.0, 0.01), (0.0, 0.03)]).await;

        let report = selector(&store, FreshnessPolicy::Always).run_cycle().await.unwrap();
        assert!(report.solved.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.get(9).await.unwrap(), Some(previous));
        assert_eq!(store.all_for_transmitter(9).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sample_count_freshness() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, &TRIANGLE).await;
        let selector = selector(&store, FreshnessPolicy::SampleCount);

        assert_eq!(selector.run_cycle().await.unwrap().solved, vec![1]);
        assert_eq!(selector.run_cycle().await.unwrap().skipped_fresh, vec![1]);

        seed(&store, 1, &[(0.005, 0.005)]).await;
        let report = selector.run_cycle().await.unwrap();
        assert_eq!(report.solved, vec![1]);
        assert_eq!(store.get(1).await.unwrap().map(|t| t.sample_count), Some(4));
    }

    /// 原位更新改变了距离但不改变样本数，基站必须随之重新解算
    #[rstest::rstest]
    #[case(FreshnessPolicy::SampleCount)]
    #[case(FreshnessPolicy::LatestTimestamp)]
    #[tokio::test]
    async fn test_in_place_update_triggers_resolve(#[case] freshness: FreshnessPolicy) {
        let store = Arc::new(MemoryStore::new());
        let controller = IngestionController::from_config(Arc::clone(&store), &CellnavConfig::default());
        let reading = |signal_dbm| Reading::new(Generation::Lte, 1, "op", None, signal_dbm);
        for &(lat, lon) in &TRIANGLE {
            controller.ingest(&reading(-70), GeoPoint::new(lat, lon)).await.unwrap();
        }

        let selector = selector(&store, freshness);
        assert_eq!(selector.run_cycle().await.unwrap().solved, vec![1]);
        let before = store.get(1).await.unwrap().unwrap();
        assert_eq!(selector.run_cycle().await.unwrap().skipped_fresh, vec![1]);

        let (lat, lon) = TRIANGLE[2];
        let outcome = controller.ingest(&reading(-50), GeoPoint::new(lat, lon)).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Updated(_)));

        let report = selector.run_cycle().await.unwrap();
        assert_eq!(report.solved, vec![1]);
        assert!(report.skipped_fresh.is_empty());

        let after = store.get(1).await.unwrap().unwrap();
        assert_eq!(after.sample_count, 3);
        assert!(after.location().differs_from(&before.location(), 1e-4));
        let current = store.all_for_transmitter(1).await.unwrap();
        let expected = selector.localize(1, &current).unwrap();
        assert!(!after.location().differs_from(&expected.location(), 1e-9));
    }

    #[tokio::test]
    async fn test_zero_period_does_not_start() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, &TRIANGLE).await;
        let config = CellnavConfig {
            trigger: TriggerConfig {
                interval_ms: 0,
                ..TriggerConfig::default()
            },
            ..CellnavConfig::default()
        };
        let selector = Arc::new(TriggerSelector::from_config(
            Arc::clone(&store),
            Arc::clone(&store),
            &config,
        ));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = {
            let selector = Arc::clone(&selector);
            let period = config.trigger.interval();
            tokio::spawn(async move { selector.run(period, shutdown_rx).await })
        };
        assert_eq!(runner.await.unwrap(), 0);
        assert_eq!(store.tower_count().await, 0);
    }

    #[tokio::test]
    async fn test_always_recomputes() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, &TRIANGLE).await;
        let selector = selector(&store, FreshnessPolicy::Always);
        for _ in 0..3 {
            let report = selector.run_cycle().await.unwrap();
            assert_eq!(report.attempted, vec![1]);
            assert!(report.skipped_fresh.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 1, &TRIANGLE).await;
        let selector = Arc::new(selector(&store, FreshnessPolicy::Always));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = {
            let selector = Arc::clone(&selector);
            tokio::spawn(async move { selector.run(Duration::from_millis(100), shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown_tx.send(true).unwrap();
        let cycles = runner.await.unwrap();
        // 立即触发一次，之后每 100ms 一次
        assert_eq!(cycles, 3);
        assert_eq!(store.tower_count().await, 1);
    }
}
