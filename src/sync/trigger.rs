//! Background drivers for the sync jobs
//!
//! One `PollTrigger` owns every periodic loop, each with its own interval:
//! - token sync: full resumable `TokenSyncJob` pass
//! - points sync: one locked `PointsSyncJob` cycle
//! - counter watch: `CounterWatcher` fast path for freshly minted ids
//!
//! All three share the jobs' scheduler, so their chain calls stay globally
//! spaced. Loops never exit on their own; the runtime aborts the handles.

use super::config::SyncConfig;
use super::error::SyncError;
use super::points_job::PointsSyncJob;
use super::token_job::TokenSyncJob;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Named periods of the background loops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerIntervals {
    pub token_sync: Duration,
    pub points_sync: Duration,
    pub counter_watch: Duration,
}

impl TriggerIntervals {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            token_sync: Duration::from_millis(config.token_sync_interval_ms),
            points_sync: Duration::from_millis(config.points_sync_interval_ms),
            counter_watch: Duration::from_millis(config.counter_watch_interval_ms),
        }
    }
}

pub struct PollTrigger {
    token_job: Arc<TokenSyncJob>,
    points_job: Arc<PointsSyncJob>,
    intervals: TriggerIntervals,
}

impl PollTrigger {
    pub fn new(
        token_job: Arc<TokenSyncJob>,
        points_job: Arc<PointsSyncJob>,
        intervals: TriggerIntervals,
    ) -> Self {
        Self {
            token_job,
            points_job,
            intervals,
        }
    }

    /// Spawn the three loops; the first tick of each fires immediately
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        log::info!("⏰ Starting sync triggers");
        log::info!("   ├─ Token sync every {:?}", self.intervals.token_sync);
        log::info!("   ├─ Points sync every {:?}", self.intervals.points_sync);
        log::info!("   └─ Counter watch every {:?}", self.intervals.counter_watch);

        let watcher = CounterWatcher::new(self.token_job.clone(), self.points_job.clone());

        vec![
            tokio::spawn(token_sync_task(self.token_job.clone(), self.intervals.token_sync)),
            tokio::spawn(points_sync_task(self.points_job.clone(), self.intervals.points_sync)),
            tokio::spawn(counter_watch_task(watcher, self.intervals.counter_watch)),
        ]
    }
}

/// Run a full token pass every `period`
///
/// Passes are awaited inside the loop, so this driver never overlaps itself.
/// Overlap with `/trigger-cache` is possible and harmless.
pub async fn token_sync_task(job: Arc<TokenSyncJob>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if let Err(e) = job.run().await {
            log::error!("❌ Token sync pass failed: {}", e);
        }
    }
}

/// Run one points cycle every `period`
pub async fn points_sync_task(job: Arc<PointsSyncJob>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        match job.run().await {
            Ok(_) => {}
            Err(SyncError::LockContention) => {
                log::info!("⏭️  Points cycle skipped, lock held");
            }
            Err(e) => log::error!("❌ Points cycle failed: {}", e),
        }
    }
}

/// Poll the on-chain counter every `period`
pub async fn counter_watch_task(mut watcher: CounterWatcher, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if let Err(e) = watcher.tick().await {
            log::warn!("⚠️  Counter watch tick failed: {}", e);
        }
    }
}

/// Fast path for new mints
///
/// Keeps the last seen `idCounter` in memory. When the live counter grows,
/// fetches owners for exactly the new ids and refreshes those owners' points
/// right away. The cursor-based pass remains the source of completeness.
pub struct CounterWatcher {
    token_job: Arc<TokenSyncJob>,
    points_job: Arc<PointsSyncJob>,
    current: Option<u64>,
}

impl CounterWatcher {
    pub fn new(token_job: Arc<TokenSyncJob>, points_job: Arc<PointsSyncJob>) -> Self {
        Self {
            token_job,
            points_job,
            current: None,
        }
    }

    /// Last counter value seen, `None` before the first tick
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// One poll; returns the newly persisted `(token_id, owner)` pairs
    ///
    /// The first tick only records the baseline.
    pub async fn tick(&mut self) -> Result<Vec<(u64, String)>, SyncError> {
        let live = self.token_job.token_counter().await?;

        let current = match self.current {
            Some(current) => current,
            None => {
                log::info!("👀 Counter watch baseline: {}", live);
                self.current = Some(live);
                return Ok(Vec::new());
            }
        };

        if live <= current {
            return Ok(Vec::new());
        }

        log::info!(
            "🆕 Counter moved {} -> {}, fetching {} new token(s)",
            current,
            live,
            live - current
        );

        let synced = self.token_job.sync_range(current, live).await?;
        self.current = Some(live);

        let mut refreshed: HashSet<String> = HashSet::new();
        for (token_id, owner) in &synced {
            if !refreshed.insert(owner.clone()) {
                continue;
            }
            match self.points_job.refresh_address(owner).await {
                Ok(points) => {
                    log::info!("   ├─ Token {} owner {} has {} points", token_id, owner, points)
                }
                Err(e) => log::warn!("⚠️  Points refresh for new owner {} failed: {}", owner, e),
            }
        }

        Ok(synced)
    }
}
