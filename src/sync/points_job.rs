//! Points refresh walk over every known owner
//!
//! One cycle:
//! 1. take the advisory lock (or return `LockContention` immediately)
//! 2. snapshot the distinct owner set and the address cursor
//! 3. refresh each address from the cursor on, one scheduled call at a time,
//!    persisting the cursor after every success
//! 4. once the walk reaches the end, reset the cursor to 0 so the next cycle
//!    revisits every address, failed ones included
//! 5. release the lock on every exit path
//!
//! Chain-side failures for one address are logged and the walk continues;
//! the cursor stops advancing at the first failed index so a crash mid-walk
//! resumes there. Storage failures abort the cycle. Already-written points
//! stay, and a re-fetch on the next cycle simply overwrites them.

use super::chain::{normalize_address, ChainReader};
use super::db::{ProgressStore, RecordStore};
use super::error::SyncError;
use super::scheduler::RateLimitedScheduler;
use super::types::CycleOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Result of one points cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointsPassSummary {
    pub start_index: usize,
    pub total_addresses: usize,
    pub updated: usize,
    pub failed: Vec<String>,
    /// True when every address was refreshed
    pub completed: bool,
}

pub struct PointsSyncJob {
    chain: Arc<dyn ChainReader>,
    records: Arc<dyn RecordStore>,
    progress: Arc<dyn ProgressStore>,
    scheduler: Arc<RateLimitedScheduler>,
    /// Minimum gap between two address fetch starts within a walk
    address_spacing: Duration,
}

impl PointsSyncJob {
    /// `address_delay` is a floor: never below the scheduler's own spacing
    pub fn new(
        chain: Arc<dyn ChainReader>,
        records: Arc<dyn RecordStore>,
        progress: Arc<dyn ProgressStore>,
        scheduler: Arc<RateLimitedScheduler>,
        address_delay: Duration,
    ) -> Self {
        let address_spacing = address_delay.max(scheduler.min_spacing());
        Self {
            chain,
            records,
            progress,
            scheduler,
            address_spacing,
        }
    }

    pub fn address_spacing(&self) -> Duration {
        self.address_spacing
    }

    /// Fetch and persist one address's balance (no lock, no cursor)
    pub async fn refresh_address(&self, address: &str) -> Result<f64, SyncError> {
        let (_, result) = self.refresh_timed(address).await;
        result
    }

    /// Like `refresh_address`, also returning when the chain call started
    async fn refresh_timed(&self, address: &str) -> (Instant, Result<f64, SyncError>) {
        let mut call_started = Instant::now();

        let address = match normalize_address(address) {
            Ok(address) => address,
            Err(e) => return (call_started, Err(e)),
        };

        let fetched = self
            .scheduler
            .schedule(|| {
                call_started = Instant::now();
                self.chain.points_balance(&address)
            })
            .await;

        let result = match fetched {
            Ok(points) => self
                .records
                .upsert_points(&address, points)
                .await
                .map(|_| points),
            Err(e) => Err(e),
        };

        (call_started, result)
    }

    /// Run one locked cycle
    pub async fn run(&self) -> Result<PointsPassSummary, SyncError> {
        if !self.progress.try_acquire_lock().await? {
            log::info!("⏭️  Points cycle already running elsewhere, skipping");
            return Err(SyncError::LockContention);
        }

        let result = match self.begin_cycle().await {
            Ok((addresses, start_index)) => {
                let result = self.walk(&addresses, start_index).await;
                if let Err(e) = &result {
                    log::error!("❌ Points cycle aborted: {}", e);
                    let outcome = CycleOutcome::Aborted {
                        error: e.to_string(),
                    };
                    if let Err(status_err) = self.progress.finish_points_cycle(outcome).await {
                        log::warn!("⚠️  Failed to record aborted points cycle: {}", status_err);
                    }
                }
                result
            }
            // No status row was written for this cycle; the previous one stays
            Err(e) => {
                log::error!("❌ Points cycle could not start: {}", e);
                Err(e)
            }
        };

        match (result, self.progress.release_lock().await) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => {
                log::error!("❌ Failed to release points lock: {}", e);
                Err(e)
            }
            (Err(e), Err(release_err)) => {
                log::error!("❌ Failed to release points lock: {}", release_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    /// Snapshot owners and cursor, then mark the cycle running
    async fn begin_cycle(&self) -> Result<(Vec<String>, usize), SyncError> {
        let addresses = self.records.distinct_owners().await?;
        let total = addresses.len();

        let mut start_index = self.progress.address_cursor().await?;
        if start_index > total {
            log::warn!(
                "⚠️  Address cursor {} is past {} known owners, restarting at 0",
                start_index,
                total
            );
            start_index = 0;
            self.progress.set_address_cursor(0).await?;
        }

        self.progress.begin_points_cycle(start_index, total).await?;
        log::info!(
            "🔄 Points cycle: {} addresses, resuming from index {}",
            total,
            start_index
        );

        Ok((addresses, start_index))
    }

    async fn walk(&self, addresses: &[String], start_index: usize) -> Result<PointsPassSummary, SyncError> {
        let total = addresses.len();
        let mut summary = PointsPassSummary {
            start_index,
            total_addresses: total,
            ..Default::default()
        };

        for (index, address) in addresses.iter().enumerate().skip(start_index) {
            let (call_started, result) = self.refresh_timed(address).await;

            match result {
                Ok(points) => {
                    summary.updated += 1;
                    log::debug!(
                        "✅ Points for {} updated: {} ({}/{})",
                        address,
                        points,
                        index + 1,
                        total
                    );
                    if summary.failed.is_empty() {
                        self.progress.set_address_cursor(index + 1).await?;
                    }
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    log::warn!("⚠️  Failed to refresh points for {}: {}", address, e);
                    summary.failed.push(address.clone());
                }
            }

            if index + 1 < total {
                sleep_until(call_started + self.address_spacing).await;
            }
        }

        let outcome = if summary.failed.is_empty() {
            CycleOutcome::Completed
        } else {
            CycleOutcome::Partial {
                failed: summary.failed.len(),
            }
        };
        self.progress.finish_points_cycle(outcome).await?;
        summary.completed = summary.failed.is_empty();

        log::info!(
            "✅ Points cycle finished: {} updated, {} failed, cursor reset to 0",
            summary.updated,
            summary.failed.len()
        );

        Ok(summary)
    }
}
