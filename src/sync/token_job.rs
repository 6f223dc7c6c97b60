//! Token ownership walk
//!
//! Walks `(cursor, idCounter]` in ascending order. Every owner fetch goes
//! through the shared scheduler; each success is upserted and then moves the
//! cursor from `id - 1` to `id`. A failed id is logged and left behind: later
//! ids of the same pass are still fetched, but the cursor stays frozen below
//! the failure so the next pass restarts there (at-least-once per token,
//! idempotent by upsert). Only chain-side failures are skipped this way; a
//! storage failure aborts the pass.
//!
//! There is no overlap guard. Two passes running at once (interval driver
//! plus `/trigger-cache`) duplicate fetches, but the compare-and-set cursor
//! cannot regress or skip.

use super::chain::{normalize_address, ChainReader};
use super::db::{ProgressStore, RecordStore};
use super::error::SyncError;
use super::scheduler::RateLimitedScheduler;
use std::sync::Arc;

/// Result of one cursor-based pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenPassSummary {
    /// Cursor value the pass started from
    pub start_cursor: u64,
    /// On-chain counter at the start of the pass
    pub counter: u64,
    pub fetched: u64,
    pub failed: Vec<u64>,
    /// Cursor value after the pass
    pub end_cursor: u64,
}

/// Result of a gap-healing scan over `1..=idCounter`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoverySummary {
    pub scanned: u64,
    pub missing: u64,
    pub recovered: u64,
    pub failed: Vec<u64>,
}

pub struct TokenSyncJob {
    chain: Arc<dyn ChainReader>,
    records: Arc<dyn RecordStore>,
    progress: Arc<dyn ProgressStore>,
    scheduler: Arc<RateLimitedScheduler>,
}

impl TokenSyncJob {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        records: Arc<dyn RecordStore>,
        progress: Arc<dyn ProgressStore>,
        scheduler: Arc<RateLimitedScheduler>,
    ) -> Self {
        Self {
            chain,
            records,
            progress,
            scheduler,
        }
    }

    /// Read `idCounter()` through the scheduler
    pub async fn token_counter(&self) -> Result<u64, SyncError> {
        self.scheduler.schedule(|| self.chain.token_counter()).await
    }

    /// Fetch and persist the owner of one token (cursor untouched)
    pub async fn sync_token(&self, token_id: u64) -> Result<String, SyncError> {
        let owner = self
            .scheduler
            .schedule(|| self.chain.owner_of(token_id))
            .await?;
        let owner = normalize_address(&owner)?;

        self.records.upsert_token(token_id, &owner).await?;
        log::debug!("✅ Token {} cached with owner {}", token_id, owner);

        Ok(owner)
    }

    /// Full resumable pass from the durable cursor up to the live counter
    ///
    /// Errors only for whole-cycle failures: the counter or cursor cannot be
    /// read, or a record or cursor write fails.
    pub async fn run(&self) -> Result<TokenPassSummary, SyncError> {
        let counter = self.token_counter().await?;
        let start_cursor = self.progress.token_cursor().await?;

        let mut summary = TokenPassSummary {
            start_cursor,
            counter,
            end_cursor: start_cursor,
            ..Default::default()
        };

        if start_cursor >= counter {
            log::debug!("Token cursor {} is at counter {}, nothing to fetch", start_cursor, counter);
            return Ok(summary);
        }

        log::info!(
            "🔄 Token pass: fetching owners {}..={} ({} tokens)",
            start_cursor + 1,
            counter,
            counter - start_cursor
        );

        for token_id in (start_cursor + 1)..=counter {
            match self.sync_token(token_id).await {
                Ok(_) => {
                    summary.fetched += 1;
                    self.progress.advance_token_cursor(token_id).await?;
                }
                Err(e) if !e.is_retryable() => {
                    log::error!("❌ Token pass aborted at token {}: {}", token_id, e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("⚠️  Failed to fetch owner for token {}: {}", token_id, e);
                    summary.failed.push(token_id);
                }
            }
        }

        summary.end_cursor = self.progress.token_cursor().await?;

        log::info!(
            "✅ Token pass complete: {} fetched, {} failed, cursor {} -> {}",
            summary.fetched,
            summary.failed.len(),
            summary.start_cursor,
            summary.end_cursor
        );

        Ok(summary)
    }

    /// Fetch owners for `(from, to]` and return the successes
    ///
    /// Used by the counter watcher for freshly minted ids. The cursor only
    /// moves when the range continues it contiguously.
    pub async fn sync_range(&self, from: u64, to: u64) -> Result<Vec<(u64, String)>, SyncError> {
        let mut synced = Vec::new();

        for token_id in (from + 1)..=to {
            match self.sync_token(token_id).await {
                Ok(owner) => {
                    self.progress.advance_token_cursor(token_id).await?;
                    synced.push((token_id, owner));
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    log::warn!("⚠️  Failed to fetch owner for new token {}: {}", token_id, e);
                }
            }
        }

        Ok(synced)
    }

    /// Re-fetch every id in `1..=idCounter` that has no stored record
    ///
    /// Heals gaps left by historical bugs; independent of the cursor.
    pub async fn recover_missing(&self) -> Result<RecoverySummary, SyncError> {
        let counter = self.token_counter().await?;
        log::info!("🩹 Recovering missing tokens up to {}", counter);

        let mut summary = RecoverySummary::default();

        for token_id in 1..=counter {
            summary.scanned += 1;
            if self.records.token_exists(token_id).await? {
                continue;
            }

            summary.missing += 1;
            log::info!("   ├─ Token {} is missing, fetching", token_id);

            match self.sync_token(token_id).await {
                Ok(_) => summary.recovered += 1,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    log::warn!("⚠️  Recovery fetch failed for token {}: {}", token_id, e);
                    summary.failed.push(token_id);
                }
            }
        }

        log::info!(
            "✅ Recovery complete: {} missing, {} recovered, {} failed",
            summary.missing,
            summary.recovered,
            summary.failed.len()
        );

        Ok(summary)
    }
}
