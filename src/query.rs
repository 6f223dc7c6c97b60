//! Read-only views over the mirrored records
//!
//! Never touches the chain; every answer comes straight from the stores.

use crate::sync::{normalize_address, PointsCycleStatus, PointsRecord, ProgressStore, RecordStore, SyncError, TokenRecord};
use serde::Serialize;
use std::sync::Arc;

/// Rows returned by the leaderboard
pub const LEADERBOARD_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenList {
    pub total_tokens: usize,
    pub tokens: Vec<TokenRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub total_tokens: u64,
    pub last_processed_token_id: u64,
    pub last_processed_address_index: usize,
    pub points_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub leaderboard: Vec<PointsRecord>,
}

pub struct QueryService {
    records: Arc<dyn RecordStore>,
    progress: Arc<dyn ProgressStore>,
}

impl QueryService {
    pub fn new(records: Arc<dyn RecordStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { records, progress }
    }

    /// Top holders by points, highest first
    pub async fn leaderboard(&self) -> Result<Leaderboard, SyncError> {
        let leaderboard = self.records.top_points(LEADERBOARD_SIZE).await?;
        Ok(Leaderboard { leaderboard })
    }

    /// Stored balance for `address`, 0 when never fetched
    ///
    /// Lookup is case-insensitive. Input that is not a well-formed address
    /// is lowercased as-is and simply finds nothing.
    pub async fn points_for_address(&self, address: &str) -> Result<PointsRecord, SyncError> {
        let address = normalize_address(address).unwrap_or_else(|_| address.trim().to_lowercase());
        let points = self.records.points_for(&address).await?.unwrap_or(0.0);
        Ok(PointsRecord { address, points })
    }

    /// All mirrored tokens, optionally only those owned by `owner`
    pub async fn tokens(&self, owner: Option<&str>) -> Result<TokenList, SyncError> {
        let owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_lowercase);
        let tokens = self.records.tokens(owner.as_deref()).await?;
        Ok(TokenList {
            total_tokens: tokens.len(),
            tokens,
        })
    }

    pub async fn database_status(&self) -> Result<DatabaseStatus, SyncError> {
        let total_tokens = self.records.token_count().await?;
        let cursor = self.progress.cursor().await?;
        Ok(DatabaseStatus {
            total_tokens,
            last_processed_token_id: cursor.last_processed_token_id,
            last_processed_address_index: cursor.last_processed_address_index,
            points_lock: cursor.lock,
        })
    }

    /// Latest points cycle, `None` before the first one starts
    pub async fn points_update_status(&self) -> Result<Option<PointsCycleStatus>, SyncError> {
        self.progress.points_cycle_status().await
    }
}
