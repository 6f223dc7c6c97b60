//! Records mirrored from chain plus the sync bookkeeping rows

use serde::{Deserialize, Serialize};

/// Owner of one token id (owner is always lowercase `0x…`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token_id: u64,
    pub owner: String,
}

/// Most recently fetched points balance for an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsRecord {
    pub address: String,
    pub points: f64,
}

/// Snapshot of the singleton `sync_progress` row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCursor {
    pub last_processed_token_id: u64,
    pub last_processed_address_index: usize,
    pub lock: bool,
}

/// Lifecycle state of a points cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Running,
    Completed,
    Partial,
    Aborted,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Running => "running",
            CycleState::Completed => "completed",
            CycleState::Partial => "partial",
            CycleState::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(CycleState::Running),
            "completed" => Some(CycleState::Completed),
            "partial" => Some(CycleState::Partial),
            "aborted" => Some(CycleState::Aborted),
            _ => None,
        }
    }
}

/// How a points cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Every address refreshed
    Completed,
    /// Walk reached the end but some addresses failed
    Partial { failed: usize },
    /// The walk stopped on an unrecovered error
    Aborted { error: String },
}

impl CycleOutcome {
    /// True when every address was visited, so the next cycle starts at 0
    pub fn reached_end(&self) -> bool {
        matches!(self, CycleOutcome::Completed | CycleOutcome::Partial { .. })
    }
}

/// Row of `points_cycle_status`, joined with the live address cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsCycleStatus {
    pub state: CycleState,
    pub start_index: usize,
    pub last_updated_index: usize,
    pub total_addresses: usize,
    pub failed_addresses: usize,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
    pub updated_at: i64,
}
