//! # Chain mirror sync
//!
//! Mirrors token ownership and per-owner points balances from two contracts
//! into SQLite, with every outbound call paced by one shared scheduler.
//!
//! ## Flow
//!
//! ```text
//! PollTrigger ─┬─> TokenSyncJob ──> tokens ─┐
//!              ├─> CounterWatcher (new ids) ├─> PointsSyncJob ──> points
//!              └─> PointsSyncJob ───────────┘
//! ```
//!
//! Both jobs resume from durable cursors in `sync_progress`, so a restart
//! never re-fetches the completed prefix of a walk.
//!
//! ## Module Organization
//!
//! - `chain` - `ChainReader` capability and address normalisation
//! - `rpc` - JSON-RPC `eth_call` implementation of `ChainReader`
//! - `db` - `RecordStore` / `ProgressStore` traits and the SQLite store
//! - `scheduler` - global rate limiter for chain calls
//! - `token_job` / `points_job` - the two walks
//! - `trigger` - interval and counter-watch drivers
//! - `config` - environment configuration
//! - `error` / `types` - shared error taxonomy and records

pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod points_job;
pub mod rpc;
pub mod scheduler;
pub mod token_job;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{normalize_address, ChainReader};
pub use config::{ConfigError, SyncConfig};
pub use db::{run_schema_migrations, ProgressStore, RecordStore, SqliteStore};
pub use error::SyncError;
pub use points_job::{PointsPassSummary, PointsSyncJob};
pub use rpc::RpcChainReader;
pub use scheduler::RateLimitedScheduler;
pub use token_job::{RecoverySummary, TokenPassSummary, TokenSyncJob};
pub use trigger::{CounterWatcher, PollTrigger, TriggerIntervals};
pub use types::{CycleOutcome, CycleState, PointsCycleStatus, PointsRecord, ProgressCursor, TokenRecord};
