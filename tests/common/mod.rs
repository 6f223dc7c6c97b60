//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pointsflow::sync::{
    run_schema_migrations, ChainReader, PointsSyncJob, RateLimitedScheduler, SqliteStore,
    SyncError, TokenSyncJob,
};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

/// In-memory contracts: token owners plus points balances
#[derive(Default)]
pub struct MockChain {
    owners: Mutex<Vec<String>>,
    points: Mutex<HashMap<String, f64>>,
    failing_tokens: Mutex<HashSet<u64>>,
    owner_calls: Mutex<Vec<u64>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next token to `owner`; returns its id
    pub fn mint(&self, owner: &str) -> u64 {
        let mut owners = self.owners.lock().unwrap();
        owners.push(owner.to_string());
        owners.len() as u64
    }

    pub fn set_points(&self, address: &str, points: f64) {
        self.points.lock().unwrap().insert(address.to_lowercase(), points);
    }

    /// Make `ownerOf(token_id)` fail until `heal` is called
    pub fn break_token(&self, token_id: u64) {
        self.failing_tokens.lock().unwrap().insert(token_id);
    }

    pub fn heal(&self, token_id: u64) {
        self.failing_tokens.lock().unwrap().remove(&token_id);
    }

    pub fn owner_calls(&self) -> Vec<u64> {
        self.owner_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn token_counter(&self) -> Result<u64, SyncError> {
        Ok(self.owners.lock().unwrap().len() as u64)
    }

    async fn owner_of(&self, token_id: u64) -> Result<String, SyncError> {
        self.owner_calls.lock().unwrap().push(token_id);
        if self.failing_tokens.lock().unwrap().contains(&token_id) {
            return Err(SyncError::remote(format!("timeout fetching token {}", token_id)));
        }
        let owners = self.owners.lock().unwrap();
        token_id
            .checked_sub(1)
            .and_then(|i| owners.get(i as usize))
            .cloned()
            .ok_or_else(|| SyncError::invalid(format!("token {} not minted", token_id)))
    }

    async fn points_balance(&self, address: &str) -> Result<f64, SyncError> {
        Ok(*self
            .points
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .unwrap_or(&0.0))
    }
}

/// Migrated database file in a temporary directory
pub struct TestDb {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pointsflow.db");
        let mut conn = Connection::open(&path).unwrap();
        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh store on the same file, as a restarted process would open it
    pub fn open(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(&self.path).unwrap())
    }
}

/// Both jobs over one store and one fast scheduler
pub fn make_jobs(
    chain: Arc<MockChain>,
    store: Arc<SqliteStore>,
) -> (Arc<TokenSyncJob>, Arc<PointsSyncJob>) {
    let scheduler = Arc::new(RateLimitedScheduler::new(Duration::from_millis(1)));
    let token_job = Arc::new(TokenSyncJob::new(
        chain.clone(),
        store.clone(),
        store.clone(),
        scheduler.clone(),
    ));
    let points_job = Arc::new(PointsSyncJob::new(
        chain,
        store.clone(),
        store,
        scheduler,
        Duration::from_millis(1),
    ));
    (token_job, points_job)
}

/// `0x` + 40 hex digits ending in `tail`
pub fn address(tail: u32) -> String {
    format!("0x{:040x}", tail)
}
