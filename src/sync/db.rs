//! SQLite persistence for the mirror and the sync cursor
//!
//! Tables (see `sql/`):
//! - `tokens` - UPSERT on token_id (TokenSyncJob only)
//! - `points` - UPSERT on address (PointsSyncJob only)
//! - `sync_progress` - singleton cursor row, created on first write
//! - `points_cycle_status` - outcome of the latest points cycle
//!
//! Every cursor mutation is a single conditional UPDATE executed while the
//! connection mutex is held, so the read-modify-write is atomic within the
//! process and across processes sharing the file.

use super::error::SyncError;
use super::types::{CycleOutcome, CycleState, PointsCycleStatus, PointsRecord, ProgressCursor, TokenRecord};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Keyed upserts and read queries over the mirrored records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert-or-update the owner of `token_id`
    async fn upsert_token(&self, token_id: u64, owner: &str) -> Result<(), SyncError>;

    async fn token_exists(&self, token_id: u64) -> Result<bool, SyncError>;

    /// All tokens, or only those held by `owner`, ordered by token id
    async fn tokens(&self, owner: Option<&str>) -> Result<Vec<TokenRecord>, SyncError>;

    async fn token_count(&self) -> Result<u64, SyncError>;

    /// Distinct owners ordered by first appearance (lowest token id)
    async fn distinct_owners(&self) -> Result<Vec<String>, SyncError>;

    /// Insert-or-update the points balance of `address`
    async fn upsert_points(&self, address: &str, points: f64) -> Result<(), SyncError>;

    async fn points_for(&self, address: &str) -> Result<Option<f64>, SyncError>;

    /// Highest balances first, ties broken by address
    async fn top_points(&self, limit: usize) -> Result<Vec<PointsRecord>, SyncError>;
}

/// Durable cursor, advisory lock and points-cycle bookkeeping
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn cursor(&self) -> Result<ProgressCursor, SyncError>;

    /// Last contiguous token id persisted (0 when no record exists)
    async fn token_cursor(&self) -> Result<u64, SyncError>;

    /// Last value wins
    async fn set_token_cursor(&self, token_id: u64) -> Result<(), SyncError>;

    /// Compare-and-set from `token_id - 1` to `token_id`
    ///
    /// Returns false (and writes nothing) when the cursor is anywhere else.
    async fn advance_token_cursor(&self, token_id: u64) -> Result<bool, SyncError>;

    async fn address_cursor(&self) -> Result<usize, SyncError>;

    async fn set_address_cursor(&self, index: usize) -> Result<(), SyncError>;

    /// Flip `lock` false -> true; true only for the caller that flipped it
    async fn try_acquire_lock(&self) -> Result<bool, SyncError>;

    /// Unconditionally clear `lock`
    async fn release_lock(&self) -> Result<(), SyncError>;

    async fn begin_points_cycle(&self, start_index: usize, total_addresses: usize) -> Result<(), SyncError>;

    /// Close the running cycle; an outcome that reached the end of the walk
    /// also resets the address cursor to 0 in the same transaction.
    async fn finish_points_cycle(&self, outcome: CycleOutcome) -> Result<(), SyncError>;

    async fn points_cycle_status(&self) -> Result<Option<PointsCycleStatus>, SyncError>;
}

/// Run schema migrations from SQL files
///
/// Executes every `.sql` file of `schema_dir` in file-name order
/// (00_, 01_, …). Files must use `IF NOT EXISTS` so reruns are no-ops.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    apply_optimized_pragmas(conn)?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let filename = entry.file_name().to_string_lossy().to_string();
        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(entry.path())?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

/// SQLite implementation of `RecordStore` and `ProgressStore`
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    /// Held lock older than this many seconds may be taken over (0 = never)
    lock_ttl_secs: i64,
}

impl SqliteStore {
    /// Open the store on an existing, migrated database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lock_ttl_secs: 0,
        })
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_secs = ttl.as_secs() as i64;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::storage("connection mutex poisoned"))
    }

    /// Upsert-if-absent of the singleton progress row
    fn ensure_progress_row(conn: &Connection, now: i64) -> Result<(), SyncError> {
        conn.execute(
            "INSERT OR IGNORE INTO sync_progress (id, last_token_id, last_address_index, lock, updated_at)
             VALUES (1, 0, 0, 0, ?1)",
            params![now],
        )?;
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn sql_id(value: u64) -> Result<i64, SyncError> {
    i64::try_from(value).map_err(|_| SyncError::storage(format!("value {} exceeds SQLite INTEGER", value)))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_token(&self, token_id: u64, owner: &str) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();

        conn.execute(
            r#"
            INSERT INTO tokens (token_id, owner, updated_at, created_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(token_id) DO UPDATE SET
                owner = excluded.owner,
                updated_at = excluded.updated_at
            "#,
            params![sql_id(token_id)?, owner.to_lowercase(), now],
        )?;

        Ok(())
    }

    async fn token_exists(&self, token_id: u64) -> Result<bool, SyncError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM tokens WHERE token_id = ?1")?;
        Ok(stmt.exists(params![sql_id(token_id)?])?)
    }

    async fn tokens(&self, owner: Option<&str>) -> Result<Vec<TokenRecord>, SyncError> {
        let conn = self.conn()?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TokenRecord> {
            Ok(TokenRecord {
                token_id: row.get::<_, i64>(0)? as u64,
                owner: row.get(1)?,
            })
        };

        let records = match owner {
            Some(owner) => {
                let mut stmt = conn.prepare(
                    "SELECT token_id, owner FROM tokens WHERE owner = ?1 ORDER BY token_id ASC",
                )?;
                let rows = stmt.query_map(params![owner.to_lowercase()], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT token_id, owner FROM tokens ORDER BY token_id ASC")?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        Ok(records)
    }

    async fn token_count(&self) -> Result<u64, SyncError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn distinct_owners(&self) -> Result<Vec<String>, SyncError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT owner FROM tokens GROUP BY owner ORDER BY MIN(token_id) ASC",
        )?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }

    async fn upsert_points(&self, address: &str, points: f64) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();

        conn.execute(
            r#"
            INSERT INTO points (address, points, updated_at, created_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(address) DO UPDATE SET
                points = excluded.points,
                updated_at = excluded.updated_at
            "#,
            params![address.to_lowercase(), points, now],
        )?;

        Ok(())
    }

    async fn points_for(&self, address: &str) -> Result<Option<f64>, SyncError> {
        let conn = self.conn()?;
        let points = conn
            .query_row(
                "SELECT points FROM points WHERE address = ?1",
                params![address.to_lowercase()],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(points)
    }

    async fn top_points(&self, limit: usize) -> Result<Vec<PointsRecord>, SyncError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, points FROM points ORDER BY points DESC, address ASC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(PointsRecord {
                    address: row.get(0)?,
                    points: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn cursor(&self) -> Result<ProgressCursor, SyncError> {
        let conn = self.conn()?;
        let cursor = conn
            .query_row(
                "SELECT last_token_id, last_address_index, lock FROM sync_progress WHERE id = 1",
                [],
                |row| {
                    Ok(ProgressCursor {
                        last_processed_token_id: row.get::<_, i64>(0)? as u64,
                        last_processed_address_index: row.get::<_, i64>(1)? as usize,
                        lock: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(cursor.unwrap_or_default())
    }

    async fn token_cursor(&self) -> Result<u64, SyncError> {
        Ok(self.cursor().await?.last_processed_token_id)
    }

    async fn set_token_cursor(&self, token_id: u64) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();
        Self::ensure_progress_row(&conn, now)?;
        conn.execute(
            "UPDATE sync_progress SET last_token_id = ?1, updated_at = ?2 WHERE id = 1",
            params![sql_id(token_id)?, now],
        )?;
        Ok(())
    }

    async fn advance_token_cursor(&self, token_id: u64) -> Result<bool, SyncError> {
        if token_id == 0 {
            return Ok(false);
        }

        let conn = self.conn()?;
        let now = now();
        Self::ensure_progress_row(&conn, now)?;
        let changed = conn.execute(
            "UPDATE sync_progress SET last_token_id = ?1, updated_at = ?2
             WHERE id = 1 AND last_token_id = ?1 - 1",
            params![sql_id(token_id)?, now],
        )?;
        Ok(changed == 1)
    }

    async fn address_cursor(&self) -> Result<usize, SyncError> {
        Ok(self.cursor().await?.last_processed_address_index)
    }

    async fn set_address_cursor(&self, index: usize) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();
        Self::ensure_progress_row(&conn, now)?;
        conn.execute(
            "UPDATE sync_progress SET last_address_index = ?1, updated_at = ?2 WHERE id = 1",
            params![index as i64, now],
        )?;
        Ok(())
    }

    async fn try_acquire_lock(&self) -> Result<bool, SyncError> {
        let conn = self.conn()?;
        let now = now();
        Self::ensure_progress_row(&conn, now)?;

        let (held, acquired_at): (i64, Option<i64>) = conn.query_row(
            "SELECT lock, lock_acquired_at FROM sync_progress WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let changed = conn.execute(
            "UPDATE sync_progress SET lock = 1, lock_acquired_at = ?1, updated_at = ?1
             WHERE id = 1
               AND (lock = 0
                    OR (?2 > 0 AND lock_acquired_at IS NOT NULL AND lock_acquired_at <= ?1 - ?2))",
            params![now, self.lock_ttl_secs],
        )?;

        if changed == 1 && held != 0 {
            log::warn!(
                "⚠️  Reclaimed stale points lock (held since {})",
                acquired_at.unwrap_or_default()
            );
        }

        Ok(changed == 1)
    }

    async fn release_lock(&self) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();
        Self::ensure_progress_row(&conn, now)?;
        conn.execute(
            "UPDATE sync_progress SET lock = 0, lock_acquired_at = NULL, updated_at = ?1 WHERE id = 1",
            params![now],
        )?;
        Ok(())
    }

    async fn begin_points_cycle(&self, start_index: usize, total_addresses: usize) -> Result<(), SyncError> {
        let conn = self.conn()?;
        let now = now();
        conn.execute(
            r#"
            INSERT INTO points_cycle_status
                (id, state, start_index, total_addresses, failed_addresses, started_at, finished_at, last_error, updated_at)
            VALUES (1, ?1, ?2, ?3, 0, ?4, NULL, NULL, ?4)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                start_index = excluded.start_index,
                total_addresses = excluded.total_addresses,
                failed_addresses = 0,
                started_at = excluded.started_at,
                finished_at = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                CycleState::Running.as_str(),
                start_index as i64,
                total_addresses as i64,
                now
            ],
        )?;
        Ok(())
    }

    async fn finish_points_cycle(&self, outcome: CycleOutcome) -> Result<(), SyncError> {
        let mut conn = self.conn()?;
        let now = now();
        let tx = conn.transaction()?;

        let (state, failed, error) = match &outcome {
            CycleOutcome::Completed => (CycleState::Completed, 0, None),
            CycleOutcome::Partial { failed } => (CycleState::Partial, *failed, None),
            CycleOutcome::Aborted { error } => (CycleState::Aborted, 0, Some(error.clone())),
        };

        if outcome.reached_end() {
            Self::ensure_progress_row(&tx, now)?;
            tx.execute(
                "UPDATE sync_progress SET last_address_index = 0, updated_at = ?1 WHERE id = 1",
                params![now],
            )?;
        }

        tx.execute(
            "UPDATE points_cycle_status
             SET state = ?1, failed_addresses = ?2, last_error = ?3, finished_at = ?4, updated_at = ?4
             WHERE id = 1",
            params![state.as_str(), failed as i64, error, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn points_cycle_status(&self) -> Result<Option<PointsCycleStatus>, SyncError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT s.state, s.start_index, COALESCE(p.last_address_index, 0), s.total_addresses,
                       s.failed_addresses, s.started_at, s.finished_at, s.last_error, s.updated_at
                FROM points_cycle_status s
                LEFT JOIN sync_progress p ON p.id = 1
                WHERE s.id = 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        PointsCycleStatus {
                            state: CycleState::Running,
                            start_index: row.get::<_, i64>(1)? as usize,
                            last_updated_index: row.get::<_, i64>(2)? as usize,
                            total_addresses: row.get::<_, i64>(3)? as usize,
                            failed_addresses: row.get::<_, i64>(4)? as usize,
                            started_at: row.get(5)?,
                            finished_at: row.get(6)?,
                            last_error: row.get(7)?,
                            updated_at: row.get(8)?,
                        },
                    ))
                },
            )
            .optional()?;

        match row {
            Some((state, mut status)) => {
                status.state = CycleState::parse(&state)
                    .ok_or_else(|| SyncError::storage(format!("unknown cycle state '{}'", state)))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}
