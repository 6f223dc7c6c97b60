//! Shared SQLite PRAGMA tuning
//!
//! Applied to every connection the store opens.

use rusqlite::Connection;
use std::time::Duration;

/// Busy timeout for a contended database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply WAL, NORMAL sync, in-memory temp store and a busy timeout
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
