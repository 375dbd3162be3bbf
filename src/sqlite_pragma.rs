//! Connection PRAGMAs shared by the writer and reader connections

use rusqlite::Connection;
use std::time::Duration;

/// Apply the PRAGMAs every connection to the activity database uses
///
/// - WAL journal so snapshot readers see a consistent view while a sync batch
///   is being written
/// - foreign keys on, so removing an entity cascades to its ledger rows
/// - a busy timeout instead of immediate SQLITE_BUSY between the two connections
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1_000)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}
