//! Schema and pragmas for the notifications database.

use rusqlite::Connection;
use std::time::Duration;

/// Schema for the `notifications` table.
///
/// `AUTOINCREMENT` keeps ids from being reused after deletes.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    type        TEXT    NOT NULL CHECK (type IN ('EMAIL', 'SMS')),
    recipient   TEXT    NOT NULL,
    subject     TEXT,
    content     TEXT    NOT NULL,
    created_at  INTEGER NOT NULL,
    version     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notifications_recency
    ON notifications (created_at DESC, id DESC);
"#;

/// Apply database-wide pragmas. Run once on the first connection.
///
/// WAL lets readers proceed while a writer holds the write lock.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::trace!(journal_mode = %mode, "Journal mode set");
    Ok(())
}

/// Apply per-connection pragmas. Run on every pooled connection.
///
/// `busy_timeout` makes a second `BEGIN IMMEDIATE` wait for the first
/// transaction to finish instead of failing with `SQLITE_BUSY`.
pub fn apply_connection_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Create tables and indexes if they do not exist.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
