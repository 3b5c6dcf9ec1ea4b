//! Notification store over a pooled SQLite database.
//!
//! Reads use any pooled connection. Mutations go through a
//! [`StoreTransaction`], which is opened with `BEGIN IMMEDIATE` and therefore
//! holds the database write lock until it commits or rolls back. That lock is
//! what serializes concurrent mutations of the same notification.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::schema::{apply_connection_pragmas, apply_pragmas, initialize_schema};
use crate::model::{NewNotification, Notification};
use crate::now_millis;

const SELECT_COLUMNS: &str =
    "SELECT id, type, recipient, subject, content, created_at, version FROM notifications";

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to get pooled connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Notification {0} disappeared inside its own transaction")]
    RowMissing(i64),

    #[error("Blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Pooled SQLite store for notifications.
#[derive(Clone)]
pub struct NotificationStore {
    pool: Pool<SqliteConnectionManager>,
}

impl NotificationStore {
    /// Open (or create) the database at `db_path`.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of pooled connections
    /// * `busy_timeout` - How long a writer waits for the write lock
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        max_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        // Schema and journal mode are set up before the pool hands out connections.
        {
            let conn = Connection::open(db_path.as_ref())?;
            apply_pragmas(&conn)?;
            initialize_schema(&conn)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(StoreConnectionCustomizer { busy_timeout }))
            .build(manager)?;

        tracing::debug!(max_size, "Notification store opened");
        Ok(Self { pool })
    }

    fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Find a notification by id. `None` when no row matches.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Notification>, StoreError> {
        let conn = self.get()?;
        find_one(&conn, id)
    }

    /// Up to `n` notifications, newest first. Ties on `created_at` break by id.
    pub fn find_top_n_by_recency(&self, n: usize) -> Result<Vec<Notification>, StoreError> {
        let conn = self.get()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([n as i64], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Begin a write transaction, taking the database write lock.
    ///
    /// Blocks up to the configured busy timeout while another transaction
    /// holds the lock.
    pub fn begin(&self) -> Result<StoreTransaction, StoreError> {
        let conn = self.get()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(StoreTransaction {
            conn,
            finished: false,
        })
    }
}

/// A write transaction holding the database write lock.
///
/// Dropping an unfinished transaction rolls it back.
pub struct StoreTransaction {
    conn: PooledConnection<SqliteConnectionManager>,
    finished: bool,
}

impl StoreTransaction {
    /// Insert a new notification, assigning `id`, `created_at` and `version`.
    ///
    /// `created_at` is strictly greater than every existing `created_at`, so
    /// two notifications created in the same millisecond still order.
    pub fn insert(&mut self, new: &NewNotification) -> Result<Notification, StoreError> {
        let latest: Option<i64> =
            self.conn
                .query_row("SELECT MAX(created_at) FROM notifications", [], |row| row.get(0))?;
        let now = now_millis();
        let created_at = match latest {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        };

        self.conn.execute(
            "INSERT INTO notifications (type, recipient, subject, content, created_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![new.kind, new.recipient, new.subject, new.content, created_at],
        )?;

        Ok(Notification {
            id: self.conn.last_insert_rowid(),
            kind: new.kind,
            recipient: new.recipient.clone(),
            subject: new.subject.clone(),
            content: new.content.clone(),
            created_at,
            version: 0,
        })
    }

    /// Write the mutable fields of an existing notification.
    pub fn update(&mut self, notification: &Notification) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE notifications SET subject = ?1, content = ?2 WHERE id = ?3",
            params![notification.subject, notification.content, notification.id],
        )?;
        if changed == 0 {
            return Err(StoreError::RowMissing(notification.id));
        }
        Ok(())
    }

    /// Find a notification inside this transaction.
    ///
    /// The write lock taken at `BEGIN IMMEDIATE` keeps any other transaction
    /// from locking or deleting this row until this one ends.
    pub fn find_and_lock_by_id(&mut self, id: i64) -> Result<Option<Notification>, StoreError> {
        find_one(&self.conn, id)
    }

    /// Delete a notification. Deleting an absent id succeeds.
    pub fn delete_by_id(&mut self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM notifications WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "Failed to roll back abandoned transaction");
            }
        }
    }
}

fn find_one(conn: &Connection, id: i64) -> Result<Option<Notification>, StoreError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            notification_from_row,
        )
        .optional()?;
    Ok(row)
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        kind: row.get(1)?,
        recipient: row.get(2)?,
        subject: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        version: row.get(6)?,
    })
}

/// Connection customizer that applies per-connection pragmas.
#[derive(Debug)]
struct StoreConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for StoreConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_connection_pragmas(conn, self.busy_timeout)
    }
}
