//! SQLite-backed QueueStore implementation.
//! Several processes can open the same database file and coordinate through it.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! seatlock-core = { path = "../seatlock-core", features = ["sqlite"] }
//! ```

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::QueueError;
use crate::infrastructure::{QueueStore, QueueTx, TxWork};
use crate::types::QueueEntry;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

const ENTRY_COLUMNS: &str =
    "resource_id, user_id, position, joined_at, last_heartbeat_at, granted_at, user_email, user_name";

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                QueueError::Transient(err.to_string())
            }
            _ => QueueError::Storage(err.to_string()),
        }
    }
}

/// A persistent queue store backed by SQLite.
///
/// Uses WAL mode and `BEGIN IMMEDIATE` transactions: the write lock is taken
/// up front, so two writers on the file serialize instead of deadlocking on a
/// lock upgrade. A writer that cannot get the lock within the busy timeout
/// gets `QueueError::Transient`.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, QueueError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue_entries (
                resource_id       TEXT NOT NULL,
                user_id           TEXT NOT NULL,
                position          INTEGER NOT NULL,
                joined_at         INTEGER NOT NULL,
                last_heartbeat_at INTEGER,
                granted_at        INTEGER,
                user_email        TEXT,
                user_name         TEXT,
                PRIMARY KEY (resource_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_queue_entries_order
                ON queue_entries(resource_id, position, joined_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Committed rows of a resource, ordered by position.
    pub fn entries(&self, resource_id: &str) -> Result<Vec<QueueEntry>, QueueError> {
        let conn = self.lock()?;
        load_entries(&conn, resource_id)
    }

    /// Single-row lookup outside of any coordinator transaction.
    pub fn entry(&self, resource_id: &str, user_id: &str) -> Result<Option<QueueEntry>, QueueError> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM queue_entries
                     WHERE resource_id = ?1 AND user_id = ?2"
                ),
                params![resource_id, user_id],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        Ok(QueueEntry {
            resource_id: row.get(0)?,
            user_id: row.get(1)?,
            position: row.get(2)?,
            joined_at: row.get(3)?,
            last_heartbeat_at: row.get(4)?,
            granted_at: row.get(5)?,
            user_email: row.get(6)?,
            user_name: row.get(7)?,
        })
    }
}

fn load_entries(conn: &Connection, resource_id: &str) -> Result<Vec<QueueEntry>, QueueError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENTRY_COLUMNS} FROM queue_entries
         WHERE resource_id = ?1
         ORDER BY position ASC, joined_at ASC, user_id ASC"
    ))?;
    let rows = stmt.query_map(params![resource_id], SqliteQueueStore::row_to_entry)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

struct SqliteTx<'c> {
    tx: rusqlite::Transaction<'c>,
    resource_id: String,
}

impl QueueTx for SqliteTx<'_> {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn load_queue(&mut self) -> Result<Vec<QueueEntry>, QueueError> {
        load_entries(&self.tx, &self.resource_id)
    }

    fn upsert(&mut self, entry: &QueueEntry) -> Result<(), QueueError> {
        if entry.resource_id != self.resource_id {
            return Err(QueueError::Storage(format!(
                "entry for '{}' written inside a transaction on '{}'",
                entry.resource_id, self.resource_id
            )));
        }
        self.tx.execute(
            &format!(
                "INSERT INTO queue_entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(resource_id, user_id) DO UPDATE SET
                    position = excluded.position,
                    joined_at = excluded.joined_at,
                    last_heartbeat_at = excluded.last_heartbeat_at,
                    granted_at = excluded.granted_at,
                    user_email = excluded.user_email,
                    user_name = excluded.user_name"
            ),
            params![
                entry.resource_id,
                entry.user_id,
                entry.position,
                entry.joined_at,
                entry.last_heartbeat_at,
                entry.granted_at,
                entry.user_email,
                entry.user_name,
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, user_id: &str) -> Result<bool, QueueError> {
        let rows = self.tx.execute(
            "DELETE FROM queue_entries WHERE resource_id = ?1 AND user_id = ?2",
            params![self.resource_id, user_id],
        )?;
        Ok(rows > 0)
    }
}

impl QueueStore for SqliteQueueStore {
    fn transact(&self, resource_id: &str, work: &mut TxWork<'_>) -> Result<(), QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut scoped = SqliteTx {
            tx,
            resource_id: resource_id.to_string(),
        };
        // Dropping `scoped` on error rolls the transaction back.
        work(&mut scoped)?;
        scoped.tx.commit()?;
        Ok(())
    }

    fn resource_ids(&self) -> Result<Vec<String>, QueueError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT resource_id FROM queue_entries ORDER BY resource_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
