//! SQLite snapshot store.
//!
//! Snapshots are kept in a single table:
//!
//! ```sql
//! CREATE TABLE snapshots (
//!     version  INTEGER PRIMARY KEY AUTOINCREMENT,
//!     taken_at INTEGER NOT NULL,
//!     payload  TEXT    NOT NULL
//! );
//! ```
//!
//! Every write appends a row and prunes all older ones in the same
//! transaction, so the table holds exactly one snapshot once anything has been
//! saved.

use crate::persistence::{PersistenceResult, Snapshot, SnapshotStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    version  INTEGER PRIMARY KEY AUTOINCREMENT,
    taken_at INTEGER NOT NULL,
    payload  TEXT    NOT NULL
)";

/// Snapshot store backed by an SQLite database.
#[derive(Debug)]
pub struct SqlStore {
    conn: Mutex<Connection>,
}

impl SqlStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> PersistenceResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PersistenceResult<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of snapshot rows currently stored.
    pub fn row_count(&self) -> PersistenceResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl SnapshotStore for SqlStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn write(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        let payload = snapshot.to_json()?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (taken_at, payload) VALUES (?1, ?2)",
            params![snapshot.taken_at, payload],
        )?;
        let version = tx.last_insert_rowid();
        let pruned = tx.execute("DELETE FROM snapshots WHERE version < ?1", params![version])?;
        tx.commit()?;

        debug!(version, pruned, "Wrote snapshot row");
        Ok(())
    }

    fn read(&self) -> PersistenceResult<Option<Snapshot>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM snapshots ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        payload.as_deref().map(Snapshot::from_json).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn test_empty_database() {
        let store = SqlStore::open_in_memory().unwrap();
        assert!(store.read().unwrap().is_none());
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_keeps_only_latest_row() {
        let store = SqlStore::open_in_memory().unwrap();

        for i in 0..3 {
            let mut snapshot = Snapshot::empty(i);
            snapshot.scalars.insert("i".into(), Value::from(i));
            store.write(&snapshot).unwrap();
        }

        assert_eq!(store.row_count().unwrap(), 1);
        let latest = store.read().unwrap().unwrap();
        assert_eq!(latest.taken_at, 2);
        assert_eq!(latest.scalars.get("i"), Some(&Value::from(2)));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");

        let mut snapshot = Snapshot::empty(7);
        snapshot.arrays.insert("a".into(), vec![Value::from("x")]);
        SqlStore::open(&path).unwrap().write(&snapshot).unwrap();

        let reopened = SqlStore::open(&path).unwrap();
        assert_eq!(reopened.read().unwrap(), Some(snapshot));
    }
}
