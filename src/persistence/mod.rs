//! Snapshot Persistence
//!
//! TreapKV keeps all data in memory and periodically writes a full
//! [`Snapshot`] of the live state to one or more durable stores. On startup the
//! newest snapshot found in any store is replayed into a fresh engine.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │    Persistence     │  save() / restore()
//!                 └─────────┬──────────┘
//!                           │ dyn SnapshotStore
//!             ┌─────────────┴─────────────┐
//!             ▼                           ▼
//!      ┌─────────────┐             ┌─────────────┐
//!      │  FileStore  │             │  SqlStore   │
//!      │ (JSON file) │             │  (SQLite)   │
//!      └─────────────┘             └─────────────┘
//! ```
//!
//! Each save replaces the previous snapshot rather than appending to it.
//!
//! ## Example
//!
//! ```
//! use treapkv::persistence::{Persistence, SqlStore};
//! use treapkv::storage::{StorageEngine, Value};
//!
//! let engine = StorageEngine::new();
//! engine.rpush("queue", vec![Value::from(1), Value::from(2)]).unwrap();
//!
//! let persistence = Persistence::new().with_store(SqlStore::open_in_memory().unwrap());
//! persistence.save(&engine).unwrap();
//! ```

pub mod file;
pub mod snapshot;
pub mod sql;

pub use file::FileStore;
pub use snapshot::{Snapshot, FORMAT_VERSION};
pub use sql::SqlStore;

use crate::storage::StorageEngine;
use thiserror::Error;
use tracing::{error, info};

/// Errors raised while writing or reading snapshots.
///
/// None of these affect the in-memory engine; a failed save leaves it exactly
/// as it was.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// A durable place to keep the latest snapshot.
///
/// Implementations must be usable from the sweeper's blocking task as well as
/// from the shutdown path, hence `Send + Sync`.
pub trait SnapshotStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Replaces the stored snapshot with `snapshot`.
    fn write(&self, snapshot: &Snapshot) -> PersistenceResult<()>;

    /// Returns the stored snapshot, or `None` if nothing has been saved yet.
    fn read(&self) -> PersistenceResult<Option<Snapshot>>;
}

/// Saves to and restores from every configured store.
#[derive(Default)]
pub struct Persistence {
    stores: Vec<Box<dyn SnapshotStore>>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stores.iter().map(|s| s.name()).collect();
        f.debug_struct("Persistence").field("stores", &names).finish()
    }
}

impl Persistence {
    /// Creates a coordinator with no stores. Saving is then a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a store.
    pub fn with_store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.stores.is_empty()
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Writes a snapshot of `engine` to every store.
    ///
    /// The engine lock is held for the whole write. Every store is attempted
    /// even if an earlier one fails; the first failure is returned.
    pub fn save(&self, engine: &StorageEngine) -> PersistenceResult<()> {
        if self.stores.is_empty() {
            return Ok(());
        }

        engine.with_snapshot(|snapshot| {
            let mut first_error = None;
            for store in &self.stores {
                if let Err(e) = store.write(snapshot) {
                    error!(store = store.name(), error = %e, "Failed to write snapshot");
                    first_error.get_or_insert(e);
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    /// Replays the newest snapshot found in any store into `engine`.
    ///
    /// Returns the number of keys restored. Having no snapshot anywhere is not
    /// an error; the engine simply stays empty. A store that fails to read is
    /// logged and skipped as long as another store can provide a snapshot.
    pub fn restore(&self, engine: &StorageEngine) -> PersistenceResult<usize> {
        let mut newest: Option<(Snapshot, &str)> = None;
        let mut first_error = None;

        for store in &self.stores {
            match store.read() {
                Ok(Some(snapshot)) => {
                    let is_newer = newest
                        .as_ref()
                        .map_or(true, |(current, _)| snapshot.taken_at > current.taken_at);
                    if is_newer {
                        newest = Some((snapshot, store.name()));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(store = store.name(), error = %e, "Failed to read snapshot");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (newest, first_error) {
            (Some((snapshot, source)), _) => {
                let taken_at = snapshot.taken_at;
                let restored = engine.restore(snapshot);
                info!(store = source, taken_at, keys = restored, "Restored snapshot");
                Ok(restored)
            }
            (None, Some(e)) => Err(e),
            (None, None) => {
                info!("No snapshot found, starting empty");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StructKind, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A store that always fails to write and counts attempts.
    struct BrokenStore {
        attempts: Arc<AtomicUsize>,
    }

    impl SnapshotStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        fn write(&self, _snapshot: &Snapshot) -> PersistenceResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::UnsupportedVersion(0))
        }

        fn read(&self) -> PersistenceResult<Option<Snapshot>> {
            Ok(None)
        }
    }

    fn populated_engine() -> StorageEngine {
        let engine = StorageEngine::new();
        engine.set("name", Value::from("ann"), 0).unwrap();
        engine.set("count", Value::from(3), 300).unwrap();
        engine.rpush("list", vec![Value::from(1), Value::from("two")]).unwrap();
        engine.hset("hash", "field", Value::from(-1)).unwrap();
        engine
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let engine = populated_engine();
        Persistence::new()
            .with_store(FileStore::new(&path))
            .save(&engine)
            .unwrap();

        let restored = StorageEngine::new();
        let keys = Persistence::new()
            .with_store(FileStore::new(&path))
            .restore(&restored)
            .unwrap();

        assert_eq!(keys, 4);
        assert_eq!(restored.snapshot().scalars, engine.snapshot().scalars);
        assert_eq!(restored.snapshot().expire_at, engine.snapshot().expire_at);
        assert_eq!(restored.lget("list", 1), Ok(Value::from("two")));
        assert_eq!(restored.hget("hash", "field"), Some(Value::from(-1)));
    }

    #[test]
    fn test_round_trip_through_sqlite_omits_expired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");

        let engine = populated_engine();
        engine.set("short", Value::from(1), 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));

        Persistence::new()
            .with_store(SqlStore::open(&path).unwrap())
            .save(&engine)
            .unwrap();

        let restored = StorageEngine::new();
        let keys = Persistence::new()
            .with_store(SqlStore::open(&path).unwrap())
            .restore(&restored)
            .unwrap();

        assert_eq!(keys, 4);
        assert_eq!(restored.struct_kind("short"), StructKind::None);
        assert_eq!(restored.get("name"), Some(Value::from("ann")));
    }

    #[test]
    fn test_restore_picks_newest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileStore::new(dir.path().join("snapshot.json"));
        let sql = SqlStore::open_in_memory().unwrap();

        let mut older = Snapshot::empty(crate::storage::now_ms() - 1000);
        older.scalars.insert("from".into(), Value::from("file"));
        file.write(&older).unwrap();

        let mut newer = Snapshot::empty(crate::storage::now_ms());
        newer.scalars.insert("from".into(), Value::from("sqlite"));
        sql.write(&newer).unwrap();

        let engine = StorageEngine::new();
        Persistence::new()
            .with_store(file)
            .with_store(sql)
            .restore(&engine)
            .unwrap();

        assert_eq!(engine.get("from"), Some(Value::from("sqlite")));
    }

    #[test]
    fn test_restore_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new();
        let keys = Persistence::new()
            .with_store(FileStore::new(dir.path().join("missing.json")))
            .restore(&engine)
            .unwrap();
        assert_eq!(keys, 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_failed_save_tries_every_store_and_leaves_engine_alone() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sql = SqlStore::open_in_memory().unwrap();

        let persistence = Persistence::new()
            .with_store(BrokenStore {
                attempts: Arc::clone(&attempts),
            })
            .with_store(sql);

        let engine = populated_engine();
        let before = engine.snapshot();

        assert!(persistence.save(&engine).is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let mut after = engine.snapshot();
        after.taken_at = before.taken_at;
        assert_eq!(after, before);
    }

    #[test]
    fn test_save_without_stores_is_noop() {
        let persistence = Persistence::new();
        assert!(!persistence.is_enabled());
        assert!(persistence.save(&populated_engine()).is_ok());
    }
}
