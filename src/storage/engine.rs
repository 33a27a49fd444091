//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for TreapKV. It owns every
//! piece of mutable state: scalars, hashes, treap-backed arrays, the per-key
//! structural kind and the expiration deadlines.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: All maps live in a single `State` behind one `RwLock`. Every
//!    command holds it for its full duration, so commands are atomic with
//!    respect to each other and observe a total order.
//! 2. **One Kind Per Key**: A key is a scalar, an array or a hash. Commands aimed
//!    at another kind fail with [`StorageError::TypeConflict`]; nothing is ever
//!    converted implicitly.
//! 3. **Lazy Expiry**: Every access path checks the key's deadline first and
//!    evicts it if stale. The background sweeper (see `expiry`) reclaims keys
//!    nobody touches again.
//! 4. **Wall-Clock Deadlines**: Deadlines are absolute Unix milliseconds so they
//!    survive a snapshot/restore cycle.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                   RwLock<State>                       │  │
//! │  │  scalars   arrays (Treap)   hashes   kinds   expiry   │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲                ▲                      ▲
//!   connection tasks  connection tasks     ExpirySweeper
//! ```
//!
//! Pure lookups take the read lock and only upgrade to the write lock when they
//! find an expired key that has to be evicted.

use crate::persistence::Snapshot;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::treap::{resolve_pop_range, Treap};
use crate::storage::value::{Kind, StructKind, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Everything guarded by the engine lock.
#[derive(Debug, Default)]
struct State {
    scalars: HashMap<String, Value>,
    arrays: HashMap<String, Treap>,
    hashes: HashMap<String, HashMap<String, Value>>,
    kinds: HashMap<String, StructKind>,
    /// Absolute deadlines in Unix ms. Keys without an entry never expire.
    expire_at: HashMap<String, i64>,
    /// Keys evicted because their deadline passed
    expired: u64,
}

impl State {
    fn struct_kind(&self, key: &str) -> StructKind {
        self.kinds.get(key).copied().unwrap_or(StructKind::None)
    }

    #[inline]
    fn is_expired(&self, key: &str, now: i64) -> bool {
        self.expire_at
            .get(key)
            .map(|&deadline| deadline > 0 && now >= deadline)
            .unwrap_or(false)
    }

    /// Removes `key` from every map.
    fn remove(&mut self, key: &str) -> StructKind {
        let kind = self.kinds.remove(key).unwrap_or(StructKind::None);
        match kind {
            StructKind::Scalar => {
                self.scalars.remove(key);
            }
            StructKind::Array => {
                self.arrays.remove(key);
            }
            StructKind::Hash => {
                self.hashes.remove(key);
            }
            StructKind::None => {}
        }
        self.expire_at.remove(key);
        kind
    }

    /// Evicts `key` if its deadline has passed. Returns `true` if it did.
    fn evict_if_expired(&mut self, key: &str, now: i64) -> bool {
        if !self.is_expired(key, now) {
            return false;
        }
        let kind = self.remove(key);
        self.expired += 1;
        trace!(key = %key, kind = %kind, "Evicted expired key");
        true
    }

    fn set_deadline(&mut self, key: &str, deadline: i64) {
        if deadline > 0 {
            self.expire_at.insert(key.to_string(), deadline);
        } else {
            self.expire_at.remove(key);
        }
    }

    fn expire(&mut self, key: &str, seconds: i64, now: i64) -> u8 {
        self.evict_if_expired(key, now);
        if self.struct_kind(key) == StructKind::None {
            return 0;
        }
        if seconds == 0 {
            self.expire_at.remove(key);
        } else {
            // Keep the deadline positive so a huge negative TTL still expires the key
            let deadline = now.saturating_add(seconds.saturating_mul(1000)).max(1);
            self.expire_at.insert(key.to_string(), deadline);
        }
        1
    }

    fn set(&mut self, key: &str, value: Value, ttl_secs: i64, now: i64) -> StorageResult<()> {
        self.evict_if_expired(key, now);
        match self.struct_kind(key) {
            StructKind::Array | StructKind::Hash => return Err(StorageError::TypeConflict),
            StructKind::Scalar | StructKind::None => {}
        }
        self.scalars.insert(key.to_string(), value);
        self.kinds.insert(key.to_string(), StructKind::Scalar);
        self.expire(key, ttl_secs, now);
        Ok(())
    }

    /// Returns the hash at `key`, creating it if the key is free.
    fn ensure_hash(&mut self, key: &str, now: i64) -> StorageResult<&mut HashMap<String, Value>> {
        self.evict_if_expired(key, now);
        match self.struct_kind(key) {
            StructKind::Scalar | StructKind::Array => return Err(StorageError::TypeConflict),
            StructKind::None => {
                self.kinds.insert(key.to_string(), StructKind::Hash);
            }
            StructKind::Hash => {}
        }
        Ok(self.hashes.entry(key.to_string()).or_default())
    }

    fn hset(&mut self, key: &str, field: &str, value: Value, now: i64) -> StorageResult<()> {
        self.ensure_hash(key, now)?
            .insert(field.to_string(), value);
        // Every write to a hash leaves it without a deadline, like SET
        self.expire_at.remove(key);
        Ok(())
    }

    /// Returns the treap at `key`, creating it if the key is free.
    fn ensure_array(&mut self, key: &str, now: i64) -> StorageResult<&mut Treap> {
        self.evict_if_expired(key, now);
        match self.struct_kind(key) {
            StructKind::Scalar | StructKind::Hash => return Err(StorageError::TypeConflict),
            StructKind::None => {
                self.kinds.insert(key.to_string(), StructKind::Array);
            }
            StructKind::Array => {}
        }
        Ok(self.arrays.entry(key.to_string()).or_default())
    }

    /// Returns the existing treap at `key` for in-place array commands.
    fn existing_array(&mut self, key: &str, now: i64) -> StorageResult<&mut Treap> {
        if self.evict_if_expired(key, now) {
            return Err(StorageError::KeyExpired);
        }
        match self.struct_kind(key) {
            StructKind::None => Err(StorageError::KeyError),
            StructKind::Scalar | StructKind::Hash => Err(StorageError::TypeConflict),
            StructKind::Array => self.arrays.get_mut(key).ok_or(StorageError::KeyError),
        }
    }

    fn array(&self, key: &str) -> StorageResult<&Treap> {
        match self.struct_kind(key) {
            StructKind::None => Err(StorageError::KeyError),
            StructKind::Scalar | StructKind::Hash => Err(StorageError::TypeConflict),
            StructKind::Array => self.arrays.get(key).ok_or(StorageError::KeyError),
        }
    }

    fn snapshot(&self, now: i64) -> Snapshot {
        let mut snapshot = Snapshot::empty(now);
        let live = |key: &str| !self.is_expired(key, now);

        for (key, value) in self.scalars.iter().filter(|(k, _)| live(k.as_str())) {
            snapshot.scalars.insert(key.clone(), value.clone());
        }
        for (key, treap) in self.arrays.iter().filter(|(k, _)| live(k.as_str())) {
            snapshot.arrays.insert(key.clone(), treap.to_vec());
        }
        for (key, hash) in self.hashes.iter().filter(|(k, _)| live(k.as_str())) {
            snapshot
                .hashes
                .insert(key.clone(), hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect());
        }
        for (key, &deadline) in self.expire_at.iter().filter(|(k, _)| live(k.as_str())) {
            snapshot.expire_at.insert(key.clone(), deadline);
        }

        snapshot
    }
}

/// The main storage engine for TreapKV.
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// client handler tasks and the background sweeper. All operations are
/// thread-safe, and independent engines never share state.
///
/// # Example
///
/// ```
/// use treapkv::storage::{StorageEngine, Value};
///
/// let engine = StorageEngine::new();
///
/// engine.set("name", Value::from("Ariz"), 0).unwrap();
/// assert_eq!(engine.get("name"), Some(Value::from("Ariz")));
///
/// engine.rpush("list", vec![Value::from(1), Value::from(2), Value::from(3)]).unwrap();
/// assert_eq!(engine.lpop("list", &[]).unwrap(), vec![Value::from(1)]);
/// assert_eq!(engine.lget("list", 0).unwrap(), Value::from(2));
/// ```
pub struct StorageEngine {
    state: RwLock<State>,

    /// Statistics: total read operations
    get_count: AtomicU64,

    /// Statistics: total write operations
    set_count: AtomicU64,

    /// Statistics: total array operations
    list_op_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            list_op_count: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way later commands can't cope with, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `read` against `key` if it is live.
    ///
    /// The common case only needs the read lock. If the key turns out to be
    /// expired we take the write lock, evict it and return `None`.
    fn with_live_key<T>(&self, key: &str, read: impl Fn(&State) -> T) -> Option<T> {
        let now = now_ms();
        {
            let state = self.read();
            if !state.is_expired(key, now) {
                return Some(read(&state));
            }
        }

        let mut state = self.write();
        if state.evict_if_expired(key, now) {
            return None;
        }
        // Race: another writer replaced the key between the two locks
        Some(read(&state))
    }

    // ========================================================================
    // Scalar Commands
    // ========================================================================

    /// Stores `value` as a scalar at `key` and applies `ttl_secs`
    /// (0 = never expires).
    ///
    /// Fails with [`StorageError::TypeConflict`] if the key holds an array or
    /// a hash.
    pub fn set(&self, key: &str, value: Value, ttl_secs: i64) -> StorageResult<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().set(key, value, ttl_secs, now_ms())
    }

    /// Gets the scalar at `key`.
    ///
    /// Returns `None` if the key doesn't exist, holds another kind, or has
    /// expired (in which case it is evicted).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.with_live_key(key, |state| state.scalars.get(key).cloned())
            .flatten()
    }

    /// Same lookup as [`get`](Self::get) but returns only the value kind.
    pub fn get_kind(&self, key: &str) -> Option<Kind> {
        self.get(key).map(|value| value.kind())
    }

    // ========================================================================
    // Hash Commands
    // ========================================================================

    /// Sets `field` of the hash at `key`, creating the hash if needed.
    ///
    /// Like `SET` without a TTL, every write leaves the hash without a
    /// deadline.
    pub fn hset(&self, key: &str, field: &str, value: Value) -> StorageResult<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().hset(key, field, value, now_ms())
    }

    /// Gets `field` of the hash at `key`.
    pub fn hget(&self, key: &str, field: &str) -> Option<Value> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.with_live_key(key, |state| {
            state.hashes.get(key).and_then(|hash| hash.get(field)).cloned()
        })
        .flatten()
    }

    // ========================================================================
    // Array Commands
    // ========================================================================

    /// Pushes each value to the front, in argument order.
    ///
    /// `lpush(k, [a, b, c])` leaves the array starting `c, b, a, ...`.
    /// Returns the new length.
    pub fn lpush(&self, key: &str, values: Vec<Value>) -> StorageResult<usize> {
        self.push(key, values, Treap::push_front)
    }

    /// Pushes each value to the back, in argument order. Returns the new length.
    pub fn rpush(&self, key: &str, values: Vec<Value>) -> StorageResult<usize> {
        self.push(key, values, Treap::push_back)
    }

    /// Pushes each value to the back unless an equal value is already present.
    ///
    /// Returns how many values were actually added.
    pub fn raddtoset(&self, key: &str, values: Vec<Value>) -> StorageResult<usize> {
        if values.is_empty() {
            return Err(StorageError::WrongArgs);
        }
        self.list_op_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.write();
        let treap = state.ensure_array(key, now_ms())?;
        Ok(values
            .into_iter()
            .map(|value| treap.push_back_if_absent(value))
            .filter(|&added| added)
            .count())
    }

    fn push(&self, key: &str, values: Vec<Value>, push: fn(&mut Treap, Value)) -> StorageResult<usize> {
        if values.is_empty() {
            return Err(StorageError::WrongArgs);
        }
        self.list_op_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.write();
        let treap = state.ensure_array(key, now_ms())?;
        for value in values {
            push(treap, value);
        }
        Ok(treap.len())
    }

    /// Removes elements from the left end.
    ///
    /// `args` selects what to remove:
    ///
    /// * `[]` - the first element
    /// * `[count]` - the first `count` elements (clamped to the length)
    /// * `[start, stop]` - the inclusive range, negative indices wrap
    pub fn lpop(&self, key: &str, args: &[i64]) -> StorageResult<Vec<Value>> {
        self.pop(key, args, true)
    }

    /// Removes elements from the right end.
    ///
    /// Takes the same arguments as [`lpop`](Self::lpop); results are ordered
    /// from the right end inward.
    pub fn rpop(&self, key: &str, args: &[i64]) -> StorageResult<Vec<Value>> {
        self.pop(key, args, false)
    }

    fn pop(&self, key: &str, args: &[i64], from_left: bool) -> StorageResult<Vec<Value>> {
        if args.len() > 2 {
            return Err(StorageError::WrongArgs);
        }
        self.list_op_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.write();
        let treap = state.existing_array(key, now_ms())?;
        let (start, stop) = resolve_pop_range(args, treap.len(), from_left)?;

        let mut removed = treap.erase_range(start, stop);
        if !from_left {
            removed.reverse();
        }
        Ok(removed)
    }

    /// Replaces the element at `index` (no negative-index wrapping).
    pub fn lset(&self, key: &str, index: i64, value: Value) -> StorageResult<()> {
        self.list_op_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.write();
        let treap = state.existing_array(key, now_ms())?;
        let index = usize::try_from(index).map_err(|_| StorageError::IndexOutOfRange)?;
        treap.set(index, value).map(|_| ())
    }

    /// Returns the element at `index` (no negative-index wrapping).
    pub fn lget(&self, key: &str, index: i64) -> StorageResult<Value> {
        self.list_op_count.fetch_add(1, Ordering::Relaxed);

        self.with_live_key(key, |state| {
            let treap = state.array(key)?;
            let index = usize::try_from(index).map_err(|_| StorageError::IndexOutOfRange)?;
            treap.get(index).cloned()
        })
        .unwrap_or(Err(StorageError::KeyExpired))
    }

    /// Returns the length of the array at `key`, or 0 if there is none.
    pub fn llen(&self, key: &str) -> usize {
        self.with_live_key(key, |state| state.arrays.get(key).map_or(0, Treap::len))
            .unwrap_or(0)
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// Sets a deadline `seconds` from now on an existing key.
    ///
    /// `seconds == 0` removes the deadline. Returns 1 on success and 0 if the
    /// key does not exist.
    pub fn expire(&self, key: &str, seconds: i64) -> u8 {
        self.write().expire(key, seconds, now_ms())
    }

    /// Returns the remaining time to live in milliseconds.
    ///
    /// `Some(-1)` means the key exists without a deadline; `None` means the key
    /// doesn't exist.
    pub fn ttl_ms(&self, key: &str) -> Option<i64> {
        let now = now_ms();
        self.with_live_key(key, |state| {
            if state.struct_kind(key) == StructKind::None {
                return None;
            }
            Some(match state.expire_at.get(key) {
                Some(&deadline) => (deadline - now).max(0),
                None => -1,
            })
        })
        .flatten()
    }

    /// Returns the structural kind of `key`, treating expired keys as absent.
    pub fn struct_kind(&self, key: &str) -> StructKind {
        self.with_live_key(key, |state| state.struct_kind(key))
            .unwrap_or(StructKind::None)
    }

    /// Deletes `key` whatever its kind.
    ///
    /// Returns `true` if a live key was removed.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.write();
        if state.evict_if_expired(key, now_ms()) {
            return false;
        }
        state.remove(key) != StructKind::None
    }

    /// Number of keys currently stored, including expired keys not yet evicted.
    pub fn len(&self) -> usize {
        self.read().kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        let state = self.read();
        StorageStats {
            keys: state.kinds.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            list_ops: self.list_op_count.load(Ordering::Relaxed),
            expired: state.expired,
        }
    }

    /// Evicts every key whose deadline has passed.
    ///
    /// This is the body of the active expiry sweep. Returns the number of keys
    /// removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = now_ms();
        let mut state = self.write();

        let stale: Vec<String> = state
            .expire_at
            .iter()
            .filter(|&(_, &deadline)| deadline > 0 && now >= deadline)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            state.remove(key);
        }
        state.expired += stale.len() as u64;

        stale.len() as u64
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Captures the live state.
    pub fn snapshot(&self) -> Snapshot {
        self.read().snapshot(now_ms())
    }

    /// Captures the live state and runs `f` on it before releasing the lock.
    ///
    /// Holding the write lock keeps foreground commands from interleaving with
    /// the write and also serializes writers to the snapshot stores.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        let state = self.write();
        let snapshot = state.snapshot(now_ms());
        f(&snapshot)
    }

    /// Replays `snapshot` into this engine.
    ///
    /// Entries whose deadline has already passed are skipped. Everything else
    /// goes through the regular write paths (so the usual validation applies)
    /// and then gets its original deadline back. Returns the number of keys
    /// restored.
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        let now = now_ms();
        let mut state = self.write();

        let Snapshot {
            scalars,
            arrays,
            hashes,
            expire_at,
            ..
        } = snapshot;
        let deadline = |key: &str| expire_at.get(key).copied().unwrap_or(0);
        let stale = |key: &str| {
            let d = deadline(key);
            d > 0 && now >= d
        };

        let mut restored = 0;
        let mut skipped = 0;

        for (key, value) in scalars {
            if stale(&key) {
                skipped += 1;
                continue;
            }
            match state.set(&key, value, 0, now) {
                Ok(()) => {
                    state.set_deadline(&key, deadline(&key));
                    restored += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping scalar from snapshot"),
            }
        }

        for (key, values) in arrays {
            if stale(&key) {
                skipped += 1;
                continue;
            }
            match state.ensure_array(&key, now) {
                Ok(treap) => {
                    for value in values {
                        treap.push_back(value);
                    }
                    state.set_deadline(&key, deadline(&key));
                    restored += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping array from snapshot"),
            }
        }

        for (key, fields) in hashes {
            if stale(&key) {
                skipped += 1;
                continue;
            }
            let result = state.ensure_hash(&key, now).map(|_| ()).and_then(|()| {
                fields
                    .into_iter()
                    .try_for_each(|(field, value)| state.hset(&key, &field, value, now))
            });
            match result {
                Ok(()) => {
                    state.set_deadline(&key, deadline(&key));
                    restored += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping hash from snapshot"),
            }
        }

        debug!(restored, skipped, "Replayed snapshot");
        restored
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total read operations
    pub get_ops: u64,
    /// Total write operations on scalars and hashes
    pub set_ops: u64,
    /// Total array operations
    pub list_ops: u64,
    /// Total expired keys evicted
    pub expired: u64,
}
