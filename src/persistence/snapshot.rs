//! Snapshot Format
//!
//! A [`Snapshot`] is a full image of the live engine state. Each write replaces
//! whatever was stored before, and values are stored in their encoded form
//! (`{"value": ..., "type": "D" | "S"}`) so decoding re-validates them.

use crate::persistence::{PersistenceError, PersistenceResult};
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot layout version.
pub const FORMAT_VERSION: u32 = 1;

/// A point-in-time image of every live key.
///
/// Maps are ordered so that two snapshots of the same state serialize to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,

    /// When the snapshot was taken, in Unix milliseconds
    pub taken_at: i64,

    #[serde(default)]
    pub scalars: BTreeMap<String, Value>,

    #[serde(default)]
    pub arrays: BTreeMap<String, Vec<Value>>,

    #[serde(default)]
    pub hashes: BTreeMap<String, BTreeMap<String, Value>>,

    /// Absolute deadlines in Unix milliseconds for keys that have one
    #[serde(default)]
    pub expire_at: BTreeMap<String, i64>,
}

impl Snapshot {
    /// Creates an empty snapshot stamped with `taken_at`.
    pub fn empty(taken_at: i64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            taken_at,
            scalars: BTreeMap::new(),
            arrays: BTreeMap::new(),
            hashes: BTreeMap::new(),
            expire_at: BTreeMap::new(),
        }
    }

    /// Number of keys in the snapshot.
    pub fn key_count(&self) -> usize {
        self.scalars.len() + self.arrays.len() + self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }

    /// Serializes to human-readable JSON.
    pub fn to_json_pretty(&self) -> PersistenceResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes to compact JSON.
    pub fn to_json(&self) -> PersistenceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a snapshot and rejects layouts we don't understand.
    pub fn from_json(raw: &str) -> PersistenceResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(raw)?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(snapshot.format_version));
        }
        Ok(snapshot)
    }
}
