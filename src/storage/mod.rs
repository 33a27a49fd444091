//! Storage Engine Module
//!
//! This module provides the core storage functionality for TreapKV: the value
//! model, the order-statistics treap that backs arrays, the thread-safe engine
//! and the background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌──────────┐ ┌──────────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ scalars  │ │ arrays       │ │ hashes   │ │ expire_at │  │
//! │  │ Value    │ │ Treap<Value> │ │ field→V  │ │ unix ms   │  │
//! │  └──────────┘ └──────────────┘ └──────────┘ └───────────┘  │
//! │                 one RwLock over all of it                   │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Typed Values**: integers and strings only, validated at the boundary
//! - **Positional Arrays**: O(log n) push, pop, index and range removal
//! - **Kind Locking**: a key stays a scalar, array or hash until it is removed
//! - **Lazy Expiry**: Expired keys are cleaned on access
//! - **Active Expiry**: Background sweeper cleans orphaned expired keys
//!
//! ## Example
//!
//! ```
//! use treapkv::storage::{StorageEngine, StorageError, Value};
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("name", Value::from("Ariz"), 0).unwrap();
//! assert_eq!(engine.rpush("name", vec![Value::from(1)]), Err(StorageError::TypeConflict));
//!
//! engine.set("session", Value::from("token123"), 3600).unwrap();
//! assert!(engine.ttl_ms("session").unwrap() > 0);
//! ```

pub mod engine;
pub mod error;
pub mod expiry;
pub mod treap;
pub mod value;

// Re-export commonly used types
pub use engine::{now_ms, StorageEngine, StorageStats};
pub use error::{StorageError, StorageResult};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use treap::{normalize_index, resolve_pop_range, Treap};
pub use value::{Kind, StructKind, Value};
