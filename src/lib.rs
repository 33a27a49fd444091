//! # TreapKV - An In-Memory Key-Value Store with Positional Arrays
//!
//! TreapKV is an in-memory key-value store written in Rust. Keys hold one of
//! three structures: a scalar, a hash of fields, or an array backed by an
//! implicit treap with logarithmic indexed access. Keys can expire, and the
//! whole store can be snapshotted to a JSON file or an SQLite database.
//!
//! ## Features
//!
//! - **Typed Values**: 64-bit integers and strings, validated at the boundary
//! - **Treap Arrays**: push, pop, index and range removal in O(log n)
//! - **TTL Support**: Keys can have expiry times with automatic cleanup
//! - **Snapshots**: Periodic and on-shutdown persistence, replayed on startup
//! - **Async I/O**: Built on Tokio for handling many concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TreapKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │ JSON line   │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  scalars │ arrays (treaps) │ hashes │ expiry │   │
//! │  └─────────────┘    └──────────────────────────────────────────────┘   │
//! │                                    ▲                  │                 │
//! │                                    │                  ▼                 │
//! │                     ┌──────────────┴──────┐   ┌───────────────────┐    │
//! │                     │   ExpirySweeper     │──>│   Persistence     │    │
//! │                     │  (Tokio task)       │   │  file / SQLite    │    │
//! │                     └─────────────────────┘   └───────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use treapkv::commands::CommandHandler;
//! use treapkv::connection::{handle_connection, ConnectionStats};
//! use treapkv::persistence::{FileStore, Persistence};
//! use treapkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let persistence = Arc::new(Persistence::new().with_store(FileStore::new("kv.json")));
//!     persistence.restore(&storage).unwrap();
//!
//!     let _sweeper = ExpirySweeper::start(
//!         Arc::clone(&storage),
//!         Some(Arc::clone(&persistence)),
//!         ExpiryConfig::default(),
//!     );
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:7379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Value model, treap, storage engine and expiry sweeper
//! - [`persistence`]: Snapshot format and the file / SQLite stores
//! - [`protocol`]: JSON line request and response types
//! - [`commands`]: Command dispatch and argument validation
//! - [`connection`]: Client connection management
//! - [`config`]: Server configuration from environment and flags
//!
//! ## Design Highlights
//!
//! ### One Engine, One Lock
//!
//! Every command runs under a single engine-wide `RwLock`, so commands are
//! atomic and totally ordered. Engines are plain values: tests and embedders
//! can run as many as they like side by side.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A background task periodically removes expired keys
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{FileStore, Persistence, Snapshot, SnapshotStore, SqlStore};
pub use protocol::{Request, Response};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine, StorageError, Value};

/// The default port TreapKV listens on
pub const DEFAULT_PORT: u16 = 7379;

/// The default host TreapKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TreapKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
