//! Command Handler Module
//!
//! This module implements the command processing layer for TreapKV.
//! It receives parsed requests, executes them against the storage engine,
//! and returns appropriate responses.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - Scalars: `SET`, `GET`, `GETKIND`
//! - Hashes: `HSET`, `HGET`
//! - Arrays: `LPUSH`, `RPUSH`, `RADDTOSET`, `LPOP`, `RPOP`, `LSET`, `LGET`
//! - Keys: `EXPIRE`, `TTL`, `DEL`
//! - Server: `PING`, `DBSIZE`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
