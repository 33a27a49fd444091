//! Command Handler Module
//!
//! This module implements every TreapKV command. It takes parsed [`Request`]s,
//! validates their untyped arguments and dispatches them to the storage engine.
//!
//! ## Supported Commands
//!
//! ### Scalar Commands
//! - `SET key value [ttl_secs]` - Store a scalar, optionally with a TTL
//! - `GET key` - Get a scalar (or `null`)
//! - `GETKIND key` - Get the scalar's kind, `"D"` or `"S"` (or `null`)
//!
//! ### Hash Commands
//! - `HSET key field value` - Set a hash field
//! - `HGET key field` - Get a hash field (or `null`)
//!
//! ### Array Commands
//! - `LPUSH key value [value ...]` - Push values to the front
//! - `RPUSH key value [value ...]` - Push values to the back
//! - `RADDTOSET key value [value ...]` - Push values not already present
//! - `LPOP key [count | start stop]` - Remove from the front
//! - `RPOP key [count | start stop]` - Remove from the back
//! - `LSET key index value` - Replace the element at index
//! - `LGET key index` - Get the element at index
//!
//! ### Key Commands
//! - `EXPIRE key seconds` - Set or clear (0) a deadline
//! - `TTL key` - Remaining milliseconds, -1 without deadline, `null` if absent
//! - `DEL key` - Delete a key of any kind
//!
//! ### Server Commands
//! - `PING` - Test connection
//! - `DBSIZE` - Number of keys
//! - `INFO` - Server, keyspace and operation statistics
//!
//! ## Argument Validation
//!
//! Values must be integers (integral floats count) or strings, otherwise the
//! command fails with `UndefinedValueType`. Indices, counts and TTLs must be
//! integral numbers, otherwise the command fails with `WrongArgs`. All
//! arguments are validated before the engine is touched, so a rejected command
//! never leaves a partial write behind.

use crate::connection::ConnectionStats;
use crate::protocol::{Request, Response};
use crate::storage::{StorageEngine, StorageError, StorageResult, Value};
use serde_json::{json, Value as Json};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Handles TreapKV commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,

    /// Server-wide connection counters, reported by INFO
    connections: Option<Arc<ConnectionStats>>,

    /// When this handler was created (for INFO uptime)
    start_time: Instant,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            connections: None,
            start_time: Instant::now(),
        }
    }

    /// Attaches the listener's connection counters so INFO can report them.
    pub fn with_connection_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.connections = Some(stats);
        self
    }

    /// Executes a request and returns the response.
    pub fn execute(&self, request: Request) -> Response {
        let command = request.command.to_uppercase();
        trace!(command = %command, key = %request.key, args = request.args.len(), "Executing command");

        self.dispatch(&command, &request.key, &request.args)
            .unwrap_or_else(Response::from)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, key: &str, args: &[Json]) -> StorageResult<Response> {
        match cmd {
            // Scalar commands
            "SET" => self.cmd_set(key, args),
            "GET" => self.cmd_get(key, args),
            "GETKIND" => self.cmd_getkind(key, args),

            // Hash commands
            "HSET" => self.cmd_hset(key, args),
            "HGET" => self.cmd_hget(key, args),

            // Array commands
            "LPUSH" => self.cmd_lpush(key, args),
            "RPUSH" => self.cmd_rpush(key, args),
            "RADDTOSET" => self.cmd_raddtoset(key, args),
            "LPOP" => self.cmd_lpop(key, args),
            "RPOP" => self.cmd_rpop(key, args),
            "LSET" => self.cmd_lset(key, args),
            "LGET" => self.cmd_lget(key, args),

            // Key commands
            "EXPIRE" => self.cmd_expire(key, args),
            "TTL" => self.cmd_ttl(key, args),
            "DEL" => self.cmd_del(key, args),

            // Server commands
            "PING" => Ok(Response::value("PONG")),
            "DBSIZE" => Ok(Response::value(self.storage.len())),
            "INFO" => self.cmd_info(args),

            // Unknown command
            _ => Ok(Response::error(format!("UnknownCommand '{}'", cmd))),
        }
    }

    // ========================================================================
    // Scalar Commands
    // ========================================================================

    /// SET key value [ttl_secs]
    fn cmd_set(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let (value, ttl) = match args {
            [value] => (value_arg(value)?, 0),
            [value, ttl] => (value_arg(value)?, int_arg(ttl)?),
            _ => return Err(StorageError::WrongArgs),
        };

        self.storage.set(key, value, ttl)?;
        Ok(Response::ok())
    }

    /// GET key
    fn cmd_get(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        no_args(args)?;
        Ok(Response::maybe(self.storage.get(key)))
    }

    /// GETKIND key
    fn cmd_getkind(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        no_args(args)?;
        Ok(Response::value(
            self.storage
                .get_kind(key)
                .map_or(Json::Null, |kind| Json::from(kind.as_str())),
        ))
    }

    // ========================================================================
    // Hash Commands
    // ========================================================================

    /// HSET key field value
    fn cmd_hset(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let [field, value] = args else {
            return Err(StorageError::WrongArgs);
        };
        let field = field_arg(field)?;
        let value = value_arg(value)?;

        self.storage.hset(key, field, value)?;
        Ok(Response::ok())
    }

    /// HGET key field
    fn cmd_hget(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let [field] = args else {
            return Err(StorageError::WrongArgs);
        };
        Ok(Response::maybe(self.storage.hget(key, field_arg(field)?)))
    }

    // ========================================================================
    // Array Commands
    // ========================================================================

    /// LPUSH key value [value ...]
    fn cmd_lpush(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let len = self.storage.lpush(key, values_arg(args)?)?;
        Ok(Response::value(len))
    }

    /// RPUSH key value [value ...]
    fn cmd_rpush(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let len = self.storage.rpush(key, values_arg(args)?)?;
        Ok(Response::value(len))
    }

    /// RADDTOSET key value [value ...]
    fn cmd_raddtoset(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let added = self.storage.raddtoset(key, values_arg(args)?)?;
        Ok(Response::value(added))
    }

    /// LPOP key [count | start stop]
    fn cmd_lpop(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let removed = self.storage.lpop(key, &range_args(args)?)?;
        Ok(values_response(removed))
    }

    /// RPOP key [count | start stop]
    fn cmd_rpop(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let removed = self.storage.rpop(key, &range_args(args)?)?;
        Ok(values_response(removed))
    }

    /// LSET key index value
    fn cmd_lset(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let [index, value] = args else {
            return Err(StorageError::WrongArgs);
        };
        let index = int_arg(index)?;
        let value = value_arg(value)?;

        self.storage.lset(key, index, value)?;
        Ok(Response::ok())
    }

    /// LGET key index
    fn cmd_lget(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let [index] = args else {
            return Err(StorageError::WrongArgs);
        };
        let value = self.storage.lget(key, int_arg(index)?)?;
        Ok(Response::value(value.to_json()))
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// EXPIRE key seconds
    fn cmd_expire(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        let [seconds] = args else {
            return Err(StorageError::WrongArgs);
        };
        Ok(Response::value(self.storage.expire(key, int_arg(seconds)?)))
    }

    /// TTL key
    fn cmd_ttl(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        no_args(args)?;
        Ok(Response::value(
            self.storage.ttl_ms(key).map_or(Json::Null, Json::from),
        ))
    }

    /// DEL key
    fn cmd_del(&self, key: &str, args: &[Json]) -> StorageResult<Response> {
        no_args(args)?;
        Ok(Response::value(u8::from(self.storage.delete(key))))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// INFO
    fn cmd_info(&self, args: &[Json]) -> StorageResult<Response> {
        no_args(args)?;
        let stats = self.storage.stats();

        let mut info = json!({
            "server": {
                "version": crate::VERSION,
                "os": std::env::consts::OS,
                "uptime_in_seconds": self.start_time.elapsed().as_secs(),
            },
            "keyspace": {
                "keys": stats.keys,
                "expired_keys": stats.expired,
            },
            "operations": {
                "get_ops": stats.get_ops,
                "set_ops": stats.set_ops,
                "list_ops": stats.list_ops,
            },
        });

        if let Some(conn) = &self.connections {
            info["clients"] = json!({
                "total_connections_received": conn.connections_accepted.load(Ordering::Relaxed),
                "connected_clients": conn.active_connections.load(Ordering::Relaxed),
                "total_commands_processed": conn.commands_processed.load(Ordering::Relaxed),
                "total_net_input_bytes": conn.bytes_read.load(Ordering::Relaxed),
                "total_net_output_bytes": conn.bytes_written.load(Ordering::Relaxed),
            });
        }

        Ok(Response::value(info))
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn no_args(args: &[Json]) -> StorageResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(StorageError::WrongArgs)
    }
}

/// A storable value: integer, integral float or string.
fn value_arg(raw: &Json) -> StorageResult<Value> {
    Value::try_from(raw)
}

/// One or more storable values, all validated before any is used.
fn values_arg(args: &[Json]) -> StorageResult<Vec<Value>> {
    if args.is_empty() {
        return Err(StorageError::WrongArgs);
    }
    args.iter().map(value_arg).collect()
}

/// An integral number used as an index, count or TTL.
fn int_arg(raw: &Json) -> StorageResult<i64> {
    match raw {
        Json::Number(_) => match Value::try_from(raw) {
            Ok(Value::Integer(n)) => Ok(n),
            _ => Err(StorageError::WrongArgs),
        },
        _ => Err(StorageError::WrongArgs),
    }
}

fn range_args(args: &[Json]) -> StorageResult<Vec<i64>> {
    if args.len() > 2 {
        return Err(StorageError::WrongArgs);
    }
    args.iter().map(int_arg).collect()
}

fn field_arg(raw: &Json) -> StorageResult<&str> {
    raw.as_str().ok_or(StorageError::WrongArgs)
}

fn values_response(values: Vec<Value>) -> Response {
    Response::value(Json::Array(values.iter().map(Value::to_json).collect()))
}
