//! Wire Types
//!
//! Every message is one line of JSON terminated by `\n`.
//!
//! ## Examples
//!
//! Request: `{"command": "RPUSH", "key": "queue", "args": [1, "two"]}`
//! Success: `{"status":true,"value":2}`
//! Failure: `{"status":false,"message":"TypeConflict"}`
//! Null lookup result: `{"status":true,"value":null}`

use crate::storage::{StorageError, Value};
use serde::{Deserialize, Serialize};

/// The line terminator for both directions
pub const NEWLINE: u8 = b'\n';

/// A client command.
///
/// `key` and `args` may be omitted for commands that don't use them
/// (`PING`, `DBSIZE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,

    #[serde(default)]
    pub key: String,

    /// Untyped arguments; each command validates its own
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl Request {
    pub fn new(command: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            key: key.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<serde_json::Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Encodes the request as one newline-terminated line.
    pub fn to_line(&self) -> Vec<u8> {
        encode_line(self)
    }
}

/// The reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// A success without a payload.
    pub fn ok() -> Self {
        Self {
            status: true,
            value: None,
            message: None,
        }
    }

    /// A success carrying `value` (which may be JSON `null`).
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self {
            status: true,
            value: Some(value.into()),
            message: None,
        }
    }

    /// A success carrying an optional stored value; `None` becomes `null`.
    pub fn maybe(value: Option<Value>) -> Self {
        Self::value(value.map_or(serde_json::Value::Null, |v| v.to_json()))
    }

    /// A failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: false,
            value: None,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status
    }

    /// Encodes the response as one newline-terminated line.
    pub fn to_line(&self) -> Vec<u8> {
        encode_line(self)
    }
}

impl From<StorageError> for Response {
    fn from(e: StorageError) -> Self {
        Response::error(e.to_string())
    }
}

fn encode_line<T: Serialize>(message: &T) -> Vec<u8> {
    // Plain structs with string keys always serialize
    let mut line = serde_json::to_vec(message).unwrap_or_default();
    line.push(NEWLINE);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_encoding() {
        assert_eq!(Response::ok().to_line(), b"{\"status\":true}\n");
        assert_eq!(Response::value(3).to_line(), b"{\"status\":true,\"value\":3}\n");
        assert_eq!(Response::maybe(None).to_line(), b"{\"status\":true,\"value\":null}\n");
        assert_eq!(
            Response::from(StorageError::KeyExpired).to_line(),
            b"{\"status\":false,\"message\":\"KeyExpired\"}\n"
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: Request = serde_json::from_value(json!({"command": "PING"})).unwrap();
        assert_eq!(request, Request::new("PING", ""));
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new("RPUSH", "q").arg(1).arg("two");
        assert_eq!(request.args, vec![json!(1), json!("two")]);
        assert!(request.to_line().ends_with(b"\n"));
    }
}
