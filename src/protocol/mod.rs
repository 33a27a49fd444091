//! Command Transport Protocol
//!
//! Clients talk to TreapKV with newline-delimited JSON. Each request line names
//! a command, a key and a list of untyped arguments; each response line carries
//! a status flag plus either a value or an error name.
//!
//! ## Modules
//!
//! - `types`: Defines `Request`, `Response` and their line encoding
//! - `parser`: Incremental parser for incoming request lines
//!
//! ## Example
//!
//! ```
//! use treapkv::protocol::{parse_request, Request, Response};
//!
//! let line = Request::new("GET", "name").to_line();
//! let (request, consumed) = parse_request(&line).unwrap().unwrap();
//! assert_eq!(consumed, line.len());
//! assert_eq!(request.key, "name");
//!
//! let response = Response::value("Ariz");
//! assert_eq!(response.to_line(), b"{\"status\":true,\"value\":\"Ariz\"}\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_request, ParseError, ParseResult, MAX_LINE_SIZE};
pub use types::{Request, Response};
