//! Line-Delimited Request Parser
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((request, consumed)))` - Parsed one request, `consumed` bytes were used
//! - `Ok(None)` - Need more data, no complete line yet
//! - `Err(ParseError)` - The line was not a valid request
//!
//! This design allows the caller to:
//! 1. Append incoming network data to a buffer
//! 2. Call `parse()` to attempt parsing
//! 3. If successful, advance the buffer by `consumed` bytes
//! 4. If incomplete, wait for more data
//! 5. If error, report it and disconnect the client
//!
//! Blank lines between requests are skipped.

use crate::protocol::types::{Request, NEWLINE};
use thiserror::Error;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The line is not valid JSON or doesn't match the request shape
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No newline within the allowed line length
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size of a single request line (1 MB)
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Parses one request from the front of `buf`.
///
/// # Example
///
/// ```
/// use treapkv::protocol::parse_request;
///
/// let buf = b"{\"command\":\"GET\",\"key\":\"name\"}\n{\"comm";
/// let (request, consumed) = parse_request(buf).unwrap().unwrap();
/// assert_eq!(request.command, "GET");
/// assert!(parse_request(&buf[consumed..]).unwrap().is_none());
/// ```
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    let mut start = 0;

    loop {
        let rest = &buf[start..];
        let Some(end) = rest.iter().position(|&b| b == NEWLINE) else {
            if rest.len() > MAX_LINE_SIZE {
                return Err(ParseError::LineTooLong {
                    size: rest.len(),
                    max: MAX_LINE_SIZE,
                });
            }
            return Ok(None);
        };

        let line = rest[..end].trim_ascii();
        let consumed = start + end + 1;

        if line.is_empty() {
            start = consumed;
            continue;
        }

        return serde_json::from_slice::<Request>(line)
            .map(|request| Some((request, consumed)))
            .map_err(|e| ParseError::InvalidRequest(e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_complete_line() {
        let buf = b"{\"command\":\"SET\",\"key\":\"k\",\"args\":[1]}\n";
        let (request, consumed) = parse_request(buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(request.command, "SET");
        assert_eq!(request.key, "k");
        assert_eq!(request.args, vec![json!(1)]);
    }

    #[test]
    fn test_incomplete_line() {
        assert_eq!(parse_request(b"").unwrap(), None);
        assert_eq!(parse_request(b"{\"command\":\"GE").unwrap(), None);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let buf = b"\r\n\n{\"command\":\"PING\"}\r\nrest";
        let (request, consumed) = parse_request(buf).unwrap().unwrap();
        assert_eq!(request.command, "PING");
        assert_eq!(&buf[consumed..], b"rest");
    }

    #[test]
    fn test_whitespace_around_request() {
        let buf = b"  \t{\"command\":\"GET\",\"key\":\"k\"} \t\r\n";
        let (request, consumed) = parse_request(buf).unwrap().unwrap();
        assert_eq!(request.command, "GET");
        assert_eq!(consumed, buf.len());

        // A whitespace-only line is skipped like a blank one
        assert_eq!(parse_request(b" \t \n").unwrap(), None);
    }

    #[test]
    fn test_pipelined_requests() {
        let buf = b"{\"command\":\"PING\"}\n{\"command\":\"DBSIZE\"}\n";
        let (first, n) = parse_request(buf).unwrap().unwrap();
        let (second, m) = parse_request(&buf[n..]).unwrap().unwrap();
        assert_eq!(first.command, "PING");
        assert_eq!(second.command, "DBSIZE");
        assert_eq!(n + m, buf.len());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_request(b"{not json}\n"),
            Err(ParseError::InvalidRequest(_))
        ));
        // Valid JSON, wrong shape
        assert!(matches!(
            parse_request(b"[1,2,3]\n"),
            Err(ParseError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_line_too_long() {
        let buf = vec![b'x'; MAX_LINE_SIZE + 1];
        assert!(matches!(
            parse_request(&buf),
            Err(ParseError::LineTooLong { .. })
        ));
    }
}
