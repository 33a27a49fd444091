//! Value Model
//!
//! Every stored payload is a [`Value`]: either a 64-bit signed integer or a
//! UTF-8 string. Anything else is rejected at the boundary with
//! [`StorageError::UndefinedValueType`], so the engine itself only ever sees
//! well-typed data.
//!
//! Untyped input (decoded JSON) goes through `Value::try_from(&serde_json::Value)`:
//!
//! ```
//! use treapkv::storage::{Kind, StorageError, Value};
//! use serde_json::json;
//!
//! assert_eq!(Value::try_from(&json!(42)), Ok(Value::Integer(42)));
//! assert_eq!(Value::try_from(&json!(42.0)), Ok(Value::Integer(42)));
//! assert_eq!(Value::try_from(&json!("42")).map(|v| v.kind()), Ok(Kind::String));
//! assert_eq!(Value::try_from(&json!(42.5)), Err(StorageError::UndefinedValueType));
//! ```
//!
//! Separately, each key is tagged with a [`StructKind`] that pins it to a single
//! structure (scalar, array or hash) for as long as it lives.

use crate::storage::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fmt;

/// Largest float magnitude that still converts to `i64` without overflow.
const I64_FLOAT_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// The payload kind of a [`Value`].
///
/// Serialized as `"D"` for integers and `"S"` for strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "D")]
    Integer,
    #[serde(rename = "S")]
    String,
}

impl Kind {
    /// Short tag used on the wire and in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Integer => "D",
            Kind::String => "S",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored scalar: an integer or a string.
///
/// Values are immutable; commands replace them rather than editing in place.
/// Equality (and hashing) compares kind and payload, so `Integer(1)` and
/// `String("1")` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EncodedValue", into = "EncodedValue")]
pub enum Value {
    Integer(i64),
    String(String),
}

impl Value {
    /// Returns the payload kind.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Integer(_) => Kind::Integer,
            Value::String(_) => Kind::String,
        }
    }

    /// Returns the payload as an untyped JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::String(s) => serde_json::Value::from(s.as_str()),
        }
    }

    fn from_number(n: &Number) -> Result<Self, StorageError> {
        if let Some(i) = n.as_i64() {
            return Ok(Value::Integer(i));
        }
        // u64 beyond i64::MAX, or a float
        match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= -I64_FLOAT_BOUND && f < I64_FLOAT_BOUND => {
                Ok(Value::Integer(f as i64))
            }
            _ => Err(StorageError::UndefinedValueType),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = StorageError;

    fn try_from(raw: &serde_json::Value) -> Result<Self, Self::Error> {
        match raw {
            serde_json::Value::Number(n) => Value::from_number(n),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(StorageError::UndefinedValueType),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = StorageError;

    fn try_from(raw: serde_json::Value) -> Result<Self, Self::Error> {
        match raw {
            serde_json::Value::String(s) => Ok(Value::String(s)),
            other => Value::try_from(&other),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// On-disk form of a value: `{"value": <payload>, "type": "D" | "S"}`.
///
/// Decoding re-runs the validating constructor and checks that the declared
/// type matches the payload.
#[derive(Serialize, Deserialize)]
struct EncodedValue {
    value: serde_json::Value,
    #[serde(rename = "type")]
    kind: Kind,
}

impl From<Value> for EncodedValue {
    fn from(value: Value) -> Self {
        let kind = value.kind();
        let value = match value {
            Value::Integer(n) => serde_json::Value::from(n),
            Value::String(s) => serde_json::Value::String(s),
        };
        Self { value, kind }
    }
}

impl TryFrom<EncodedValue> for Value {
    type Error = StorageError;

    fn try_from(encoded: EncodedValue) -> Result<Self, Self::Error> {
        let value = Value::try_from(encoded.value)?;
        if value.kind() != encoded.kind {
            return Err(StorageError::UndefinedValueType);
        }
        Ok(value)
    }
}

/// The structure a key is locked into after its first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    Scalar,
    Array,
    Hash,
    /// The key is absent from every structure
    None,
}

impl StructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructKind::Scalar => "scalar",
            StructKind::Array => "array",
            StructKind::Hash => "hash",
            StructKind::None => "none",
        }
    }
}

impl fmt::Display for StructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers_and_integral_floats() {
        assert_eq!(Value::try_from(&json!(123)), Ok(Value::Integer(123)));
        assert_eq!(Value::try_from(&json!(-7)), Ok(Value::Integer(-7)));
        assert_eq!(Value::try_from(&json!(5.0)), Ok(Value::Integer(5)));
        assert_eq!(Value::try_from(&json!(-5.0)), Ok(Value::Integer(-5)));
    }

    #[test]
    fn test_strings_keep_their_text() {
        let value = Value::try_from(&json!("234.05")).unwrap();
        assert_eq!(value, Value::String("234.05".to_string()));
        assert_eq!(value.kind(), Kind::String);
    }

    #[test]
    fn test_rejects_everything_else() {
        for raw in [
            json!(123.05),
            json!(true),
            json!(null),
            json!([1, 2]),
            json!({"a": 1}),
            json!(1e30),
            json!(u64::MAX),
        ] {
            assert_eq!(
                Value::try_from(&raw),
                Err(StorageError::UndefinedValueType),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_equality_includes_kind() {
        assert_ne!(Value::from(1), Value::from("1"));
        assert_eq!(Value::from("a"), Value::String("a".into()));
    }

    #[test]
    fn test_encoded_form() {
        let encoded = serde_json::to_value(Value::from(7)).unwrap();
        assert_eq!(encoded, json!({"value": 7, "type": "D"}));

        let encoded = serde_json::to_value(Value::from("x")).unwrap();
        assert_eq!(encoded, json!({"value": "x", "type": "S"}));
    }

    #[test]
    fn test_decoding_validates() {
        let ok: Value = serde_json::from_value(json!({"value": -3, "type": "D"})).unwrap();
        assert_eq!(ok, Value::Integer(-3));

        let mismatched = serde_json::from_value::<Value>(json!({"value": "3", "type": "D"}));
        assert!(mismatched.is_err());

        let fractional = serde_json::from_value::<Value>(json!({"value": 1.5, "type": "D"}));
        assert!(fractional.is_err());
    }
}
