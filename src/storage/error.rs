//! Storage Errors
//!
//! Every command on the [`StorageEngine`](crate::storage::StorageEngine) reports
//! failures through [`StorageError`]. These are business-logic outcomes, not
//! transient faults: the engine never retries them and its state stays
//! consistent whatever the caller does with the error.

use thiserror::Error;

/// Errors returned by storage engine commands.
///
/// The `Display` form of each variant is its bare name, which is also what the
/// command transport sends back in the `message` field.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The value is not an integer (or integral float) or a string
    #[error("UndefinedValueType")]
    UndefinedValueType,

    /// The key already holds a different structural kind
    #[error("TypeConflict")]
    TypeConflict,

    /// The key does not exist in the expected structure
    #[error("KeyError")]
    KeyError,

    /// The key existed but its deadline had passed; it has been evicted
    #[error("KeyExpired")]
    KeyExpired,

    /// Wrong number or type of arguments for the command
    #[error("WrongArgs")]
    WrongArgs,

    /// A position does not address an existing element
    #[error("IndexOutOfRange")]
    IndexOutOfRange,
}

/// Result alias used throughout the storage module.
pub type StorageResult<T> = Result<T, StorageError>;
