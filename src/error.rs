//! # Error Types
//!
//! Every fallible operation in kitedb returns [`Result`] with the closed
//! [`Error`] set below. Kinds map one-to-one onto user-visible failure
//! modes; transport failures from the OS surface through the `Io` variant
//! with their original `std::io::Error` attached.
//!
//! The engine leaves the datafile in its pre-operation state whenever an
//! error is returned: writer failures roll the active transaction back
//! before the error propagates.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for kitedb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error set raised by kitedb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The file exists but is not a kitedb datafile (bad magic).
    #[error("invalid datafile: {0}")]
    InvalidDatabase(String),

    /// The datafile was written by an incompatible version.
    #[error("unsupported datafile version {found} (expected {expected})")]
    InvalidDatabaseVersion { expected: u8, found: u8 },

    /// Opening a non-existent datafile in read-only mode.
    #[error("datafile not found: {0}")]
    FileNotFound(PathBuf),

    /// On-disk structures failed validation (page type mismatch, broken
    /// link, truncated body).
    #[error("datafile corrupted: {0}")]
    FileCorrupted(String),

    /// Lock acquisition did not complete within the configured timeout.
    #[error("timed out acquiring {mode} lock after {timeout:?}")]
    LockTimeout {
        mode: &'static str,
        timeout: Duration,
    },

    /// Insert would create a second entry for a key in a unique index.
    #[error("duplicate key in unique index \"{field}\": {key}")]
    IndexDuplicateKey { field: String, key: String },

    /// A query targeted a field with no index. The engine facade resolves
    /// this during find/delete/update by building the index and retrying.
    #[error("no index on field \"{field}\"")]
    IndexNotFound { field: String },

    /// Serialized index key exceeds the per-key byte limit.
    #[error("index key for \"{field}\" exceeds {max} bytes")]
    IndexKeyTooLong { field: String, max: usize },

    /// Malformed document bytes or an invalid collection/index name.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Document nesting deeper than the codec permits.
    #[error("document nesting exceeds {0} levels")]
    DocumentMaxDepth(usize),

    /// A value of this kind is not allowed here (for example `MinKey` as
    /// an `_id`).
    #[error("invalid data type for {context}: {kind}")]
    InvalidDataType {
        context: &'static str,
        kind: &'static str,
    },

    /// A fixed-capacity table (collection directory, per-collection index
    /// table) is full.
    #[error("collection limit reached: {0}")]
    CollectionLimitSize(String),

    /// A mutating operation was attempted on a read-only engine.
    #[error("datafile is read-only")]
    ReadOnly,

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
