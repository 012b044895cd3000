//! Error types returned by table operations and by table construction.

use std::fmt;

/// Failure outcomes of a table operation.
///
/// Neither variant is fatal. An absent key is not an error and is reported as
/// `Ok(None)` by `get` and `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The bucket the key hashes to holds no matching and no empty slot. Only
    /// the standard table reports this, and it is never retried internally.
    Full,
    /// Contention outlasted the retry budget. The caller may simply re-invoke
    /// the operation.
    Again,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Full => write!(f, "Bucket is full"),
            TableError::Again => write!(f, "Retry budget exhausted under contention"),
        }
    }
}

impl std::error::Error for TableError {}

/// A table configuration that can not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// `bucket_count` was zero.
    ZeroBucketCount,
    /// `bucket_length` was zero.
    ZeroBucketLength,
    /// The retry budget was zero, so no operation could ever be attempted.
    ZeroRetryBudget,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ZeroBucketCount => write!(f, "Bucket count must be non-zero"),
            BuildError::ZeroBucketLength => write!(f, "Bucket length must be non-zero"),
            BuildError::ZeroRetryBudget => write!(f, "Retry budget must be non-zero"),
        }
    }
}

impl std::error::Error for BuildError {}
