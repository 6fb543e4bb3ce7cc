//! Error type shared by every collection.

use thiserror::Error;

/// Errors returned by collection operations.
///
/// CAS contention is never an error; lock-free operations retry instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Bad constructor or mutator input, or an unknown index name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("position {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Pop, peek or dequeue on an empty structure.
    #[error("{0} is empty")]
    EmptyCollection(&'static str),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, CollectionError>;
