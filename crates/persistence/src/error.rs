//! Error types for the persistence crate.

use thiserror::Error;

/// Result alias used throughout the persistence crate.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors raised by the cache and store layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// A key that was required to exist does not.
    #[error("key not found")]
    NotFound,

    /// A key that was required to be absent already exists.
    #[error("key already exists")]
    AlreadyExists,

    /// An operation violated cache discipline.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
