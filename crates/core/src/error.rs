//! Error types for the core crate.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by core protocol types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Malformed binary or textual data.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// An operation was attempted in a state that does not permit it.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Wire decoding failed.
    #[error(transparent)]
    Io(#[from] neo3_io::IoError),

    /// A cryptographic primitive rejected its input.
    #[error(transparent)]
    Crypto(#[from] neo3_crypto::CryptoError),
}

impl CoreError {
    /// Convenience constructor for format violations.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        CoreError::InvalidFormat(message.into())
    }
}
