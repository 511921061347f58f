//! Error types for the io crate.

use thiserror::Error;

/// Result alias used throughout the io crate.
pub type IoResult<T> = Result<T, IoError>;

/// Errors raised while encoding or decoding protocol objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The input ended before the requested number of bytes could be read.
    #[error("unexpected end of input: needed {needed} bytes at position {position}")]
    EndOfInput { needed: usize, position: usize },

    /// The data violates the format being decoded.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A length prefix exceeds the caller-supplied maximum.
    #[error("value {value} exceeds maximum {max}")]
    ExceedsMaximum { value: u64, max: u64 },

    /// A decoded string is not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
}

impl IoError {
    /// Convenience constructor for format violations.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        IoError::InvalidFormat(message.into())
    }
}
