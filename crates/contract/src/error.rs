//! Error types for the contract crate.

use thiserror::Error;

/// Result alias used throughout the contract crate.
pub type ContractResult<T> = Result<T, ContractError>;

/// Errors raised outside of VM execution (artefact parsing, validation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A NEF file or manifest violated its format.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A manifest is structurally valid but semantically inconsistent.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation is not permitted in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Wire decoding failed.
    #[error(transparent)]
    Io(#[from] neo3_io::IoError),

    /// Manifest JSON decoding failed.
    #[error("invalid manifest JSON: {0}")]
    Json(String),
}

impl ContractError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        ContractError::InvalidFormat(message.into())
    }
}

impl From<serde_json::Error> for ContractError {
    fn from(error: serde_json::Error) -> Self {
        ContractError::Json(error.to_string())
    }
}
