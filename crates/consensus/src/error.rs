//! Error types for the consensus crate.

use thiserror::Error;

/// Result alias used throughout the consensus crate.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors raised by the consensus machinery.
#[derive(Debug, Clone, Error)]
pub enum ConsensusError {
    /// A payload failed to decode or came from an unknown validator.
    #[error("invalid consensus payload: {0}")]
    InvalidPayload(String),

    /// A message arrived for a different block height or view.
    #[error("stale message: {0}")]
    Stale(String),

    /// This node is not one of the validators of the round.
    #[error("node is not a validator")]
    NotValidator,

    /// The signing backend refused or failed.
    #[error("signing failed")]
    SigningFailed,

    /// Wire decoding failed.
    #[error(transparent)]
    Io(#[from] neo3_io::IoError),

    /// Chain interaction failed.
    #[error("ledger error: {0}")]
    Ledger(String),
}
