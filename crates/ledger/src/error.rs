//! Error types for the ledger crate.

use crate::VerifyResult;
use thiserror::Error;

/// Result alias used throughout the ledger crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by block persistence and chain maintenance.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// A block failed verification against the current chain state.
    #[error("block rejected: {0:?}")]
    BlockRejected(VerifyResult),

    /// An internal contract was broken; the block cannot be applied.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A system execution (OnPersist/PostPersist) faulted.
    #[error("system execution faulted: {0}")]
    SystemFault(String),
}
