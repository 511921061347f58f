//! The dBFT consensus engine.
//!
//! [`ConsensusContext`] holds the per-round state and the quorum math;
//! [`ConsensusService`] drives it from messages and timer ticks, emitting
//! payloads to broadcast and, eventually, the accepted block.

mod context;
mod error;
mod message;
mod service;

pub use context::{ConsensusContext, ConsensusSigner};
pub use error::{ConsensusError, ConsensusResult};
pub use message::{
    ChangeView, ChangeViewCompact, ChangeViewReason, Commit, CommitCompact, ConsensusMessage,
    ConsensusPayload, PreparationCompact, PrepareRequest, PrepareResponse, RecoveryMessage,
    RecoveryRequest, CONSENSUS_CATEGORY,
};
pub use service::{ConsensusEvent, ConsensusService};
