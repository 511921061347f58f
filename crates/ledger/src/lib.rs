//! The ledger layer: transaction verification, the memory pool, and the
//! block-persist pipeline.

mod blockchain;
mod error;
mod mempool;
mod verification;
mod verify_result;

pub use blockchain::{ApplicationExecuted, Blockchain, GENESIS_TIMESTAMP};
pub use error::{LedgerError, LedgerResult};
pub use mempool::{MemoryPool, TransactionRemovalReason, TransactionRemovedEvent};
pub use verification::{
    verify_state_dependent, verify_state_independent, verify_witness,
    TransactionVerificationContext, MAX_VERIFICATION_GAS,
};
pub use verify_result::VerifyResult;
