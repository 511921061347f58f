//! Core protocol types: fixed-width unsigned integers, witnesses, signers,
//! transactions and blocks, together with their canonical encodings.

mod block;
mod error;
mod extensible;
mod signer;
mod uint160;
mod uint256;
mod uint512;
mod verifiable;
mod witness;
mod witness_rule;
mod witness_scope;

pub mod transaction;

pub use block::{Block, Header};
pub use error::{CoreError, CoreResult};
pub use extensible::ExtensiblePayload;
pub use signer::Signer;
pub use transaction::{
    OracleResponseCode, Transaction, TransactionAttribute, TransactionBuilder,
};
pub use uint160::{UInt160, UINT160_SIZE};
pub use uint256::{UInt256, UINT256_SIZE};
pub use uint512::{UInt512, UINT512_SIZE};
pub use verifiable::Verifiable;
pub use witness::Witness;
pub use witness_rule::{WitnessCondition, WitnessRule, WitnessRuleAction};
pub use witness_scope::WitnessScopes;
