//! Rust implementation of the Neo N3 blockchain state-transition core.
//!
//! The workspace is organized as a set of layered crates, re-exported here
//! for convenience:
//!
//! - [`config`]: protocol settings and hardfork schedule.
//! - [`io`]: the canonical binary wire encoding.
//! - [`crypto`]: hashing, ECDSA and Base58Check primitives.
//! - [`core`]: fixed-width integers, transactions and blocks.
//! - [`persistence`]: the abstract key-value store and the layered data cache.
//! - [`vm`]: the stack-based virtual machine.
//! - [`contract`]: the application engine and the native contracts.
//! - [`ledger`]: transaction verification, the memory pool and block persist.
//! - [`consensus`]: the dBFT consensus state machine.

pub use neo3_config as config;
pub use neo3_consensus as consensus;
pub use neo3_contract as contract;
pub use neo3_core as core;
pub use neo3_crypto as crypto;
pub use neo3_io as io;
pub use neo3_ledger as ledger;
pub use neo3_persistence as persistence;
pub use neo3_vm as vm;
