//! Protocol settings and network constants for the neo3 node.
//!
//! Everything consensus-critical that can vary between networks lives in
//! [`ProtocolSettings`]; values that are fixed by the protocol itself are
//! plain constants.

mod hardfork;
mod settings;

pub use hardfork::Hardfork;
pub use settings::{ProtocolSettings, SettingsError};

/// Target milliseconds between blocks.
pub const MILLISECONDS_PER_BLOCK: u32 = 15_000;

/// Maximum serialized size of a block in bytes.
pub const MAX_BLOCK_SIZE: usize = 2_097_152;

/// Maximum cumulative system fee of the transactions in one block, in datoshi.
pub const MAX_BLOCK_SYSTEM_FEE: i64 = 900_000_000_000;

/// Maximum serialized size of a transaction in bytes.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Maximum number of transactions in one block.
pub const MAX_TRANSACTIONS_PER_BLOCK: u32 = 512;

/// Maximum number of blocks a transaction may stay valid for.
pub const MAX_VALID_UNTIL_BLOCK_INCREMENT: u32 = 5_760;

/// Default number of blocks a transaction or header stays traceable.
pub const MAX_TRACEABLE_BLOCKS: u32 = 2_102_400;

/// Default capacity of the memory pool.
pub const MEMORY_POOL_MAX_TRANSACTIONS: usize = 50_000;

/// Maximum size of a transaction script in bytes.
pub const MAX_SCRIPT_SIZE: usize = 65_535;

/// Maximum number of signers and of attributes per transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// Maximum entries in a signer's allowed contract/group lists.
pub const MAX_SUBITEMS: usize = 16;

/// Maximum length of a witness invocation or verification script.
pub const MAX_WITNESS_SCRIPT_SIZE: usize = 1_024;

/// GAS minted to the committee address at genesis, in datoshi.
pub const INITIAL_GAS_DISTRIBUTION: u64 = 5_200_000_000_000_000;

/// One GAS expressed in datoshi.
pub const GAS_FACTOR: i64 = 100_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_sanity() {
        let settings = ProtocolSettings::default();
        assert_eq!(settings.validators_count as usize, 7);
        assert_eq!(settings.standby_committee.len(), 21);
        assert!(settings.validators_count as usize <= settings.standby_committee.len());
        assert_eq!(settings.milliseconds_per_block, MILLISECONDS_PER_BLOCK);
    }

    #[test]
    fn hardfork_lookup_is_monotonic_in_height() {
        let mut settings = ProtocolSettings::default();
        settings
            .hardforks
            .insert(Hardfork::Aspidochelone, 100);
        assert!(!settings.is_hardfork_enabled(Hardfork::Aspidochelone, 99));
        assert!(settings.is_hardfork_enabled(Hardfork::Aspidochelone, 100));
        assert!(settings.is_hardfork_enabled(Hardfork::Aspidochelone, 1_000));
    }

    #[test]
    fn unlisted_hardfork_is_disabled() {
        let settings = ProtocolSettings {
            hardforks: Default::default(),
            ..ProtocolSettings::default()
        };
        assert!(!settings.is_hardfork_enabled(Hardfork::Echidna, u32::MAX));
    }
}
