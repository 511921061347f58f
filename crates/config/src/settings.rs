//! Network-specific protocol settings.

use crate::{Hardfork, INITIAL_GAS_DISTRIBUTION, MAX_TRACEABLE_BLOCKS, MAX_TRANSACTIONS_PER_BLOCK, MAX_VALID_UNTIL_BLOCK_INCREMENT, MEMORY_POOL_MAX_TRANSACTIONS, MILLISECONDS_PER_BLOCK};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors raised while loading or validating protocol settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// The consensus-critical parameters of a network.
///
/// Loaded from JSON at startup; [`ProtocolSettings::default`] yields the
/// mainnet parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Network magic, mixed into every signature.
    pub network: u32,
    /// First byte of Base58Check-encoded addresses.
    pub address_version: u8,
    /// Compressed public keys of the standby committee, hex encoded.
    pub standby_committee: Vec<String>,
    /// How many committee members participate in consensus.
    pub validators_count: u8,
    /// Initial peers to connect to.
    pub seed_list: Vec<String>,
    /// Target milliseconds between blocks.
    pub milliseconds_per_block: u32,
    /// Upper bound on transactions per block.
    pub max_transactions_per_block: u32,
    /// Capacity of the memory pool.
    pub memory_pool_max_transactions: usize,
    /// How many blocks back state queries may reach.
    pub max_traceable_blocks: u32,
    /// Upper bound on `valid_until_block - current_index`.
    pub max_valid_until_block_increment: u32,
    /// GAS minted at genesis, in datoshi.
    pub initial_gas_distribution: u64,
    /// Activation heights of named hardforks.
    pub hardforks: BTreeMap<Hardfork, u32>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            network: 0x334F454E,
            address_version: 0x35,
            standby_committee: MAINNET_STANDBY_COMMITTEE.iter().map(|s| s.to_string()).collect(),
            validators_count: 7,
            seed_list: vec![
                "seed1.neo.org:10333".into(),
                "seed2.neo.org:10333".into(),
                "seed3.neo.org:10333".into(),
                "seed4.neo.org:10333".into(),
                "seed5.neo.org:10333".into(),
            ],
            milliseconds_per_block: MILLISECONDS_PER_BLOCK,
            max_transactions_per_block: MAX_TRANSACTIONS_PER_BLOCK,
            memory_pool_max_transactions: MEMORY_POOL_MAX_TRANSACTIONS,
            max_traceable_blocks: MAX_TRACEABLE_BLOCKS,
            max_valid_until_block_increment: MAX_VALID_UNTIL_BLOCK_INCREMENT,
            initial_gas_distribution: INITIAL_GAS_DISTRIBUTION,
            hardforks: Hardfork::ALL.iter().map(|hf| (*hf, 0)).collect(),
        }
    }
}

impl ProtocolSettings {
    /// Parses settings from their JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Number of committee members.
    pub fn committee_members_count(&self) -> usize {
        self.standby_committee.len()
    }

    /// Whether `hardfork` is active at `height`.
    ///
    /// A hardfork missing from the map is never active; height 0 in the map
    /// means active from genesis.
    pub fn is_hardfork_enabled(&self, hardfork: Hardfork, height: u32) -> bool {
        match self.hardforks.get(&hardfork) {
            Some(&activation) => height >= activation,
            None => false,
        }
    }

    /// The standby validators: the first `validators_count` committee members.
    pub fn standby_validators(&self) -> &[String] {
        &self.standby_committee[..self.validators_count as usize]
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.standby_committee.is_empty() {
            return Err(SettingsError::Invalid("standby committee is empty".into()));
        }
        if self.validators_count == 0
            || self.validators_count as usize > self.standby_committee.len()
        {
            return Err(SettingsError::Invalid(format!(
                "validators count {} out of range for committee of {}",
                self.validators_count,
                self.standby_committee.len()
            )));
        }
        // Hardfork heights must respect the activation order.
        let mut previous = 0u32;
        for hf in Hardfork::ALL {
            if let Some(&height) = self.hardforks.get(&hf) {
                if height < previous {
                    return Err(SettingsError::Invalid(format!(
                        "hardfork {hf} activates at {height}, before its predecessor at {previous}"
                    )));
                }
                previous = height;
            }
        }
        Ok(())
    }
}

/// Mainnet standby committee (21 compressed secp256r1 public keys).
const MAINNET_STANDBY_COMMITTEE: [&str; 21] = [
    "03b209fd4f53a7170ea4444e0cb0a6bb6a53c2bd016926989cf85f9b0fba17a70c",
    "02df48f60e8f3e01c48ff40b9b7f1310d7a8b2a193188befe1c2e3df740e895093",
    "03b8d9d5771d8f513aa0869b9cc8d50986403b78c6da36890638c3d46a5adce04a",
    "02ca0e27697b9c248f6f16e085fd0061e26f44da85b58ee835c110caa5ec3ba554",
    "024c7b7fb6c310fccf1ba33b082519d82964ea93868d676662d4a59ad548df0e7d",
    "02aaec38470f6aad0042c6e877cfd8087d2676b0f516fddd362801b9bd3936399e",
    "02486fd15702c4490a26703112a5cc1d0923fd697a33406bd5a1c00e0013b09a70",
    "023a36c72844610b4d34d1968662424011bf783ca9d984efa19a20babf5582f3fe",
    "03708b860c1de5d87f5b151a12c2a99feebd2e8b315ee8e7cf8aa19692a9e18379",
    "03c6aa6e12638b36e88adc1ccdceac4db9929575c3e03576c617c49cce7114a050",
    "03204223f8c86b8cd5c89ef12e4f0dbb314172e9241e30c9ef2293790793537cf0",
    "02a62c915cf19c7f19a50ec217e79fac2439bbaad658493de0c7d8ffa92ab0aa62",
    "03409f31f0d66bdc2f70a9730b66fe186658f84a8018204db01c106edc36553cd0",
    "0288342b141c30dc8ffcde0204929bb46aed5756b41ef4a56778d15ada8f0c6654",
    "020f2887f41474cfeb11fd262e982051c1541418137c02a0f4961af911045de639",
    "0222038884bbd1d8ff109ed3bdef3542e768eef76c1247aea8bc8171f532928c30",
    "03d281b42002647f0113f36c7b8efb30db66078dfaaa9ab3ff76d043a98d512fde",
    "02504acbc1f4b3bdad1d86d6e1a08603771db135a73e61c9d565ae06a1938cd2ad",
    "0226933336f1b75baa42d42b71d9091508b638046d19abd67f4e119bf64a7cfb4d",
    "03cdcea66032b82f5c30450e381e5295cae85c5e6943af716cc6b646352a6067dc",
    "02cd5a5547119e24feaa7c2a0f37b8c9366216bab7054de0065c9be42084003c8a",
];
