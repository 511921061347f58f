//! Deployed contract state.

use crate::manifest::ContractManifest;
use crate::{ContractError, ContractResult, Interoperable, NefFile};
use neo3_core::UInt160;
use neo3_io::SerializableExt;
use neo3_vm::{OpCode, StackItem};

/// The hash a contract deploys under: the script hash of
/// `ABORT ∥ push(sender) ∥ push(nef-checksum) ∥ push(name)`.
pub fn contract_hash(sender: &UInt160, nef_checksum: u32, name: &str) -> UInt160 {
    let mut builder = neo3_vm::ScriptBuilder::new();
    builder.emit(OpCode::Abort);
    builder.emit_push_bytes(&sender.to_array());
    builder.emit_push_int(nef_checksum as i64);
    builder.emit_push_string(name);
    UInt160::from_script(&builder.into_bytes())
}

/// A deployed (or native) contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractState {
    /// Sequential id; negative for native contracts.
    pub id: i32,
    /// Incremented by every update.
    pub update_counter: u16,
    pub hash: UInt160,
    pub nef: NefFile,
    pub manifest: ContractManifest,
}

impl ContractState {
    /// Whether the contract's manifest declares `method` at any arity.
    pub fn has_method(&self, method: &str) -> bool {
        self.manifest.abi.get_method_by_name(method).is_some()
    }
}

impl Interoperable for ContractState {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self> {
        let StackItem::Array(fields) = item else {
            return Err(ContractError::invalid_format(
                "contract state must be an array",
            ));
        };
        let fields = fields.borrow();
        if fields.len() != 5 {
            return Err(ContractError::invalid_format(format!(
                "contract state with {} fields",
                fields.len()
            )));
        }
        let id = i32::try_from(
            &fields[0]
                .to_integer()
                .map_err(|e| ContractError::invalid_format(e.to_string()))?,
        )
        .map_err(|_| ContractError::invalid_format("contract id outside i32"))?;
        let update_counter = u16::try_from(
            &fields[1]
                .to_integer()
                .map_err(|e| ContractError::invalid_format(e.to_string()))?,
        )
        .map_err(|_| ContractError::invalid_format("update counter outside u16"))?;
        let hash_bytes = fields[2]
            .to_bytes()
            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
        let hash = UInt160::from_bytes(&hash_bytes)
            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
        let nef_bytes = fields[3]
            .to_bytes()
            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
        let nef = NefFile::from_array(&nef_bytes)?;
        let manifest_json = fields[4]
            .to_bytes()
            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
        let manifest = ContractManifest::from_json(
            std::str::from_utf8(&manifest_json)
                .map_err(|_| ContractError::invalid_format("manifest is not UTF-8"))?,
        )?;
        Ok(Self {
            id,
            update_counter,
            hash,
            nef,
            manifest,
        })
    }

    fn to_stack_item(&self) -> StackItem {
        StackItem::from_array(vec![
            StackItem::from_int(self.id),
            StackItem::from_int(self.update_counter as i64),
            StackItem::from_bytes(self.hash.to_array().to_vec()),
            StackItem::from_bytes(self.nef.to_array()),
            StackItem::from_bytes(self.manifest.to_json().into_bytes()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ContractAbi, ContractMethod, ContractParameterType};

    fn sample_state() -> ContractState {
        let nef = NefFile::new("test", vec![0x51, 0x40]).unwrap();
        let manifest = ContractManifest::new(
            "sample",
            ContractAbi {
                methods: vec![ContractMethod {
                    name: "test".into(),
                    parameters: Vec::new(),
                    return_type: ContractParameterType::Integer,
                    offset: 0,
                    safe: true,
                }],
                events: Vec::new(),
            },
        );
        ContractState {
            id: 7,
            update_counter: 0,
            hash: contract_hash(&UInt160::ZERO, nef.checksum, "sample"),
            nef,
            manifest,
        }
    }

    #[test]
    fn stack_item_round_trips() {
        let state = sample_state();
        let item = state.to_stack_item();
        let decoded = ContractState::from_stack_item(&item).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn storage_round_trips() {
        let state = sample_state();
        let stored = state.to_storage_item().unwrap();
        let decoded = ContractState::from_storage_item(&stored).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn hash_depends_on_sender_checksum_and_name() {
        let a = contract_hash(&UInt160::ZERO, 1, "a");
        assert_ne!(a, contract_hash(&UInt160::ZERO, 1, "b"));
        assert_ne!(a, contract_hash(&UInt160::ZERO, 2, "a"));
        assert_ne!(a, contract_hash(&UInt160::from_script(b"s"), 1, "a"));
    }
}
