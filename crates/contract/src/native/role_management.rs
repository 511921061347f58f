//! RoleManagement: committee-designated node roles.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use neo3_crypto::ECPoint;
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use std::sync::Arc;

pub const ID: i32 = -8;

/// Node roles the committee can designate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    StateValidator = 4,
    Oracle = 8,
    NeoFsAlphabetNode = 16,
    P2pNotary = 32,
}

impl Role {
    pub fn from_byte(byte: u8) -> Option<Role> {
        match byte {
            4 => Some(Role::StateValidator),
            8 => Some(Role::Oracle),
            16 => Some(Role::NeoFsAlphabetNode),
            32 => Some(Role::P2pNotary),
            _ => None,
        }
    }
}

/// Committee-managed role designation.
pub struct RoleManagement;

fn role_key(role: Role, index: u32) -> StorageKey {
    StorageKey::with_prefix(ID, role as u8).append(&index.to_be_bytes())
}

/// The nodes designated for `role` as of block `index` (the latest
/// designation at or before it).
pub fn get_designated_by_role(
    snapshot: &Arc<DataCache>,
    role: Role,
    index: u32,
) -> Vec<ECPoint> {
    let prefix = StorageKey::with_prefix(ID, role as u8).to_bytes();
    let entries = snapshot
        .find(&prefix, SeekDirection::Forward)
        .unwrap_or_default();
    let mut latest: Option<(u32, Vec<ECPoint>)> = None;
    for (key, item) in entries {
        let suffix = key.suffix();
        if suffix.len() != 5 {
            continue;
        }
        let Some(height_bytes) = suffix[1..5].try_into().ok() else {
            continue;
        };
        let height = u32::from_be_bytes(height_bytes);
        if height > index {
            continue;
        }
        let nodes: Vec<ECPoint> = item
            .value()
            .chunks_exact(33)
            .filter_map(|chunk| ECPoint::from_bytes(chunk).ok())
            .collect();
        if latest.as_ref().map_or(true, |(best, _)| height >= *best) {
            latest = Some((height, nodes));
        }
    }
    latest.map(|(_, nodes)| nodes).unwrap_or_default()
}

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe(
        "getDesignatedByRole",
        &[
            ("role", ContractParameterType::Integer),
            ("index", ContractParameterType::Integer),
        ],
        ContractParameterType::Array,
        1 << 15,
    ),
    NativeMethod::unsafe_method(
        "designateAsRole",
        &[
            ("role", ContractParameterType::Integer),
            ("nodes", ContractParameterType::Array),
        ],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
];

impl NativeContract for RoleManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "RoleManagement"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        match method {
            "getDesignatedByRole" => {
                let role = Role::from_byte(args[0].to_index()? as u8)
                    .ok_or_else(|| VmError::InvalidOperation("unknown role".into()))?;
                let index = args[1].to_index()? as u32;
                if context
                    .persisting_block
                    .as_ref()
                    .map(|block| index > block.index() + 1)
                    .unwrap_or(false)
                {
                    return Err(VmError::OutOfRange("designation index in the future".into()));
                }
                let nodes = get_designated_by_role(&context.snapshot, role, index);
                Ok(Some(StackItem::from_array(
                    nodes
                        .into_iter()
                        .map(|pubkey| StackItem::from_bytes(pubkey.as_bytes().to_vec()))
                        .collect(),
                )))
            }
            "designateAsRole" => {
                let role = Role::from_byte(args[0].to_index()? as u8)
                    .ok_or_else(|| VmError::InvalidOperation("unknown role".into()))?;
                let StackItem::Array(nodes) = &args[1] else {
                    return Err(VmError::InvalidType("nodes must be an array".into()));
                };
                let nodes = nodes.borrow();
                if nodes.is_empty() || nodes.len() > 32 {
                    return Err(VmError::OutOfRange(format!(
                        "{} designated nodes outside 1..=32",
                        nodes.len()
                    )));
                }
                super::neo_token::require_committee_witness(context, engine)?;

                let mut pubkeys = Vec::with_capacity(nodes.len());
                for node in nodes.iter() {
                    let bytes = node.to_bytes()?;
                    pubkeys.push(
                        ECPoint::from_bytes(&bytes)
                            .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
                    );
                }
                pubkeys.sort();
                pubkeys.dedup();

                let block = context
                    .persisting_block
                    .as_ref()
                    .ok_or_else(|| VmError::InvalidOperation("designation needs a block".into()))?;
                // Effective from the next block.
                let effective = block.index() + 1;
                let mut value = Vec::with_capacity(pubkeys.len() * 33);
                for pubkey in &pubkeys {
                    value.extend_from_slice(pubkey.as_bytes());
                }
                context
                    .snapshot
                    .put(&role_key(role, effective), StorageItem::new(value));

                context.emit_native_notification(
                    super::native_hash(self.name()),
                    "Designation",
                    StackItem::from_array(vec![
                        StackItem::from_int(role as u8 as i64),
                        StackItem::from_int(block.index() as i64),
                    ]),
                );
                Ok(None)
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown RoleManagement method {other}"
            ))),
        }
    }
}
