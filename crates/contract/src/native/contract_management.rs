//! ContractManagement: deployment, updates and destruction.

use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::{ContractManifest, ContractParameterType};
use crate::{contract_hash, ContractError, ContractState, Interoperable, NefFile};
use neo3_core::UInt160;
use neo3_io::SerializableExt;
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use std::sync::Arc;

pub const ID: i32 = -1;

const PREFIX_CONTRACT: u8 = 8;
const PREFIX_CONTRACT_HASH: u8 = 12;
const PREFIX_NEXT_AVAILABLE_ID: u8 = 15;
const PREFIX_MINIMUM_DEPLOYMENT_FEE: u8 = 20;

const DEFAULT_MINIMUM_DEPLOYMENT_FEE: i64 = 10_0000_0000;

/// Owns the deployed-contract registry.
pub struct ContractManagement;

fn contract_key(hash: &UInt160) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_CONTRACT).append(&hash.to_array())
}

fn contract_hash_key(id: i32) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_CONTRACT_HASH).append(&id.to_be_bytes())
}

/// Reads a deployed or native contract by hash.
pub fn get_contract(snapshot: &Arc<DataCache>, hash: &UInt160) -> Option<ContractState> {
    let item = snapshot.try_get(&contract_key(hash))?;
    ContractState::from_storage_item(&item).ok()
}

/// Reads a deployed contract by id.
pub fn get_contract_by_id(snapshot: &Arc<DataCache>, id: i32) -> Option<ContractState> {
    let item = snapshot.try_get(&contract_hash_key(id))?;
    let hash = UInt160::from_bytes(item.value()).ok()?;
    get_contract(snapshot, &hash)
}

/// Writes a contract state under both its hash and id keys.
pub fn put_contract_state(
    snapshot: &Arc<DataCache>,
    contract: &ContractState,
) -> Result<(), ContractError> {
    let item = contract.to_storage_item()?;
    snapshot.put(&contract_key(&contract.hash), item);
    snapshot.put(
        &contract_hash_key(contract.id),
        StorageItem::new(contract.hash.to_array().to_vec()),
    );
    Ok(())
}

fn next_available_id(snapshot: &Arc<DataCache>) -> i32 {
    let key = StorageKey::with_prefix(ID, PREFIX_NEXT_AVAILABLE_ID);
    let current = snapshot
        .try_get(&key)
        .map(|item| item.as_int())
        .unwrap_or_else(|| BigInt::from(1));
    let id = i32::try_from(&current).unwrap_or(1);
    snapshot.put(&key, StorageItem::from_i64(id as i64 + 1));
    id
}

/// The configured minimum deployment fee in datoshi.
pub fn minimum_deployment_fee(snapshot: &Arc<DataCache>) -> i64 {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE))
        .map(|item| i64::try_from(&item.as_int()).unwrap_or(DEFAULT_MINIMUM_DEPLOYMENT_FEE))
        .unwrap_or(DEFAULT_MINIMUM_DEPLOYMENT_FEE)
}

impl ContractManagement {
    fn deploy(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        nef_bytes: Vec<u8>,
        manifest_bytes: Vec<u8>,
        data: StackItem,
    ) -> VmResult<StackItem> {
        let tx = context
            .container
            .transaction()
            .ok_or_else(|| VmError::InvalidOperation("deploy requires a transaction".into()))?
            .clone();
        let sender = tx.sender();

        context.add_fee(minimum_deployment_fee(&context.snapshot))?;

        let nef = NefFile::from_array(&nef_bytes)
            .map_err(|e| VmError::InvalidOperation(format!("invalid NEF: {e}")))?;
        let manifest_text = std::str::from_utf8(&manifest_bytes)
            .map_err(|_| VmError::InvalidOperation("manifest is not UTF-8".into()))?;
        let manifest = ContractManifest::from_json(manifest_text)
            .map_err(|e| VmError::InvalidOperation(format!("invalid manifest: {e}")))?;
        manifest
            .abi
            .validate_offsets(nef.script.len())
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        neo3_vm::Script::new(nef.script.clone())?;

        let hash = contract_hash(&sender, nef.checksum, &manifest.name);
        if !manifest.is_valid_for(&hash) {
            return Err(VmError::InvalidOperation(
                "manifest groups do not endorse the contract hash".into(),
            ));
        }
        if super::policy::is_blocked(&context.snapshot, &hash) {
            return Err(VmError::InvalidOperation(format!(
                "contract hash {hash} is blocked"
            )));
        }
        if get_contract(&context.snapshot, &hash).is_some() {
            return Err(VmError::InvalidOperation(format!(
                "contract {hash} is already deployed"
            )));
        }

        let contract = ContractState {
            id: next_available_id(&context.snapshot),
            update_counter: 0,
            hash,
            nef,
            manifest,
        };
        put_contract_state(&context.snapshot, &contract)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;

        context.emit_native_notification(
            super::native_hash(self.name()),
            "Deploy",
            StackItem::from_array(vec![StackItem::from_bytes(hash.to_array().to_vec())]),
        );

        // Give the contract its activation callback.
        if contract.manifest.abi.get_method("_deploy", 2).is_some() {
            EngineContext::load_contract_method(
                context,
                engine,
                &contract,
                "_deploy",
                vec![data, StackItem::from_bool(false)],
                crate::CallFlags::ALL,
                Some(context.current_script_hash(engine)?),
                false,
            )?;
        }

        Ok(contract.to_stack_item())
    }

    fn update(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        nef_bytes: Option<Vec<u8>>,
        manifest_bytes: Option<Vec<u8>>,
        data: StackItem,
    ) -> VmResult<()> {
        if nef_bytes.is_none() && manifest_bytes.is_none() {
            return Err(VmError::InvalidOperation(
                "update requires a new NEF or manifest".into(),
            ));
        }
        let state = context.current_state(engine)?;
        let mut contract = get_contract_by_id(&context.snapshot, state.contract_id)
            .ok_or_else(|| VmError::InvalidOperation("update outside a deployed contract".into()))?;

        if let Some(bytes) = nef_bytes {
            let nef = NefFile::from_array(&bytes)
                .map_err(|e| VmError::InvalidOperation(format!("invalid NEF: {e}")))?;
            neo3_vm::Script::new(nef.script.clone())?;
            contract.nef = nef;
        }
        if let Some(bytes) = manifest_bytes {
            let text = std::str::from_utf8(&bytes)
                .map_err(|_| VmError::InvalidOperation("manifest is not UTF-8".into()))?;
            let manifest = ContractManifest::from_json(text)
                .map_err(|e| VmError::InvalidOperation(format!("invalid manifest: {e}")))?;
            if manifest.name != contract.manifest.name {
                return Err(VmError::InvalidOperation(
                    "updates cannot rename a contract".into(),
                ));
            }
            contract.manifest = manifest;
        }
        contract
            .manifest
            .abi
            .validate_offsets(contract.nef.script.len())
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        contract.update_counter = contract
            .update_counter
            .checked_add(1)
            .ok_or_else(|| VmError::InvalidOperation("update counter overflow".into()))?;
        put_contract_state(&context.snapshot, &contract)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;

        context.emit_native_notification(
            super::native_hash(self.name()),
            "Update",
            StackItem::from_array(vec![StackItem::from_bytes(
                contract.hash.to_array().to_vec(),
            )]),
        );

        if contract.manifest.abi.get_method("_deploy", 2).is_some() {
            EngineContext::load_contract_method(
                context,
                engine,
                &contract,
                "_deploy",
                vec![data, StackItem::from_bool(true)],
                crate::CallFlags::ALL,
                Some(contract.hash),
                false,
            )?;
        }
        Ok(())
    }

    fn destroy(&self, context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
        let state = context.current_state(engine)?;
        let Some(contract) = get_contract_by_id(&context.snapshot, state.contract_id) else {
            return Ok(());
        };
        context.snapshot.delete(&contract_key(&contract.hash));
        context.snapshot.delete(&contract_hash_key(contract.id));
        // Purge the contract's storage space.
        let prefix = StorageKey::new(contract.id).to_bytes();
        let entries = context
            .snapshot
            .find(&prefix, SeekDirection::Forward)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        for (key, _) in entries {
            context.snapshot.delete(&key);
        }
        // A destroyed hash can never be redeployed.
        super::policy::block_account_internal(&context.snapshot, &contract.hash);

        context.emit_native_notification(
            super::native_hash(self.name()),
            "Destroy",
            StackItem::from_array(vec![StackItem::from_bytes(
                contract.hash.to_array().to_vec(),
            )]),
        );
        Ok(())
    }
}

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe(
        "getContract",
        &[("hash", ContractParameterType::Hash160)],
        ContractParameterType::Array,
        1 << 15,
    ),
    NativeMethod::safe(
        "getContractById",
        &[("id", ContractParameterType::Integer)],
        ContractParameterType::Array,
        1 << 15,
    ),
    NativeMethod::safe(
        "hasMethod",
        &[
            ("hash", ContractParameterType::Hash160),
            ("method", ContractParameterType::String),
        ],
        ContractParameterType::Boolean,
        1 << 15,
    ),
    NativeMethod::safe(
        "getMinimumDeploymentFee",
        &[],
        ContractParameterType::Integer,
        1 << 15,
    ),
    NativeMethod::unsafe_method(
        "setMinimumDeploymentFee",
        &[("value", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::unsafe_method(
        "deploy",
        &[
            ("nefFile", ContractParameterType::ByteArray),
            ("manifest", ContractParameterType::ByteArray),
            ("data", ContractParameterType::Any),
        ],
        ContractParameterType::Array,
        0,
        0,
    ),
    NativeMethod::unsafe_method(
        "update",
        &[
            ("nefFile", ContractParameterType::ByteArray),
            ("manifest", ContractParameterType::ByteArray),
            ("data", ContractParameterType::Any),
        ],
        ContractParameterType::Void,
        0,
        0,
    ),
    NativeMethod::unsafe_method("destroy", &[], ContractParameterType::Void, 1 << 15, 0),
];

impl NativeContract for ContractManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "ContractManagement"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn initialize(&self, context: &mut EngineContext) -> VmResult<()> {
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_NEXT_AVAILABLE_ID),
            StorageItem::from_i64(1),
        );
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE),
            StorageItem::from_i64(DEFAULT_MINIMUM_DEPLOYMENT_FEE),
        );
        Ok(())
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        mut args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        match method {
            "getContract" => {
                let hash = pop_hash(&args[0])?;
                Ok(Some(
                    get_contract(&context.snapshot, &hash)
                        .map(|contract| contract.to_stack_item())
                        .unwrap_or(StackItem::Null),
                ))
            }
            "getContractById" => {
                let id = i32::try_from(&args[0].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("contract id outside i32".into()))?;
                let contract = get_contract_by_id(&context.snapshot, id)
                    .or_else(|| super::contract_state_by_id(id));
                Ok(Some(
                    contract
                        .map(|contract| contract.to_stack_item())
                        .unwrap_or(StackItem::Null),
                ))
            }
            "hasMethod" => {
                let hash = pop_hash(&args[0])?;
                let name = String::from_utf8(args[1].to_bytes()?)
                    .map_err(|_| VmError::InvalidType("method name is not UTF-8".into()))?;
                let found = get_contract(&context.snapshot, &hash)
                    .map(|contract| contract.has_method(&name))
                    .unwrap_or(false);
                Ok(Some(StackItem::from_bool(found)))
            }
            "getMinimumDeploymentFee" => Ok(Some(StackItem::from_int(minimum_deployment_fee(
                &context.snapshot,
            )))),
            "setMinimumDeploymentFee" => {
                let value = i64::try_from(&args[0].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("fee outside i64".into()))?;
                if value < 0 {
                    return Err(VmError::OutOfRange("negative deployment fee".into()));
                }
                super::neo_token::require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            "deploy" => {
                let data = args.pop().expect("declared arity");
                let manifest = args.pop().expect("declared arity").to_bytes()?;
                let nef = args.pop().expect("declared arity").to_bytes()?;
                Ok(Some(self.deploy(context, engine, nef, manifest, data)?))
            }
            "update" => {
                let data = args.pop().expect("declared arity");
                let manifest = optional_bytes(args.pop().expect("declared arity"))?;
                let nef = optional_bytes(args.pop().expect("declared arity"))?;
                self.update(context, engine, nef, manifest, data)?;
                Ok(None)
            }
            "destroy" => {
                self.destroy(context, engine)?;
                Ok(None)
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown ContractManagement method {other}"
            ))),
        }
    }
}

fn pop_hash(item: &StackItem) -> VmResult<UInt160> {
    let bytes = item.to_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}

fn optional_bytes(item: StackItem) -> VmResult<Option<Vec<u8>>> {
    if item.is_null() {
        return Ok(None);
    }
    Ok(Some(item.to_bytes()?))
}
