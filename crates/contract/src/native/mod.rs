//! Native contracts: protocol services callable like deployed contracts.

pub mod contract_management;
pub mod crypto_lib;
pub mod fungible;
pub mod gas_token;
pub mod ledger;
pub mod neo_token;
pub mod oracle;
pub mod policy;
pub mod role_management;
pub mod std_lib;

use crate::interop::{syscall_hash, EngineContext};
use crate::manifest::{
    ContractAbi, ContractManifest, ContractMethod, ContractParameter, ContractParameterType,
    ContractPermission, WildcardContainer,
};
use crate::{contract_hash, CallFlags, ContractState, NefFile};
use neo3_config::Hardfork;
use neo3_core::UInt160;
use neo3_vm::{ExecutionEngine, OpCode, StackItem, VmError, VmResult};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Bytes occupied by one method stub in a native script:
/// `PUSHINT8 0x00; SYSCALL <CallNative>; RET`.
const STUB_SIZE: usize = 8;

/// Offset of the SYSCALL instruction inside a stub.
const STUB_SYSCALL_OFFSET: usize = 2;

/// Descriptor of one native method.
pub struct NativeMethod {
    pub name: &'static str,
    pub parameters: &'static [(&'static str, ContractParameterType)],
    pub return_type: ContractParameterType,
    pub cpu_fee: i64,
    pub storage_fee: i64,
    pub required_flags: CallFlags,
    pub safe: bool,
}

impl NativeMethod {
    pub const fn safe(
        name: &'static str,
        parameters: &'static [(&'static str, ContractParameterType)],
        return_type: ContractParameterType,
        cpu_fee: i64,
    ) -> Self {
        Self {
            name,
            parameters,
            return_type,
            cpu_fee,
            storage_fee: 0,
            required_flags: CallFlags::READ_STATES,
            safe: true,
        }
    }

    pub const fn unsafe_method(
        name: &'static str,
        parameters: &'static [(&'static str, ContractParameterType)],
        return_type: ContractParameterType,
        cpu_fee: i64,
        storage_fee: i64,
    ) -> Self {
        Self {
            name,
            parameters,
            return_type,
            cpu_fee,
            storage_fee,
            required_flags: CallFlags::STATES,
            safe: false,
        }
    }

    fn has_return(&self) -> bool {
        self.return_type != ContractParameterType::Void
    }
}

/// A contract implemented in the node itself.
pub trait NativeContract: Send + Sync {
    /// Stable negative id.
    fn id(&self) -> i32;

    fn name(&self) -> &'static str;

    fn methods(&self) -> &'static [NativeMethod];

    /// The hardfork the contract activates in; `None` means genesis.
    fn active_in(&self) -> Option<Hardfork> {
        None
    }

    /// Dispatches a method call. Arguments arrive in declaration order.
    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>>;

    /// Runs once when the contract becomes active.
    fn initialize(&self, _context: &mut EngineContext) -> VmResult<()> {
        Ok(())
    }

    /// Runs before the transactions of every block.
    fn on_persist(&self, _context: &mut EngineContext, _engine: &mut ExecutionEngine) -> VmResult<()> {
        Ok(())
    }

    /// Runs after the transactions of every block.
    fn post_persist(
        &self,
        _context: &mut EngineContext,
        _engine: &mut ExecutionEngine,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Lets a contract adjust its manifest per active hardfork.
    fn post_compose_manifest(&self, _manifest: &mut ContractManifest) {}
}

/// The script backing a native contract: one stub per method.
pub fn native_script(method_count: usize) -> Vec<u8> {
    let call_native = syscall_hash("System.Contract.CallNative");
    let mut script = Vec::with_capacity(method_count * STUB_SIZE);
    for _ in 0..method_count {
        script.push(OpCode::PushInt8 as u8);
        script.push(0x00);
        script.push(OpCode::Syscall as u8);
        script.extend_from_slice(&call_native.to_le_bytes());
        script.push(OpCode::Ret as u8);
    }
    script
}

/// The deterministic hash of a native contract.
pub fn native_hash(name: &str) -> UInt160 {
    contract_hash(&UInt160::ZERO, 0, name)
}

/// The full [`ContractState`] of a native contract.
pub fn native_contract_state(native: &dyn NativeContract) -> ContractState {
    let script = native_script(native.methods().len());
    let nef = NefFile::new("neo-core-v3.0", script).expect("native script is well-formed");
    let methods = native
        .methods()
        .iter()
        .enumerate()
        .map(|(index, method)| ContractMethod {
            name: method.name.to_string(),
            parameters: method
                .parameters
                .iter()
                .map(|(name, parameter_type)| ContractParameter {
                    name: (*name).to_string(),
                    parameter_type: *parameter_type,
                })
                .collect(),
            return_type: method.return_type,
            offset: (index * STUB_SIZE) as u32,
            safe: method.safe,
        })
        .collect();
    let mut manifest = ContractManifest::new(
        native.name(),
        ContractAbi {
            methods,
            events: Vec::new(),
        },
    );
    manifest.permissions = vec![ContractPermission::allow_all()];
    manifest.trusts = WildcardContainer::List(Vec::new());
    native.post_compose_manifest(&mut manifest);
    ContractState {
        id: native.id(),
        update_counter: 0,
        hash: native_hash(native.name()),
        nef,
        manifest,
    }
}

/// Every native contract, in persist order.
pub static NATIVES: Lazy<Vec<Arc<dyn NativeContract>>> = Lazy::new(|| {
    vec![
        Arc::new(contract_management::ContractManagement),
        Arc::new(std_lib::StdLib),
        Arc::new(crypto_lib::CryptoLib),
        Arc::new(ledger::LedgerContract),
        Arc::new(neo_token::NeoToken),
        Arc::new(gas_token::GasToken),
        Arc::new(policy::PolicyContract),
        Arc::new(role_management::RoleManagement),
        Arc::new(oracle::OracleContract),
    ]
});

/// Looks up a native by its contract hash.
pub fn native_by_hash(hash: &UInt160) -> Option<Arc<dyn NativeContract>> {
    NATIVES
        .iter()
        .find(|native| &native_hash(native.name()) == hash)
        .cloned()
}

/// Looks up a native by its (negative) id.
pub fn native_by_id(id: i32) -> Option<Arc<dyn NativeContract>> {
    NATIVES.iter().find(|native| native.id() == id).cloned()
}

/// The contract state of the native with the given id, if any.
pub fn contract_state_by_id(id: i32) -> Option<ContractState> {
    native_by_id(id).map(|native| native_contract_state(native.as_ref()))
}

/// Natives active at the execution height.
pub fn active_natives(context: &EngineContext) -> Vec<Arc<dyn NativeContract>> {
    NATIVES
        .iter()
        .filter(|native| match native.active_in() {
            None => true,
            Some(hardfork) => context.is_hardfork_enabled(hardfork),
        })
        .cloned()
        .collect()
}

/// The `System.Contract.CallNative` implementation: resolves the executing
/// native and the method addressed by the current stub, then dispatches.
pub fn invoke_native(context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let state = context.current_state(engine)?;
    let native = native_by_hash(&state.script_hash).ok_or_else(|| {
        VmError::InvalidOperation(format!(
            "{} is not a native contract",
            state.script_hash
        ))
    })?;
    if let Some(hardfork) = native.active_in() {
        if !context.is_hardfork_enabled(hardfork) {
            return Err(VmError::InvalidOperation(format!(
                "native contract {} is not active yet",
                native.name()
            )));
        }
    }

    let ip = engine
        .current_context()
        .ok_or_else(|| VmError::InvalidOperation("no context".into()))?
        .instruction_pointer();
    let index = (ip - STUB_SYSCALL_OFFSET) / STUB_SIZE;
    let method = native
        .methods()
        .get(index)
        .ok_or_else(|| VmError::InvalidOperation(format!("no native method at stub {index}")))?;

    context.require_flags(engine, method.required_flags)?;
    context.add_fee(
        method.cpu_fee * context.exec_fee_factor as i64
            + method.storage_fee * context.storage_price as i64,
    )?;

    let mut args = Vec::with_capacity(method.parameters.len());
    for _ in 0..method.parameters.len() {
        args.push(engine.pop()?);
    }

    // A handler may load callback contexts (e.g. `_deploy`) on top of the
    // stub, so the return value is pushed onto the stub's own stack.
    let stub_index = engine.invocation_stack().len() - 1;
    let result = native.invoke(context, engine, method.name, args)?;
    if method.has_return() {
        let stub = engine
            .invocation_stack()
            .get(stub_index)
            .ok_or_else(|| VmError::InvalidOperation("native stub context vanished".into()))?;
        stub.evaluation_stack
            .borrow_mut()
            .push(result.unwrap_or(StackItem::Null));
    } else if result.is_some() {
        return Err(VmError::InvalidOperation(format!(
            "void native method {} produced a value",
            method.name
        )));
    }
    Ok(())
}

/// Stores every active native's contract state and runs its initializer.
/// Called while persisting the genesis block.
pub fn initialize_natives(context: &mut EngineContext) -> VmResult<()> {
    let natives: Vec<Arc<dyn NativeContract>> = NATIVES
        .iter()
        .filter(|native| match native.active_in() {
            None => true,
            Some(hardfork) => context.settings.is_hardfork_enabled(hardfork, 0),
        })
        .cloned()
        .collect();
    for native in natives {
        contract_management::put_contract_state(
            &context.snapshot,
            &native_contract_state(native.as_ref()),
        )
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        native.initialize(context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_hashes_are_distinct_and_stable() {
        let mut hashes: Vec<UInt160> = NATIVES
            .iter()
            .map(|native| native_hash(native.name()))
            .collect();
        let total = hashes.len();
        hashes.sort();
        hashes.dedup();
        assert_eq!(hashes.len(), total);
        // Stable across calls.
        assert_eq!(native_hash("NeoToken"), native_hash("NeoToken"));
    }

    #[test]
    fn native_ids_are_negative_and_unique() {
        let mut ids: Vec<i32> = NATIVES.iter().map(|native| native.id()).collect();
        assert!(ids.iter().all(|id| *id < 0));
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn native_scripts_validate_and_offsets_line_up() {
        for native in NATIVES.iter() {
            let state = native_contract_state(native.as_ref());
            assert!(neo3_vm::Script::new(state.nef.script.clone()).is_ok());
            state
                .manifest
                .abi
                .validate_offsets(state.nef.script.len())
                .unwrap();
        }
    }
}
