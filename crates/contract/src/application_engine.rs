// Copyright (C) 2015-2025 The Neo Project.
//
// application_engine.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The application engine: the VM host that implements the system-call
//! surface, meters gas and enforces call permissions.

use crate::interop::{descriptor_by_hash, EngineContext};
use crate::native;
use crate::{
    CallFlags, ContractState, EngineObserver, LogEventArgs, NotifyEventArgs, TriggerType,
};
use neo3_config::ProtocolSettings;
use neo3_core::{
    Block, ExtensiblePayload, Signer, Transaction, UInt160, Verifiable, WitnessCondition,
    WitnessScopes,
};
use neo3_crypto::murmur128;
use neo3_persistence::DataCache;
use neo3_vm::{
    ExecutionContext, ExecutionEngine, InteropHost, Instruction, Script, StackItem, VMState,
    VmError, VmResult,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// The snapshot type every engine runs against.
pub type StoreView = Arc<DataCache>;

/// Price of one gas "datoshi" unit per VM instruction price point.
const GAS_PER_INSTRUCTION_UNIT: i64 = 1;

/// Upper bound on notifications in one execution.
const MAX_NOTIFICATION_COUNT: usize = 512;

/// Upper bound on the serialized size of a notification payload.
const MAX_NOTIFICATION_SIZE: usize = 1024;

/// The object the current execution verifies or applies.
#[derive(Clone)]
pub enum ContainerRef {
    Transaction(Arc<Transaction>),
    Block(Arc<Block>),
    Extensible(Arc<ExtensiblePayload>),
    None,
}

impl ContainerRef {
    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        match self {
            ContainerRef::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    fn script_hashes_for_verifying(&self) -> Vec<UInt160> {
        match self {
            ContainerRef::Transaction(tx) => tx.script_hashes_for_verifying(),
            ContainerRef::Block(block) => block.header.script_hashes_for_verifying(),
            ContainerRef::Extensible(payload) => payload.script_hashes_for_verifying(),
            ContainerRef::None => Vec::new(),
        }
    }
}

/// Host data attached to each execution context.
#[derive(Debug)]
pub struct ContextState {
    pub script_hash: UInt160,
    pub calling_script_hash: Option<UInt160>,
    pub call_flags: Cell<CallFlags>,
    /// Contract id when the context belongs to a deployed or native
    /// contract; zero for loose scripts.
    pub contract_id: i32,
    pub is_dynamic_call: bool,
    /// Notifications emitted so far by this context; monotonic.
    pub notification_count: Cell<usize>,
}

impl ContextState {
    pub(crate) const KEY: &'static str = "contract-context-state";

    fn new(
        script_hash: UInt160,
        calling_script_hash: Option<UInt160>,
        call_flags: CallFlags,
        contract_id: i32,
        is_dynamic_call: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            script_hash,
            calling_script_hash,
            call_flags: Cell::new(call_flags),
            contract_id,
            is_dynamic_call,
            notification_count: Cell::new(0),
        })
    }
}

/// Hosts the VM and exposes the system-call surface.
pub struct ApplicationEngine {
    vm: ExecutionEngine,
    context: EngineContext,
}

impl ApplicationEngine {
    /// Creates an engine over `snapshot`.
    ///
    /// With no persisting block and an `Application`/`Verification` trigger,
    /// a dummy block one past the ledger tip is synthesized so that
    /// time-dependent interops behave sensibly in read-only invocations.
    pub fn new(
        trigger: TriggerType,
        container: ContainerRef,
        snapshot: StoreView,
        persisting_block: Option<Arc<Block>>,
        settings: Arc<ProtocolSettings>,
        gas_limit: i64,
    ) -> Self {
        let persisting_block = persisting_block
            .or_else(|| native::ledger::dummy_block(&snapshot, &settings).map(Arc::new));
        let exec_fee_factor = native::policy::exec_fee_factor(&snapshot);
        let storage_price = native::policy::storage_price(&snapshot);
        let random_seed = Self::derive_random_seed(&settings, &container, &persisting_block);
        Self {
            vm: ExecutionEngine::new(),
            context: EngineContext {
                trigger,
                container,
                snapshot,
                persisting_block,
                settings,
                gas_limit,
                gas_consumed: 0,
                exec_fee_factor,
                storage_price,
                notifications: Vec::new(),
                logs: Vec::new(),
                observers: Vec::new(),
                random_state: random_seed,
            },
        }
    }

    fn derive_random_seed(
        settings: &ProtocolSettings,
        container: &ContainerRef,
        persisting_block: &Option<Arc<Block>>,
    ) -> [u8; 16] {
        let mut seed = Vec::with_capacity(44);
        seed.extend_from_slice(&settings.network.to_le_bytes());
        if let Some(block) = persisting_block {
            seed.extend_from_slice(&block.header.nonce.to_le_bytes());
        }
        if let ContainerRef::Transaction(tx) = container {
            seed.extend_from_slice(tx.hash().get_span());
        }
        murmur128(&seed, 0)
    }

    /// Registers an observer for notify/log events.
    pub fn register_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.context.observers.push(observer);
    }

    pub fn trigger(&self) -> TriggerType {
        self.context.trigger
    }

    pub fn snapshot(&self) -> &StoreView {
        &self.context.snapshot
    }

    pub fn settings(&self) -> &Arc<ProtocolSettings> {
        &self.context.settings
    }

    pub fn persisting_block(&self) -> Option<&Arc<Block>> {
        self.context.persisting_block.as_ref()
    }

    pub fn gas_consumed(&self) -> i64 {
        self.context.gas_consumed
    }

    pub fn gas_limit(&self) -> i64 {
        self.context.gas_limit
    }

    pub fn notifications(&self) -> &[NotifyEventArgs] {
        &self.context.notifications
    }

    pub fn logs(&self) -> &[LogEventArgs] {
        &self.context.logs
    }

    pub fn state(&self) -> VMState {
        self.vm.state()
    }

    pub fn fault_message(&self) -> Option<&str> {
        self.vm.fault_message()
    }

    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.vm.uncaught_exception()
    }

    pub fn result_stack(&self) -> &neo3_vm::EvaluationStack {
        self.vm.result_stack()
    }

    pub fn vm(&self) -> &ExecutionEngine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.vm
    }

    /// Loads a loose script (the transaction entry script) with full flags.
    pub fn load_entry_script(&mut self, script_bytes: &[u8]) -> VmResult<()> {
        self.load_script_with_flags(script_bytes, CallFlags::ALL)
    }

    /// Loads a loose script with restricted flags, e.g. witness verification
    /// under `READ_ONLY`.
    pub fn load_script_with_flags(
        &mut self,
        script_bytes: &[u8],
        flags: CallFlags,
    ) -> VmResult<()> {
        let script = Script::new(script_bytes.to_vec())?;
        let script_hash = UInt160::from_script(script_bytes);
        self.vm.load_script(script, -1, 0)?;
        attach_state(
            self.vm
                .current_context_mut()
                .expect("context just loaded"),
            ContextState::new(script_hash, None, flags, 0, false),
        );
        Ok(())
    }

    /// Pushes a loose-data item onto the current context's stack, e.g. the
    /// arguments of an invocation script.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.vm.push(item)
    }

    /// Loads a contract method as the entry point.
    pub fn load_contract(
        &mut self,
        contract: &ContractState,
        method_name: &str,
        args: Vec<StackItem>,
        flags: CallFlags,
    ) -> VmResult<()> {
        EngineContext::load_contract_method(
            &mut self.context,
            &mut self.vm,
            contract,
            method_name,
            args,
            flags,
            None,
            false,
        )
    }

    /// Runs the loaded scripts to completion.
    pub fn execute(&mut self) -> VMState {
        self.vm.execute(&mut self.context)
    }

    /// Deploys the native contracts and runs their initializers. Called once
    /// while the genesis block persists.
    pub fn initialize_genesis(&mut self) -> VmResult<()> {
        native::initialize_natives(&mut self.context)
    }

    /// Whether `account` witnessed the current container.
    pub fn check_witness(&self, account: &UInt160) -> VmResult<bool> {
        self.context.check_witness_internal(&self.vm, account)
    }

    /// Charges `datoshi` against the execution budget.
    pub fn add_fee(&mut self, datoshi: i64) -> VmResult<()> {
        self.context.add_fee(datoshi)
    }
}

pub(crate) fn attach_state(context: &mut ExecutionContext, state: Rc<ContextState>) {
    context.set_state(ContextState::KEY, state);
}

pub(crate) fn context_state(context: &ExecutionContext) -> Option<Rc<ContextState>> {
    context.get_state::<ContextState>(ContextState::KEY)
}

impl EngineContext {
    /// The state of the executing context.
    pub(crate) fn current_state(&self, engine: &ExecutionEngine) -> VmResult<Rc<ContextState>> {
        engine
            .current_context()
            .and_then(context_state)
            .ok_or_else(|| VmError::InvalidOperation("no context state attached".into()))
    }

    pub(crate) fn current_script_hash(&self, engine: &ExecutionEngine) -> VmResult<UInt160> {
        Ok(self.current_state(engine)?.script_hash)
    }

    pub(crate) fn entry_script_hash(&self, engine: &ExecutionEngine) -> VmResult<UInt160> {
        engine
            .entry_context()
            .and_then(context_state)
            .map(|state| state.script_hash)
            .ok_or_else(|| VmError::InvalidOperation("no entry context".into()))
    }

    /// Charges `datoshi` against the budget, faulting when exhausted.
    pub(crate) fn add_fee(&mut self, datoshi: i64) -> VmResult<()> {
        self.gas_consumed = self
            .gas_consumed
            .checked_add(datoshi)
            .ok_or(VmError::OutOfGas)?;
        if self.gas_limit >= 0 && self.gas_consumed > self.gas_limit {
            return Err(VmError::OutOfGas);
        }
        Ok(())
    }

    /// Requires the executing context to hold `flags`.
    pub(crate) fn require_flags(
        &self,
        engine: &ExecutionEngine,
        required: CallFlags,
    ) -> VmResult<()> {
        let state = self.current_state(engine)?;
        if !state.call_flags.get().contains(required) {
            return Err(VmError::InvalidOperation(format!(
                "operation requires {required:?} but the context holds {:?}",
                state.call_flags.get()
            )));
        }
        Ok(())
    }

    /// Appends a notification, enforcing count and size caps.
    pub(crate) fn emit_notification(
        &mut self,
        engine: &ExecutionEngine,
        script_hash: UInt160,
        event_name: String,
        state: StackItem,
    ) -> VmResult<()> {
        if self.notifications.len() >= MAX_NOTIFICATION_COUNT {
            return Err(VmError::LimitExceeded(format!(
                "more than {MAX_NOTIFICATION_COUNT} notifications"
            )));
        }
        let serialized = crate::BinarySerializer::serialize(&state.deep_copy())
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        if serialized.len() > MAX_NOTIFICATION_SIZE {
            return Err(VmError::LimitExceeded(format!(
                "notification payload of {} bytes",
                serialized.len()
            )));
        }
        if let Some(state) = engine.current_context().and_then(context_state) {
            state
                .notification_count
                .set(state.notification_count.get() + 1);
        }
        let event = NotifyEventArgs {
            script_hash,
            event_name,
            state,
        };
        for observer in &self.observers {
            observer.on_notify(&event);
        }
        self.notifications.push(event);
        Ok(())
    }

    /// Appends a notification raised from native code (no context checks).
    pub(crate) fn emit_native_notification(
        &mut self,
        script_hash: UInt160,
        event_name: &str,
        state: StackItem,
    ) {
        let event = NotifyEventArgs {
            script_hash,
            event_name: to_owned_name(event_name),
            state,
        };
        for observer in &self.observers {
            observer.on_notify(&event);
        }
        self.notifications.push(event);
    }

    pub(crate) fn emit_log(&mut self, script_hash: UInt160, message: String) {
        let event = LogEventArgs {
            script_hash,
            message,
        };
        for observer in &self.observers {
            observer.on_log(&event);
        }
        self.logs.push(event);
    }

    /// The full contract-call algorithm behind `System.Contract.Call`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_contract(
        &mut self,
        engine: &mut ExecutionEngine,
        target_hash: &UInt160,
        method_name: &str,
        requested_flags: CallFlags,
        args: Vec<StackItem>,
        is_dynamic_call: bool,
    ) -> VmResult<()> {
        if method_name.starts_with('_') {
            return Err(VmError::InvalidOperation(format!(
                "cannot call reserved method {method_name}"
            )));
        }
        let target = native::contract_management::get_contract(&self.snapshot, target_hash)
            .ok_or_else(|| {
                VmError::InvalidOperation(format!("Called Contract Does Not Exist: {target_hash}"))
            })?;
        let method = target
            .manifest
            .abi
            .get_method(method_name, args.len())
            .ok_or_else(|| {
                VmError::InvalidOperation(format!(
                    "Method {method_name} Does Not Exist In Contract {target_hash}"
                ))
            })?
            .clone();

        // The calling contract's manifest must permit the call; loose entry
        // scripts have no manifest and may call anything.
        let caller_state = self.current_state(engine)?;
        if caller_state.contract_id != 0 {
            let caller = native::contract_management::get_contract_by_id(
                &self.snapshot,
                caller_state.contract_id,
            )
            .or_else(|| native::contract_state_by_id(caller_state.contract_id));
            if let Some(caller) = caller {
                if !caller
                    .manifest
                    .can_call(target_hash, &target.manifest, method_name)
                {
                    return Err(VmError::InvalidOperation(format!(
                        "Cannot Call Method {method_name} Of Contract {target_hash}"
                    )));
                }
            }
        }

        let mut flags = caller_state.call_flags.get() & requested_flags;
        if method.safe {
            flags = flags
                & (CallFlags::READ_STATES | CallFlags::ALLOW_CALL | CallFlags::ALLOW_NOTIFY);
        }
        let calling = caller_state.script_hash;
        tracing::debug!(target = %target_hash, method = method_name, ?flags, "contract call");
        Self::load_contract_method(
            self,
            engine,
            &target,
            method_name,
            args,
            flags,
            Some(calling),
            is_dynamic_call,
        )
    }

    /// Loads `contract.method` as a new execution context.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn load_contract_method(
        _context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        contract: &ContractState,
        method_name: &str,
        args: Vec<StackItem>,
        flags: CallFlags,
        calling_script_hash: Option<UInt160>,
        is_dynamic_call: bool,
    ) -> VmResult<()> {
        let method = contract
            .manifest
            .abi
            .get_method(method_name, args.len())
            .ok_or_else(|| {
                VmError::InvalidOperation(format!(
                    "Method {method_name} Does Not Exist In Contract {}",
                    contract.hash
                ))
            })?;
        let rvcount = if method.return_type == crate::manifest::ContractParameterType::Void {
            0
        } else {
            1
        };
        let script = Script::new(contract.nef.script.clone())?;
        let mut callee = ExecutionContext::new(
            Rc::new(script),
            rvcount,
            engine.reference_counter(),
        );
        callee.jump_to(method.offset as usize)?;
        attach_state(
            &mut callee,
            ContextState::new(
                contract.hash,
                calling_script_hash,
                flags,
                contract.id,
                is_dynamic_call,
            ),
        );
        // Arguments are pushed in reverse so INITSLOT reads them in order.
        {
            let mut stack = callee.evaluation_stack.borrow_mut();
            for arg in args.into_iter().rev() {
                stack.push(arg);
            }
        }
        let initialize_offset = contract
            .manifest
            .abi
            .get_method("_initialize", 0)
            .map(|initialize| initialize.offset as usize);
        engine.load_context(callee)?;
        if let Some(offset) = initialize_offset {
            // _initialize runs first as a nested call sharing the stack.
            let current = engine
                .current_context()
                .expect("context just loaded");
            let mut init_context = current.call_clone(offset);
            init_context.jump_to(offset)?;
            engine.load_context(init_context)?;
        }
        Ok(())
    }

    /// The witness check: does `account` authorize the current execution?
    pub(crate) fn check_witness_internal(
        &self,
        engine: &ExecutionEngine,
        account: &UInt160,
    ) -> VmResult<bool> {
        // The callee's own account vouches for itself when its direct caller
        // is that account's contract.
        if let Ok(state) = self.current_state(engine) {
            if state.calling_script_hash.as_ref() == Some(account) {
                return Ok(true);
            }
        }
        match &self.container {
            ContainerRef::Transaction(tx) => {
                let Some(signer) = tx.signers().iter().find(|s| &s.account == account) else {
                    return Ok(false);
                };
                self.check_signer_scopes(engine, signer)
            }
            other => Ok(other.script_hashes_for_verifying().contains(account)),
        }
    }

    fn check_signer_scopes(&self, engine: &ExecutionEngine, signer: &Signer) -> VmResult<bool> {
        if signer.scopes.contains(WitnessScopes::GLOBAL) {
            return Ok(true);
        }
        if signer.scopes.contains(WitnessScopes::CALLED_BY_ENTRY) {
            let state = self.current_state(engine)?;
            let entry = self.entry_script_hash(engine)?;
            // Valid when executing the entry script itself or a contract the
            // entry called directly.
            if state.calling_script_hash.is_none()
                || state.calling_script_hash == Some(entry)
                || state.script_hash == entry
            {
                return Ok(true);
            }
        }
        if signer.scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            let current = self.current_script_hash(engine)?;
            if signer.allowed_contracts.contains(&current) {
                return Ok(true);
            }
        }
        if signer.scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            let current = self.current_script_hash(engine)?;
            if let Some(contract) =
                native::contract_management::get_contract(&self.snapshot, &current)
            {
                if contract.manifest.groups.iter().any(|group| {
                    signer
                        .allowed_groups
                        .iter()
                        .any(|allowed| allowed == &group.pubkey)
                }) {
                    return Ok(true);
                }
            }
        }
        if signer.scopes.contains(WitnessScopes::WITNESS_RULES) {
            for rule in &signer.rules {
                if self.evaluate_condition(engine, &rule.condition)? {
                    return Ok(rule.action == neo3_core::WitnessRuleAction::Allow);
                }
            }
        }
        Ok(false)
    }

    fn evaluate_condition(
        &self,
        engine: &ExecutionEngine,
        condition: &WitnessCondition,
    ) -> VmResult<bool> {
        Ok(match condition {
            WitnessCondition::Boolean(value) => *value,
            WitnessCondition::Not(inner) => !self.evaluate_condition(engine, inner)?,
            WitnessCondition::And(children) => {
                for child in children {
                    if !self.evaluate_condition(engine, child)? {
                        return Ok(false);
                    }
                }
                true
            }
            WitnessCondition::Or(children) => {
                for child in children {
                    if self.evaluate_condition(engine, child)? {
                        return Ok(true);
                    }
                }
                false
            }
            WitnessCondition::ScriptHash(hash) => &self.current_script_hash(engine)? == hash,
            WitnessCondition::Group(group) => {
                let current = self.current_script_hash(engine)?;
                native::contract_management::get_contract(&self.snapshot, &current)
                    .map(|contract| {
                        contract
                            .manifest
                            .groups
                            .iter()
                            .any(|contract_group| &contract_group.pubkey == group)
                    })
                    .unwrap_or(false)
            }
            WitnessCondition::CalledByEntry => {
                let state = self.current_state(engine)?;
                let entry = self.entry_script_hash(engine)?;
                state.calling_script_hash.is_none()
                    || state.calling_script_hash == Some(entry)
                    || state.script_hash == entry
            }
            WitnessCondition::CalledByContract(hash) => {
                self.current_state(engine)?.calling_script_hash.as_ref() == Some(hash)
            }
            WitnessCondition::CalledByGroup(group) => {
                let Some(calling) = self.current_state(engine)?.calling_script_hash else {
                    return Ok(false);
                };
                native::contract_management::get_contract(&self.snapshot, &calling)
                    .map(|contract| {
                        contract
                            .manifest
                            .groups
                            .iter()
                            .any(|contract_group| &contract_group.pubkey == group)
                    })
                    .unwrap_or(false)
            }
        })
    }

    /// The persisting block height, or the height the dummy block simulates.
    pub(crate) fn current_height(&self) -> u32 {
        self.persisting_block
            .as_ref()
            .map(|block| block.index())
            .unwrap_or(0)
    }

    /// Whether `hardfork` is active at the execution height.
    pub(crate) fn is_hardfork_enabled(&self, hardfork: neo3_config::Hardfork) -> bool {
        self.settings
            .is_hardfork_enabled(hardfork, self.current_height())
    }
}

fn to_owned_name(name: &str) -> String {
    name.to_string()
}

impl InteropHost for EngineContext {
    fn syscall(&mut self, engine: &mut ExecutionEngine, hash: u32) -> VmResult<()> {
        let descriptor = descriptor_by_hash(hash)
            .ok_or_else(|| VmError::Syscall(format!("unknown syscall {hash:#010x}")))?;
        self.require_flags(engine, descriptor.required_flags)?;
        self.add_fee(descriptor.price * self.exec_fee_factor as i64)?;
        (descriptor.handler)(self, engine)
    }

    fn pre_execute(
        &mut self,
        _engine: &mut ExecutionEngine,
        instruction: &Instruction,
    ) -> VmResult<()> {
        let price = instruction.opcode().price() * GAS_PER_INSTRUCTION_UNIT;
        self.add_fee(price * self.exec_fee_factor as i64)
    }

    fn load_token(&mut self, engine: &mut ExecutionEngine, token_index: u16) -> VmResult<()> {
        let state = self.current_state(engine)?;
        let contract = native::contract_management::get_contract_by_id(
            &self.snapshot,
            state.contract_id,
        )
        .ok_or_else(|| {
            VmError::InvalidOperation("CALLT outside a deployed contract".into())
        })?;
        let token = contract
            .nef
            .tokens
            .get(token_index as usize)
            .ok_or_else(|| VmError::InvalidOperation(format!("no method token {token_index}")))?
            .clone();
        let mut args = Vec::with_capacity(token.parameters_count as usize);
        for _ in 0..token.parameters_count {
            args.push(engine.pop()?);
        }
        args.reverse();
        self.call_contract(engine, &token.hash, &token.method, token.call_flags, args, false)
    }
}
