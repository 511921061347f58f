//! End-to-end tests of the application engine and native contracts.

use neo3_config::ProtocolSettings;
use neo3_contract::manifest::{
    ContractAbi, ContractManifest, ContractMethod, ContractParameterType, ContractPermission,
    PermissionDescriptor, WildcardContainer,
};
use neo3_contract::native::{self, contract_management};
use neo3_contract::{
    contract_hash, ApplicationEngine, CallFlags, ContainerRef, NefFile, TriggerType,
};
use neo3_core::{Signer, Transaction, TransactionBuilder, UInt160};
use neo3_io::SerializableExt;
use neo3_persistence::{CacheBackend, DataCache, MemoryStore, SnapshotBackend, Store};
use neo3_vm::{OpCode, ScriptBuilder, StackItem, VMState};
use std::sync::Arc;

const TEST_GAS: i64 = 2_000_0000_0000;

fn fresh_snapshot() -> Arc<DataCache> {
    let store = MemoryStore::new();
    let backend = Arc::new(SnapshotBackend::new(store.snapshot()));
    Arc::new(DataCache::new(backend as Arc<dyn CacheBackend>))
}

fn settings() -> Arc<ProtocolSettings> {
    Arc::new(ProtocolSettings::default())
}

fn genesis(snapshot: &Arc<DataCache>, settings: &Arc<ProtocolSettings>) {
    let mut engine = ApplicationEngine::new(
        TriggerType::OnPersist,
        ContainerRef::None,
        Arc::clone(snapshot),
        None,
        Arc::clone(settings),
        -1,
    );
    engine.initialize_genesis().expect("genesis initialization");
}

fn deploy_tx(sender: UInt160) -> Arc<Transaction> {
    Arc::new(
        TransactionBuilder::new()
            .nonce(1)
            .valid_until_block(100)
            .signer(Signer::called_by_entry(sender))
            .script(vec![OpCode::Push1 as u8])
            .build()
            .expect("valid transaction"),
    )
}

fn app_engine(
    snapshot: &Arc<DataCache>,
    settings: &Arc<ProtocolSettings>,
    container: ContainerRef,
) -> ApplicationEngine {
    ApplicationEngine::new(
        TriggerType::Application,
        container,
        Arc::clone(snapshot),
        None,
        Arc::clone(settings),
        TEST_GAS,
    )
}

fn simple_manifest(name: &str, methods: Vec<ContractMethod>) -> ContractManifest {
    ContractManifest::new(
        name,
        ContractAbi {
            methods,
            events: Vec::new(),
        },
    )
}

fn method(name: &str, offset: u32, safe: bool) -> ContractMethod {
    ContractMethod {
        name: name.into(),
        parameters: Vec::new(),
        return_type: ContractParameterType::Any,
        offset,
        safe,
    }
}

/// Deploys a contract through the ContractManagement native and returns its
/// state.
fn deploy(
    snapshot: &Arc<DataCache>,
    settings: &Arc<ProtocolSettings>,
    sender: UInt160,
    nef: &NefFile,
    manifest: &ContractManifest,
) -> neo3_contract::ContractState {
    let management = native::contract_state_by_id(contract_management::ID).expect("native state");
    let mut engine = app_engine(snapshot, settings, ContainerRef::Transaction(deploy_tx(sender)));
    engine
        .load_contract(
            &management,
            "deploy",
            vec![
                StackItem::from_bytes(nef.to_array()),
                StackItem::from_bytes(manifest.to_json().into_bytes()),
                StackItem::Null,
            ],
            CallFlags::ALL,
        )
        .expect("load deploy");
    let state = engine.execute();
    assert_eq!(state, VMState::Halt, "deploy faulted: {:?}", engine.fault_message());
    let expected = contract_hash(&sender, nef.checksum, &manifest.name);
    contract_management::get_contract(snapshot, &expected).expect("contract stored")
}

// ---- S1: deploy then call ----

#[test]
fn deploy_then_call_halts_with_result_one() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let sender = UInt160::from_script(b"deployer");
    let nef = NefFile::new("test-compiler", vec![OpCode::Push1 as u8, OpCode::Ret as u8]).unwrap();
    let manifest = simple_manifest("sample", vec![method("test", 0, true)]);

    let contract = deploy(&snapshot, &settings, sender, &nef, &manifest);
    assert_eq!(contract.hash, contract_hash(&sender, nef.checksum, "sample"));
    assert_eq!(contract.update_counter, 0);

    // The Deploy notification fired exactly once (checked via a fresh engine
    // to keep the assertion simple: the deployed state is what matters).
    let mut engine = app_engine(&snapshot, &settings, ContainerRef::None);
    engine
        .load_contract(&contract, "test", Vec::new(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    let result = engine.result_stack().peek(0).unwrap().to_integer().unwrap();
    assert_eq!(result, 1.into());
}

#[test]
fn deploy_emits_exactly_one_deploy_notification() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let sender = UInt160::from_script(b"deployer");
    let nef = NefFile::new("test-compiler", vec![OpCode::Push1 as u8, OpCode::Ret as u8]).unwrap();
    let manifest = simple_manifest("sample2", vec![method("test", 0, true)]);

    let management = native::contract_state_by_id(contract_management::ID).unwrap();
    let mut engine = app_engine(&snapshot, &settings, ContainerRef::Transaction(deploy_tx(sender)));
    engine
        .load_contract(
            &management,
            "deploy",
            vec![
                StackItem::from_bytes(nef.to_array()),
                StackItem::from_bytes(manifest.to_json().into_bytes()),
                StackItem::Null,
            ],
            CallFlags::ALL,
        )
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    let deploy_events = engine
        .notifications()
        .iter()
        .filter(|event| event.event_name == "Deploy")
        .count();
    assert_eq!(deploy_events, 1);
}

// ---- S2: cross-contract permission denial ----

#[test]
fn call_without_permission_faults_with_descriptive_message() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let sender = UInt160::from_script(b"deployer");

    // Callee B exposes `test` (offset 0) and `disallowed` (offset 2).
    let callee_nef = NefFile::new(
        "test-compiler",
        vec![
            OpCode::Push1 as u8,
            OpCode::Ret as u8,
            OpCode::Push2 as u8,
            OpCode::Ret as u8,
        ],
    )
    .unwrap();
    let callee_manifest = simple_manifest(
        "callee",
        vec![method("test", 0, true), method("disallowed", 2, true)],
    );
    let callee = deploy(&snapshot, &settings, sender, &callee_nef, &callee_manifest);

    // Caller A may only call `test` on B.
    let mut caller_script = ScriptBuilder::new();
    caller_script.emit(OpCode::NewArray0);
    caller_script.emit_push_int(CallFlags::ALL.bits() as i64);
    caller_script.emit_push_string("disallowed");
    caller_script.emit_push_bytes(&callee.hash.to_array());
    caller_script.emit_syscall(neo3_contract::interop::syscall_hash("System.Contract.Call"));
    caller_script.emit(OpCode::Ret);
    let caller_nef = NefFile::new("test-compiler", caller_script.into_bytes()).unwrap();
    let mut caller_manifest = simple_manifest("caller", vec![method("run", 0, false)]);
    caller_manifest.permissions = vec![ContractPermission {
        contract: PermissionDescriptor::Hash(callee.hash),
        methods: WildcardContainer::List(vec!["test".into()]),
    }];
    let caller = deploy(&snapshot, &settings, sender, &caller_nef, &caller_manifest);

    let mut engine = app_engine(&snapshot, &settings, ContainerRef::None);
    engine
        .load_contract(&caller, "run", Vec::new(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    let message = engine.fault_message().unwrap_or_default().to_string();
    assert!(
        message.contains(&format!(
            "Cannot Call Method disallowed Of Contract {}",
            callee.hash
        )),
        "unexpected fault message: {message}"
    );
}

#[test]
fn permitted_cross_contract_call_succeeds() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let sender = UInt160::from_script(b"deployer");
    let callee_nef =
        NefFile::new("test-compiler", vec![OpCode::Push1 as u8, OpCode::Ret as u8]).unwrap();
    let callee = deploy(
        &snapshot,
        &settings,
        sender,
        &callee_nef,
        &simple_manifest("callee2", vec![method("test", 0, true)]),
    );

    let mut caller_script = ScriptBuilder::new();
    caller_script.emit(OpCode::NewArray0);
    caller_script.emit_push_int(CallFlags::ALL.bits() as i64);
    caller_script.emit_push_string("test");
    caller_script.emit_push_bytes(&callee.hash.to_array());
    caller_script.emit_syscall(neo3_contract::interop::syscall_hash("System.Contract.Call"));
    caller_script.emit(OpCode::Ret);
    let caller_nef = NefFile::new("test-compiler", caller_script.into_bytes()).unwrap();
    let mut caller_manifest = simple_manifest("caller2", vec![method("run", 0, false)]);
    caller_manifest.permissions = vec![ContractPermission {
        contract: PermissionDescriptor::Hash(callee.hash),
        methods: WildcardContainer::List(vec!["test".into()]),
    }];
    let caller = deploy(&snapshot, &settings, sender, &caller_nef, &caller_manifest);

    let mut engine = app_engine(&snapshot, &settings, ContainerRef::None);
    engine
        .load_contract(&caller, "run", Vec::new(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt, "{:?}", engine.fault_message());
    let result = engine.result_stack().peek(0).unwrap().to_integer().unwrap();
    assert_eq!(result, 1.into());
}

// ---- witness scopes ----

#[test]
fn check_witness_honors_called_by_entry_scope() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let account = UInt160::from_script(b"signer-account");
    let tx = Arc::new(
        TransactionBuilder::new()
            .valid_until_block(10)
            .signer(Signer::called_by_entry(account))
            .script(vec![OpCode::Push1 as u8])
            .build()
            .unwrap(),
    );

    let mut engine = app_engine(&snapshot, &settings, ContainerRef::Transaction(tx));
    engine.load_entry_script(&[OpCode::Push1 as u8]).unwrap();
    // In the entry context the CalledByEntry scope admits the signer.
    assert!(engine.check_witness(&account).unwrap());
    assert!(!engine.check_witness(&UInt160::from_script(b"other")).unwrap());
}

// ---- policy knobs reach the engine ----

#[test]
fn exec_fee_factor_scales_gas_consumption() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let mut engine = app_engine(&snapshot, &settings, ContainerRef::None);
    engine.load_entry_script(&[OpCode::Push1 as u8, OpCode::Ret as u8]).unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    let consumed = engine.gas_consumed();
    // PUSH1 costs 1 and RET 0, scaled by the default factor of 30.
    assert_eq!(consumed, 30);
}

#[test]
fn gas_exhaustion_faults_the_engine() {
    let snapshot = fresh_snapshot();
    let settings = settings();
    genesis(&snapshot, &settings);

    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        ContainerRef::None,
        Arc::clone(&snapshot),
        None,
        Arc::clone(&settings),
        10, // far below one instruction at factor 30
    );
    engine.load_entry_script(&[OpCode::Push1 as u8, OpCode::Ret as u8]).unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
}
