//! End-to-end tests of the mempool and the persist pipeline.

use neo3_config::ProtocolSettings;
use neo3_contract::native::{fungible, gas_token, ledger as ledger_native, oracle};
use neo3_contract::{Interoperable, TriggerType};
use neo3_core::{
    Block, Header, OracleResponseCode, Signer, Transaction, TransactionAttribute,
    TransactionBuilder, UInt160, UInt256, Verifiable, Witness,
};
use neo3_crypto::KeyPair;
use neo3_ledger::{
    Blockchain, MemoryPool, TransactionRemovalReason, VerifyResult,
};
use neo3_persistence::{CacheBackend, DataCache, MemoryStore, SnapshotBackend, Store};
use neo3_vm::{signature_contract_script, OpCode, VMState};
use num_bigint::BigInt;
use std::sync::Arc;

const GAS: i64 = 1_0000_0000;

/// Routes the pool's and persist pipeline's tracing output through the
/// test harness; honors `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn settings() -> Arc<ProtocolSettings> {
    Arc::new(ProtocolSettings::default())
}

fn cache_over(store: &Arc<MemoryStore>) -> Arc<DataCache> {
    let backend = Arc::new(SnapshotBackend::new(store.snapshot()));
    Arc::new(DataCache::new(backend as Arc<dyn CacheBackend>))
}

fn fund(store: &Arc<MemoryStore>, account: &UInt160, datoshi: i64) {
    let state = gas_token::GasAccountState {
        balance: BigInt::from(datoshi),
    };
    let key = fungible::account_key(gas_token::ID, account);
    store.put(&key.to_bytes(), state.to_storage_item().unwrap().value());
}

struct TestSigner {
    pair: KeyPair,
    account: UInt160,
    verification: Vec<u8>,
}

impl TestSigner {
    fn new() -> Self {
        let pair = KeyPair::generate();
        let verification = signature_contract_script(&pair.public_key().encode_compressed());
        let account = UInt160::from_script(&verification);
        Self {
            pair,
            account,
            verification,
        }
    }

    fn sign(&self, tx: &mut Transaction, network: u32) {
        let signature = self.pair.sign(&tx.sign_data(network)).unwrap();
        let mut invocation = vec![OpCode::PushData1 as u8, 64];
        invocation.extend_from_slice(&signature);
        tx.set_witnesses(vec![Witness::new(invocation, self.verification.clone())]);
    }
}

fn build_tx(
    signer: &TestSigner,
    settings: &ProtocolSettings,
    nonce: u32,
    system_fee: i64,
    network_fee: i64,
    attributes: Vec<TransactionAttribute>,
) -> Arc<Transaction> {
    let mut builder = TransactionBuilder::new()
        .nonce(nonce)
        .system_fee(system_fee)
        .network_fee(network_fee)
        .valid_until_block(100)
        .signer(Signer::called_by_entry(signer.account))
        .script(vec![OpCode::Push1 as u8]);
    for attribute in attributes {
        builder = builder.attribute(attribute);
    }
    let mut tx = builder.build().unwrap();
    signer.sign(&mut tx, settings.network);
    Arc::new(tx)
}

// ---- S3: oracle-response uniqueness in the pool ----

#[test]
fn second_oracle_response_with_same_id_is_rejected() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 100 * GAS);

    let snapshot = cache_over(&store);
    oracle::store_request(
        &snapshot,
        1,
        &oracle::OracleRequest {
            original_tx_hash: UInt256::digest(b"request-tx"),
            gas_for_response: GAS,
            url: "https://example.org/data".into(),
            filter: None,
            callback_contract: UInt160::from_script(b"callback"),
            callback_method: "onOracle".into(),
            user_data: Vec::new(),
        },
    )
    .unwrap();

    let response = |nonce| {
        build_tx(
            &signer,
            &settings,
            nonce,
            GAS,
            GAS,
            vec![TransactionAttribute::OracleResponse {
                id: 1,
                code: OracleResponseCode::Success,
                result: vec![0x01],
            }],
        )
    };

    let pool = MemoryPool::new(Arc::clone(&settings));
    assert_eq!(pool.try_add(response(1), &snapshot), VerifyResult::Succeed);
    assert_eq!(
        pool.try_add(response(2), &snapshot),
        VerifyResult::InvalidAttribute
    );
    assert_eq!(pool.len(), 1);
}

// ---- S4: sender fee accounting with conflict replacement ----

#[test]
fn sender_fees_cap_admissions_until_a_conflict_frees_room() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 7 * GAS);
    let snapshot = cache_over(&store);

    let pool = MemoryPool::new(Arc::clone(&settings));
    // Two transactions costing 3 GAS each fit in a 7 GAS balance.
    let tx1 = build_tx(&signer, &settings, 1, GAS, 2 * GAS, vec![]);
    let tx2 = build_tx(&signer, &settings, 2, GAS, 2 * GAS, vec![]);
    assert_eq!(pool.try_add(Arc::clone(&tx1), &snapshot), VerifyResult::Succeed);
    assert_eq!(pool.try_add(Arc::clone(&tx2), &snapshot), VerifyResult::Succeed);

    // A third one does not.
    let tx3 = build_tx(&signer, &settings, 3, GAS, 2 * GAS, vec![]);
    assert_eq!(
        pool.try_add(Arc::clone(&tx3), &snapshot),
        VerifyResult::InsufficientFunds
    );

    // Declaring a conflict with a pooled transaction (and outbidding it)
    // frees its fees and displaces it.
    let removed: Arc<parking_lot::Mutex<Vec<TransactionRemovalReason>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let removed_sink = Arc::clone(&removed);
    pool.on_transaction_removed(move |event| {
        removed_sink.lock().push(event.reason);
    });

    let tx4 = build_tx(
        &signer,
        &settings,
        4,
        GAS,
        3 * GAS, // higher priority than tx1
        vec![TransactionAttribute::Conflicts { hash: tx1.hash() }],
    );
    assert_eq!(pool.try_add(Arc::clone(&tx4), &snapshot), VerifyResult::Succeed);
    assert!(!pool.contains_key(&tx1.hash()));
    assert!(pool.contains_key(&tx2.hash()));
    assert!(pool.contains_key(&tx4.hash()));
    assert!(removed
        .lock()
        .contains(&TransactionRemovalReason::Conflict));
}

#[test]
fn lower_priority_conflict_is_rejected() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 100 * GAS);
    let snapshot = cache_over(&store);

    let pool = MemoryPool::new(Arc::clone(&settings));
    let resident = build_tx(&signer, &settings, 1, GAS, 3 * GAS, vec![]);
    assert_eq!(
        pool.try_add(Arc::clone(&resident), &snapshot),
        VerifyResult::Succeed
    );
    let challenger = build_tx(
        &signer,
        &settings,
        2,
        GAS,
        2 * GAS, // cheaper than the resident
        vec![TransactionAttribute::Conflicts {
            hash: resident.hash(),
        }],
    );
    assert_eq!(
        pool.try_add(challenger, &snapshot),
        VerifyResult::HasConflicts
    );
    assert_eq!(pool.len(), 1);
}

// ---- capacity eviction ----

#[test]
fn pool_evicts_the_minimum_priority_transaction_at_capacity() {
    init_tracing();
    let mut protocol = ProtocolSettings::default();
    protocol.memory_pool_max_transactions = 2;
    let settings = Arc::new(protocol);
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 1000 * GAS);
    let snapshot = cache_over(&store);

    let pool = MemoryPool::new(Arc::clone(&settings));
    let cheap = build_tx(&signer, &settings, 1, GAS, 2 * GAS, vec![]);
    let mid = build_tx(&signer, &settings, 2, GAS, 3 * GAS, vec![]);
    let rich = build_tx(&signer, &settings, 3, GAS, 4 * GAS, vec![]);
    assert_eq!(pool.try_add(Arc::clone(&cheap), &snapshot), VerifyResult::Succeed);
    assert_eq!(pool.try_add(Arc::clone(&mid), &snapshot), VerifyResult::Succeed);
    assert_eq!(pool.try_add(Arc::clone(&rich), &snapshot), VerifyResult::Succeed);

    assert_eq!(pool.len(), 2);
    assert!(!pool.contains_key(&cheap.hash()));
    let sorted = pool.get_sorted_verified_transactions(10);
    assert_eq!(sorted[0].hash(), rich.hash());
}

// ---- S6 and the persist pipeline ----

fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let (cache, _) = chain.snapshot();
    let tip_hash = ledger_native::current_hash(&cache).unwrap();
    let tip = ledger_native::get_header(&cache, &tip_hash).unwrap();
    let header = Header::new(
        0,
        tip_hash,
        Block::merkle_root_of(&transactions),
        tip.timestamp + 15_000,
        7,
        tip.index + 1,
        0,
        tip.next_consensus,
        Witness::new(Vec::new(), vec![OpCode::Push1 as u8]),
    );
    Block::new(header, transactions)
}

#[test]
fn genesis_persists_and_seeds_native_state() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let chain = Blockchain::new(store as Arc<dyn Store>, settings).unwrap();
    assert_eq!(chain.height(), Some(0));
    let (cache, _) = chain.snapshot();
    // The premined supply landed on the standby validators' BFT address;
    // the genesis PostPersist additionally minted the committee reward.
    let bft = neo3_contract::native::neo_token::genesis_bft_address(chain.settings()).unwrap();
    assert_eq!(
        gas_token::balance_of(&cache, &bft),
        BigInt::from(chain.settings().initial_gas_distribution)
    );
    let total_gas = fungible::total_supply(&cache, gas_token::ID);
    assert!(total_gas >= BigInt::from(chain.settings().initial_gas_distribution));
}

#[test]
fn faulted_transaction_still_burns_fees_and_is_indexed() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 100 * GAS);
    let chain = Blockchain::new(Arc::clone(&store) as Arc<dyn Store>, settings.clone()).unwrap();

    // A script that divides by zero after some work.
    let mut tx = TransactionBuilder::new()
        .nonce(11)
        .system_fee(GAS)
        .network_fee(GAS / 2)
        .valid_until_block(10)
        .signer(Signer::called_by_entry(signer.account))
        .script(vec![OpCode::Push1 as u8, OpCode::Push0 as u8, OpCode::Div as u8])
        .build()
        .unwrap();
    signer.sign(&mut tx, settings.network);
    let tx_hash = tx.hash();

    let balance_before = {
        let (cache, _) = chain.snapshot();
        gas_token::balance_of(&cache, &signer.account)
    };

    let block = next_block(&chain, vec![tx]);
    let executions = chain.persist(&block).unwrap();

    // OnPersist + tx + PostPersist.
    assert_eq!(executions.len(), 3);
    let tx_execution = &executions[1];
    assert_eq!(tx_execution.trigger, TriggerType::Application);
    assert_eq!(tx_execution.vm_state, VMState::Fault);
    assert!(tx_execution.notifications.is_empty());

    let (cache, _) = chain.snapshot();
    // Fees burned although the script faulted.
    let balance_after = gas_token::balance_of(&cache, &signer.account);
    assert_eq!(balance_before - balance_after, BigInt::from(GAS + GAS / 2));
    // The transaction is indexed with its fault state.
    assert!(ledger_native::contains_transaction(&cache, &tx_hash));
}

#[test]
fn persisted_transactions_leave_the_pool() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let signer = TestSigner::new();
    fund(&store, &signer.account, 100 * GAS);
    let chain = Blockchain::new(Arc::clone(&store) as Arc<dyn Store>, settings.clone()).unwrap();

    let pool = MemoryPool::new(Arc::clone(&settings));
    let (cache, _) = chain.snapshot();
    let tx1 = build_tx(&signer, &settings, 21, GAS, 2 * GAS, vec![]);
    let tx2 = build_tx(&signer, &settings, 22, GAS, 2 * GAS, vec![]);
    assert_eq!(pool.try_add(Arc::clone(&tx1), &cache), VerifyResult::Succeed);
    assert_eq!(pool.try_add(Arc::clone(&tx2), &cache), VerifyResult::Succeed);

    let block = next_block(&chain, vec![(*tx1).clone()]);
    chain.persist(&block).unwrap();

    let (fresh, _) = chain.snapshot();
    pool.update_pool_for_block_persisted(&block, &fresh);
    assert!(!pool.contains_key(&tx1.hash()));
    // The survivor re-verified against the new snapshot.
    assert!(pool.contains_key(&tx2.hash()));
    assert_eq!(pool.verified_count(), 1);
}

#[test]
fn block_verification_checks_linkage() {
    init_tracing();
    let settings = settings();
    let store = Arc::new(MemoryStore::new());
    let chain = Blockchain::new(store as Arc<dyn Store>, settings).unwrap();

    // Structurally linked block: every check up to the consensus witness
    // passes, and the witness itself cannot be produced in a unit test.
    let good = next_block(&chain, Vec::new());
    assert_eq!(chain.verify_block(&good), VerifyResult::InvalidSignature);

    let mut wrong_prev = good.clone();
    wrong_prev.header.prev_hash = UInt256::digest(b"fork");
    assert_eq!(chain.verify_block(&wrong_prev), VerifyResult::Invalid);

    let mut stale_time = good.clone();
    stale_time.header.timestamp = 0;
    assert_eq!(chain.verify_block(&stale_time), VerifyResult::Invalid);
}
