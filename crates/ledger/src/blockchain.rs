// Copyright (C) 2015-2025 The Neo Project.
//
// blockchain.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! Block application: the OnPersist → transactions → PostPersist pipeline.

use crate::{LedgerError, LedgerResult, VerifyResult};
use neo3_config::ProtocolSettings;
use neo3_contract::interop::syscall_hash;
use neo3_contract::native::{ledger as ledger_native, neo_token};
use neo3_contract::{
    ApplicationEngine, ContainerRef, NotifyEventArgs, TriggerType,
};
use neo3_core::{Block, Header, Transaction, UInt160, UInt256, Witness};
use neo3_persistence::{CacheBackend, DataCache, SnapshotBackend, Store};
use neo3_vm::{OpCode, ScriptBuilder, StackItem, VMState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Timestamp of the genesis block, in milliseconds: 2016-07-15T15:08:21Z.
pub const GENESIS_TIMESTAMP: u64 = 1_468_595_301_000;

const GENESIS_NONCE: u64 = 2_083_236_893;

/// Everything observed while one script executed during persist.
pub struct ApplicationExecuted {
    /// The transaction, absent for OnPersist/PostPersist executions.
    pub transaction: Option<Arc<Transaction>>,
    pub trigger: TriggerType,
    pub vm_state: VMState,
    pub gas_consumed: i64,
    /// Fault description, if the execution faulted.
    pub exception: Option<String>,
    pub stack: Vec<StackItem>,
    pub notifications: Vec<NotifyEventArgs>,
}

/// The chain state machine: verifies and applies blocks to the store.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: Arc<ProtocolSettings>,
}

impl Blockchain {
    /// Opens a chain over `store`, persisting the genesis block if the store
    /// is empty.
    pub fn new(store: Arc<dyn Store>, settings: Arc<ProtocolSettings>) -> LedgerResult<Self> {
        let chain = Self { store, settings };
        if chain.height().is_none() {
            let genesis = chain.genesis_block()?;
            info!(hash = %genesis.hash(), "persisting genesis block");
            chain.persist(&genesis)?;
        }
        Ok(chain)
    }

    pub fn settings(&self) -> &Arc<ProtocolSettings> {
        &self.settings
    }

    /// A fresh read/write cache over the current store state.
    pub fn snapshot(&self) -> (Arc<DataCache>, Arc<SnapshotBackend>) {
        let backend = Arc::new(SnapshotBackend::new(self.store.snapshot()));
        let cache = Arc::new(DataCache::new(
            Arc::clone(&backend) as Arc<dyn CacheBackend>
        ));
        (cache, backend)
    }

    /// The current block height, if any block has persisted.
    pub fn height(&self) -> Option<u32> {
        let (cache, _) = self.snapshot();
        ledger_native::current_index(&cache)
    }

    /// The hash of the chain tip.
    pub fn best_block_hash(&self) -> Option<UInt256> {
        let (cache, _) = self.snapshot();
        ledger_native::current_hash(&cache)
    }

    /// The deterministic first block of the chain.
    pub fn genesis_block(&self) -> LedgerResult<Block> {
        let next_consensus = neo_token::genesis_bft_address(&self.settings)
            .map_err(|e| LedgerError::InvariantViolation(e.to_string()))?;
        Ok(Block::new(
            Header::new(
                0,
                UInt256::ZERO,
                UInt256::ZERO,
                GENESIS_TIMESTAMP,
                GENESIS_NONCE,
                0,
                0,
                next_consensus,
                Witness::new(Vec::new(), vec![OpCode::Push1 as u8]),
            ),
            Vec::new(),
        ))
    }

    /// Structural and contextual block verification against the tip.
    pub fn verify_block(&self, block: &Block) -> VerifyResult {
        let (cache, _) = self.snapshot();
        match ledger_native::current_index(&cache) {
            None => {
                if block.index() != 0 {
                    return VerifyResult::Invalid;
                }
            }
            Some(current) => {
                if block.index() != current + 1 {
                    return VerifyResult::Invalid;
                }
                let Some(tip_hash) = ledger_native::current_hash(&cache) else {
                    return VerifyResult::UnableToVerify;
                };
                if block.header.prev_hash != tip_hash {
                    return VerifyResult::Invalid;
                }
                let Some(tip) = ledger_native::get_header(&cache, &tip_hash) else {
                    return VerifyResult::UnableToVerify;
                };
                if block.timestamp() <= tip.timestamp {
                    return VerifyResult::Invalid;
                }
                let validators = match neo_token::next_block_validators(&cache, &self.settings) {
                    Ok(validators) => validators,
                    Err(_) => return VerifyResult::UnableToVerify,
                };
                if block.header.primary_index as usize >= validators.len() {
                    return VerifyResult::Invalid;
                }
                // The witness must come from the consensus address committed
                // to by the previous block.
                if block.header.witness.script_hash() != tip.next_consensus {
                    return VerifyResult::InvalidSignature;
                }
            }
        }
        if !block.verify_merkle_root() {
            return VerifyResult::Invalid;
        }
        VerifyResult::Succeed
    }

    /// Applies a block: system hooks, transactions, commit. Returns what
    /// every execution did.
    pub fn persist(&self, block: &Block) -> LedgerResult<Vec<ApplicationExecuted>> {
        let block = Arc::new(block.clone());
        let (cache, backend) = self.snapshot();
        let mut executions = Vec::with_capacity(block.transactions.len() + 2);

        if block.index() == 0 {
            // Genesis: bring the native contracts to life first.
            let mut engine = ApplicationEngine::new(
                TriggerType::OnPersist,
                ContainerRef::Block(Arc::clone(&block)),
                Arc::clone(&cache),
                Some(Arc::clone(&block)),
                Arc::clone(&self.settings),
                -1,
            );
            engine
                .initialize_genesis()
                .map_err(|e| LedgerError::InvariantViolation(e.to_string()))?;
        }

        // OnPersist: native bookkeeping before user code.
        executions.push(self.run_system_script(
            &block,
            &cache,
            TriggerType::OnPersist,
            "System.Contract.NativeOnPersist",
        )?);

        // Transactions apply in block order, each against its own overlay so
        // a FAULT discards its writes but never the fees already burned.
        for tx in &block.transactions {
            let tx = Arc::new(tx.clone());
            let tx_cache = Arc::new(cache.clone_cache());
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                ContainerRef::Transaction(Arc::clone(&tx)),
                Arc::clone(&tx_cache),
                Some(Arc::clone(&block)),
                Arc::clone(&self.settings),
                tx.system_fee(),
            );
            let vm_state = match engine.load_entry_script(tx.script()) {
                Ok(()) => engine.execute(),
                Err(_) => VMState::Fault,
            };
            match vm_state {
                VMState::Halt => {
                    tx_cache.commit();
                    debug!(hash = %tx.hash(), gas = engine.gas_consumed(), "transaction applied");
                }
                state => {
                    // Writes and notifications are dropped with the overlay.
                    warn!(hash = %tx.hash(), ?state, "transaction faulted during persist");
                }
            }
            ledger_native::update_transaction_state(&cache, &tx.hash(), vm_state_byte(vm_state));
            let notifications = if vm_state == VMState::Halt {
                engine.notifications().to_vec()
            } else {
                Vec::new()
            };
            executions.push(ApplicationExecuted {
                transaction: Some(tx),
                trigger: TriggerType::Application,
                vm_state,
                gas_consumed: engine.gas_consumed(),
                exception: engine.fault_message().map(str::to_string),
                stack: engine.result_stack().iter().cloned().collect(),
                notifications,
            });
        }

        // PostPersist: reward distribution after user code.
        executions.push(self.run_system_script(
            &block,
            &cache,
            TriggerType::PostPersist,
            "System.Contract.NativePostPersist",
        )?);

        cache.commit();
        backend.commit_to_store();
        info!(index = block.index(), hash = %block.hash(), "block persisted");
        Ok(executions)
    }

    fn run_system_script(
        &self,
        block: &Arc<Block>,
        cache: &Arc<DataCache>,
        trigger: TriggerType,
        syscall: &str,
    ) -> LedgerResult<ApplicationExecuted> {
        let mut builder = ScriptBuilder::new();
        builder.emit_syscall(syscall_hash(syscall));
        let script = builder.into_bytes();

        let mut engine = ApplicationEngine::new(
            trigger,
            ContainerRef::Block(Arc::clone(block)),
            Arc::clone(cache),
            Some(Arc::clone(block)),
            Arc::clone(&self.settings),
            -1,
        );
        engine
            .load_entry_script(&script)
            .map_err(|e| LedgerError::SystemFault(e.to_string()))?;
        let vm_state = engine.execute();
        if vm_state != VMState::Halt {
            // A faulting system hook leaves the chain in an undefined state;
            // this block cannot be applied.
            return Err(LedgerError::SystemFault(format!(
                "{syscall} faulted: {:?}",
                engine.fault_message()
            )));
        }
        Ok(ApplicationExecuted {
            transaction: None,
            trigger,
            vm_state,
            gas_consumed: engine.gas_consumed(),
            exception: None,
            stack: Vec::new(),
            notifications: engine.notifications().to_vec(),
        })
    }

    /// The consensus address for the next block.
    pub fn next_consensus_address(&self) -> LedgerResult<UInt160> {
        let (cache, _) = self.snapshot();
        let validators = neo_token::next_block_validators(&cache, &self.settings)
            .map_err(|e| LedgerError::InvariantViolation(e.to_string()))?;
        let threshold = validators.len() - (validators.len() - 1) / 3;
        let keys: Vec<[u8; 33]> = validators
            .iter()
            .map(|key| key.encode_compressed())
            .collect();
        let script = neo3_vm::multisig_contract_script(threshold, &keys).ok_or_else(|| {
            LedgerError::InvariantViolation("cannot build consensus script".into())
        })?;
        Ok(UInt160::from_script(&script))
    }
}

fn vm_state_byte(state: VMState) -> u8 {
    match state {
        VMState::None => 0,
        VMState::Halt => 1,
        VMState::Fault => 2,
        VMState::Break => 4,
    }
}
