// Copyright (C) 2015-2025 The Neo Project.
//
// context.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! Per-round consensus state and the quorum arithmetic.

use crate::message::{
    ChangeViewCompact, Commit, CommitCompact, ConsensusMessage, ConsensusPayload,
    PreparationCompact, PrepareRequest, RecoveryMessage, CONSENSUS_CATEGORY,
};
use crate::ConsensusResult;
use neo3_config::{ProtocolSettings, MAX_BLOCK_SIZE, MAX_BLOCK_SYSTEM_FEE};
use neo3_core::{Block, ExtensiblePayload, Header, Transaction, UInt160, UInt256, Witness};
use neo3_crypto::ECPoint;
use neo3_io::SerializableExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Signs consensus payloads and block headers for this node's validator key.
///
/// Key storage is outside the core; the service only needs these two
/// operations.
pub trait ConsensusSigner: Send + Sync {
    fn public_key(&self) -> ECPoint;
    fn sign(&self, data: &[u8]) -> Option<[u8; 64]>;
}

/// The state a validator accumulates for one block height.
pub struct ConsensusContext {
    pub settings: Arc<ProtocolSettings>,
    pub validators: Vec<ECPoint>,
    /// This node's validator index, if it participates.
    pub my_index: Option<u8>,
    pub block_index: u32,
    pub view_number: u8,
    pub prev_hash: UInt256,
    pub prev_timestamp: u64,
    pub next_consensus: UInt160,

    // Proposal under construction / under vote.
    pub timestamp: u64,
    pub nonce: u64,
    pub transaction_hashes: Vec<UInt256>,
    pub transactions: HashMap<UInt256, Transaction>,
    /// Hash of the accepted prepare-request payload.
    pub preparation_hash: Option<UInt256>,

    // Per-validator evidence for the current view.
    pub preparations: Vec<Option<UInt256>>,
    pub commits: Vec<Option<[u8; 64]>>,
    pub change_views: Vec<Option<ChangeViewCompact>>,
    /// The last view each validator was seen in.
    pub last_seen_view: Vec<u8>,

    pub request_sent_or_received: bool,
    pub response_sent: bool,
    pub commit_sent: bool,
    pub block_sent: bool,
}

impl ConsensusContext {
    pub fn new(
        settings: Arc<ProtocolSettings>,
        validators: Vec<ECPoint>,
        my_key: Option<&ECPoint>,
        block_index: u32,
        prev_hash: UInt256,
        prev_timestamp: u64,
        next_consensus: UInt160,
    ) -> Self {
        let my_index = my_key.and_then(|key| {
            validators
                .iter()
                .position(|validator| validator == key)
                .map(|index| index as u8)
        });
        let count = validators.len();
        Self {
            settings,
            validators,
            my_index,
            block_index,
            view_number: 0,
            prev_hash,
            prev_timestamp,
            next_consensus,
            timestamp: 0,
            nonce: 0,
            transaction_hashes: Vec::new(),
            transactions: HashMap::new(),
            preparation_hash: None,
            preparations: vec![None; count],
            commits: vec![None; count],
            change_views: vec![None; count],
            last_seen_view: vec![0; count],
            request_sent_or_received: false,
            response_sent: false,
            commit_sent: false,
            block_sent: false,
        }
    }

    /// Validator count.
    pub fn n(&self) -> usize {
        self.validators.len()
    }

    /// Byzantine tolerance: at most `f` faulty validators.
    pub fn f(&self) -> usize {
        (self.n() - 1) / 3
    }

    /// Quorum: messages from `m` validators carry a decision.
    pub fn m(&self) -> usize {
        self.n() - self.f()
    }

    /// The primary of `view`: rotates backwards through the validators as
    /// views fail.
    pub fn primary_index(&self, view: u8) -> u8 {
        let n = self.n() as i64;
        (((self.block_index as i64 - view as i64) % n + n) % n) as u8
    }

    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index(self.view_number))
    }

    pub fn is_backup(&self) -> bool {
        self.my_index.is_some() && !self.is_primary()
    }

    /// Resets per-view evidence, keeping cross-view commit locks.
    pub fn reset(&mut self, view_number: u8) {
        self.view_number = view_number;
        self.timestamp = 0;
        self.nonce = 0;
        self.transaction_hashes.clear();
        self.transactions.clear();
        self.preparation_hash = None;
        for slot in &mut self.preparations {
            *slot = None;
        }
        // Commits survive view changes: a committed node is locked.
        if !self.commit_sent {
            for slot in &mut self.commits {
                *slot = None;
            }
        }
        for slot in &mut self.change_views {
            *slot = None;
        }
        self.request_sent_or_received = false;
        self.response_sent = false;
        if let Some(my_index) = self.my_index {
            if self.last_seen_view[my_index as usize] < view_number {
                self.last_seen_view[my_index as usize] = view_number;
            }
        }
    }

    pub fn count_preparations(&self) -> usize {
        self.preparations.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn count_commits(&self) -> usize {
        self.commits.iter().filter(|slot| slot.is_some()).count()
    }

    /// Validators asking for `view` or later.
    pub fn count_change_views(&self, view: u8) -> usize {
        self.change_views
            .iter()
            .flatten()
            .filter(|compact| compact.original_view_number >= view)
            .count()
    }

    /// Whether enough preparations agree to commit.
    pub fn preparations_reached_quorum(&self) -> bool {
        self.request_sent_or_received && self.count_preparations() >= self.m()
    }

    pub fn commits_reached_quorum(&self) -> bool {
        self.count_commits() >= self.m()
    }

    /// Selects transactions for a proposal under the block caps, stopping at
    /// the first overflow.
    pub fn select_transactions(&self, candidates: &[Arc<Transaction>]) -> Vec<Arc<Transaction>> {
        let mut selected = Vec::new();
        let mut total_size = 0usize;
        let mut total_system_fee = 0i64;
        for tx in candidates {
            if selected.len() as u32 >= self.settings.max_transactions_per_block {
                break;
            }
            let size = tx.size();
            let system_fee = tx.system_fee();
            if total_size + size > MAX_BLOCK_SIZE
                || total_system_fee.saturating_add(system_fee) > MAX_BLOCK_SYSTEM_FEE
            {
                break;
            }
            total_size += size;
            total_system_fee += system_fee;
            selected.push(Arc::clone(tx));
        }
        selected
    }

    /// The header of the block under vote.
    pub fn make_header(&self) -> Header {
        let leaves: Vec<[u8; 32]> = self
            .transaction_hashes
            .iter()
            .map(|hash| hash.to_array())
            .collect();
        Header::new(
            0,
            self.prev_hash,
            UInt256::from(neo3_crypto::MerkleTree::compute_root(&leaves)),
            self.timestamp,
            self.nonce,
            self.block_index,
            self.primary_index(self.view_number),
            self.next_consensus,
            Witness::empty(),
        )
    }

    /// Assembles the block once every transaction is available.
    pub fn create_block(&self, witness: Witness) -> Option<Block> {
        let mut header = self.make_header();
        header.witness = witness;
        let transactions: Option<Vec<Transaction>> = self
            .transaction_hashes
            .iter()
            .map(|hash| self.transactions.get(hash).cloned())
            .collect();
        Some(Block::new(header, transactions?))
    }

    /// Wraps a message in a signed extensible payload from this validator.
    pub fn make_payload(
        &self,
        signer: &dyn ConsensusSigner,
        payload: ConsensusPayload,
    ) -> ConsensusResult<ExtensiblePayload> {
        let my_index = self.my_index.ok_or(crate::ConsensusError::NotValidator)?;
        let message = ConsensusMessage {
            block_index: self.block_index,
            validator_index: my_index,
            view_number: self.view_number,
            payload,
        };
        let sender = validator_account(&self.validators[my_index as usize]);
        let mut extensible = ExtensiblePayload::new(
            CONSENSUS_CATEGORY,
            self.block_index,
            self.block_index + 1,
            sender,
            message.to_array(),
            Witness::empty(),
        );
        let signature = signer
            .sign(&neo3_core::Verifiable::sign_data(
                &extensible,
                self.settings.network,
            ))
            .ok_or(crate::ConsensusError::SigningFailed)?;
        let mut invocation = vec![neo3_vm::OpCode::PushData1 as u8, 64];
        invocation.extend_from_slice(&signature);
        extensible.witness = Witness::new(
            invocation,
            neo3_vm::signature_contract_script(
                &self.validators[my_index as usize].encode_compressed(),
            ),
        );
        Ok(extensible)
    }

    /// The recovery bundle describing everything seen this view.
    pub fn make_recovery_message(&self) -> RecoveryMessage {
        let change_view_messages = self.change_views.iter().flatten().cloned().collect();
        let preparation_messages = self
            .preparations
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| PreparationCompact {
                validator_index: index as u8,
            })
            .collect();
        let commit_messages = self
            .commits
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|signature| CommitCompact {
                    view_number: self.view_number,
                    validator_index: index as u8,
                    signature,
                })
            })
            .collect();
        let prepare_request = self.request_sent_or_received.then(|| PrepareRequest {
            version: 0,
            prev_hash: self.prev_hash,
            timestamp: self.timestamp,
            nonce: self.nonce,
            transaction_hashes: self.transaction_hashes.clone(),
        });
        RecoveryMessage {
            change_view_messages,
            prepare_request,
            preparation_hash: if self.request_sent_or_received {
                None
            } else {
                self.preparation_hash
            },
            preparation_messages,
            commit_messages,
        }
    }

    /// Records a commit signature, ignoring duplicates.
    pub fn record_commit(&mut self, validator_index: u8, commit: &Commit) {
        if let Some(slot) = self.commits.get_mut(validator_index as usize) {
            if slot.is_none() {
                *slot = Some(commit.signature);
            }
        }
    }
}

/// The single-signature account of a validator key.
pub fn validator_account(pubkey: &ECPoint) -> UInt160 {
    UInt160::from_script(&neo3_vm::signature_contract_script(
        &pubkey.encode_compressed(),
    ))
}
