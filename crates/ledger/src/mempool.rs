// Copyright (C) 2015-2025 The Neo Project.
//
// mempool.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The memory pool of unconfirmed transactions.

use crate::{verify_state_dependent, TransactionVerificationContext, VerifyResult};
use neo3_config::ProtocolSettings;
use neo3_contract::native::ledger as ledger_native;
use neo3_core::{Block, Transaction, TransactionAttribute, UInt256};
use neo3_persistence::DataCache;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Why a transaction left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionRemovalReason {
    /// Evicted to make room for higher-priority transactions.
    CapacityExceeded,
    /// Replaced by a conflicting transaction.
    Conflict,
    /// Failed re-verification after a block persisted.
    NoLongerValid,
}

/// Notification handed to pool observers when transactions leave.
#[derive(Debug, Clone)]
pub struct TransactionRemovedEvent {
    pub transactions: Vec<Arc<Transaction>>,
    pub reason: TransactionRemovalReason,
}

type RemovalObserver = Box<dyn Fn(&TransactionRemovedEvent) + Send + Sync>;

/// Priority key: ascending order puts the cheapest transaction first, so the
/// eviction victim is always the minimum element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    fee_per_byte: i64,
    network_fee: i64,
    hash: UInt256,
}

impl PoolKey {
    fn of(tx: &Transaction) -> PoolKey {
        PoolKey {
            fee_per_byte: tx.network_fee() / tx.size() as i64,
            network_fee: tx.network_fee(),
            hash: tx.hash(),
        }
    }
}

struct PoolInner {
    /// Verified transactions ordered by priority (lowest first).
    verified: BTreeMap<PoolKey, Arc<Transaction>>,
    /// Survivors of a block persist, pending re-verification, FIFO.
    unverified: VecDeque<Arc<Transaction>>,
    /// Every pooled hash, verified or not.
    by_hash: HashMap<UInt256, Arc<Transaction>>,
    /// Conflict target hash → pooled transactions declaring it.
    conflicts: HashMap<UInt256, HashSet<UInt256>>,
    context: TransactionVerificationContext,
}

impl PoolInner {
    fn register_conflicts(&mut self, tx: &Arc<Transaction>) {
        for attribute in tx.attributes() {
            if let TransactionAttribute::Conflicts { hash } = attribute {
                self.conflicts.entry(*hash).or_default().insert(tx.hash());
            }
        }
    }

    fn unregister_conflicts(&mut self, tx: &Transaction) {
        for attribute in tx.attributes() {
            if let TransactionAttribute::Conflicts { hash } = attribute {
                if let Some(set) = self.conflicts.get_mut(hash) {
                    set.remove(&tx.hash());
                    if set.is_empty() {
                        self.conflicts.remove(hash);
                    }
                }
            }
        }
    }

    fn remove_verified(&mut self, hash: &UInt256, snapshot: &Arc<DataCache>) -> Option<Arc<Transaction>> {
        let key = self
            .verified
            .iter()
            .find(|(_, tx)| &tx.hash() == hash)
            .map(|(key, _)| key.clone())?;
        let tx = self.verified.remove(&key)?;
        self.by_hash.remove(hash);
        self.context.remove_transaction(&tx, snapshot);
        self.unregister_conflicts(&tx);
        Some(tx)
    }
}

/// The shared pool of verified (and to-be-re-verified) transactions.
pub struct MemoryPool {
    capacity: usize,
    settings: Arc<ProtocolSettings>,
    inner: RwLock<PoolInner>,
    observers: RwLock<Vec<RemovalObserver>>,
}

impl MemoryPool {
    pub fn new(settings: Arc<ProtocolSettings>) -> Self {
        let capacity = settings.memory_pool_max_transactions;
        Self {
            capacity,
            settings,
            inner: RwLock::new(PoolInner {
                verified: BTreeMap::new(),
                unverified: VecDeque::new(),
                by_hash: HashMap::new(),
                conflicts: HashMap::new(),
                context: TransactionVerificationContext::new(),
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Registers an observer for removal events.
    pub fn on_transaction_removed(
        &self,
        observer: impl Fn(&TransactionRemovedEvent) + Send + Sync + 'static,
    ) {
        self.observers.write().push(Box::new(observer));
    }

    fn notify_removed(&self, transactions: Vec<Arc<Transaction>>, reason: TransactionRemovalReason) {
        if transactions.is_empty() {
            return;
        }
        let event = TransactionRemovedEvent {
            transactions,
            reason,
        };
        for observer in self.observers.read().iter() {
            observer(&event);
        }
    }

    /// Number of pooled transactions, verified plus unverified.
    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn verified_count(&self) -> usize {
        self.inner.read().verified.len()
    }

    pub fn contains_key(&self, hash: &UInt256) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    pub fn try_get(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        self.inner.read().by_hash.get(hash).cloned()
    }

    /// Every verified transaction, unordered.
    pub fn get_verified_transactions(&self) -> Vec<Arc<Transaction>> {
        self.inner.read().verified.values().cloned().collect()
    }

    /// The `count` highest-priority verified transactions.
    pub fn get_sorted_verified_transactions(&self, count: usize) -> Vec<Arc<Transaction>> {
        self.inner
            .read()
            .verified
            .values()
            .rev()
            .take(count)
            .cloned()
            .collect()
    }

    /// Attempts to admit `tx` against the given snapshot.
    pub fn try_add(&self, tx: Arc<Transaction>, snapshot: &Arc<DataCache>) -> VerifyResult {
        let hash = tx.hash();
        if self.contains_key(&hash) {
            return VerifyResult::AlreadyInPool;
        }
        if ledger_native::contains_transaction(snapshot, &hash) {
            return VerifyResult::AlreadyExists;
        }

        let mut inner = self.inner.write();

        // Conflict resolution: the incoming transaction must outbid every
        // pooled transaction it clashes with.
        let mut to_displace: Vec<UInt256> = Vec::new();
        let incoming_key = PoolKey::of(&tx);
        let mut clashing: Vec<UInt256> = inner
            .conflicts
            .get(&hash)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for attribute in tx.attributes() {
            if let TransactionAttribute::Conflicts { hash: target } = attribute {
                if inner.by_hash.contains_key(target) {
                    clashing.push(*target);
                }
            }
        }
        for conflict_hash in clashing {
            if let Some(conflict) = inner.by_hash.get(&conflict_hash) {
                if PoolKey::of(conflict) >= incoming_key {
                    return VerifyResult::HasConflicts;
                }
                to_displace.push(conflict_hash);
            }
        }

        let displaced: Vec<&Transaction> = to_displace
            .iter()
            .filter_map(|hash| inner.by_hash.get(hash))
            .map(|tx| tx.as_ref())
            .collect();
        let verdict =
            verify_state_dependent(&tx, snapshot, &self.settings, &inner.context, &displaced);
        if !verdict.is_success() {
            return verdict;
        }

        let mut removed_for_conflict = Vec::new();
        for conflict_hash in to_displace {
            if let Some(conflict) = inner.remove_verified(&conflict_hash, snapshot) {
                removed_for_conflict.push(conflict);
            }
        }

        inner.context.add_transaction(&tx, snapshot);
        inner.register_conflicts(&tx);
        inner.by_hash.insert(hash, Arc::clone(&tx));
        inner.verified.insert(PoolKey::of(&tx), tx);

        // Capacity eviction always removes the minimum-priority element.
        let mut evicted = Vec::new();
        while inner.by_hash.len() > self.capacity {
            let victim_hash = match inner.verified.keys().next() {
                Some(key) => key.hash,
                None => break,
            };
            if let Some(victim) = inner.remove_verified(&victim_hash, snapshot) {
                evicted.push(victim);
            } else {
                break;
            }
        }
        let added_survived = inner.by_hash.contains_key(&hash);
        drop(inner);

        self.notify_removed(removed_for_conflict, TransactionRemovalReason::Conflict);
        let evicted_includes_new = !added_survived;
        self.notify_removed(evicted, TransactionRemovalReason::CapacityExceeded);
        if evicted_includes_new {
            return VerifyResult::OutOfMemory;
        }
        debug!(hash = %hash, "transaction admitted to the pool");
        VerifyResult::Succeed
    }

    /// Reacts to a persisted block: drops included transactions, demotes the
    /// rest to unverified, and re-verifies them against the new snapshot.
    pub fn update_pool_for_block_persisted(&self, block: &Block, snapshot: &Arc<DataCache>) {
        let mut inner = self.inner.write();
        for tx in &block.transactions {
            let hash = tx.hash();
            if let Some(pooled) = inner.by_hash.remove(&hash) {
                let key = PoolKey::of(&pooled);
                inner.verified.remove(&key);
                inner.context.remove_transaction(&pooled, snapshot);
                inner.unregister_conflicts(&pooled);
            }
            // Anything clashing with a confirmed transaction dies with it.
            let clashing: Vec<UInt256> = inner
                .conflicts
                .get(&hash)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            for conflict_hash in clashing {
                inner.remove_verified(&conflict_hash, snapshot);
            }
        }

        // Demote survivors; verification state is stale now.
        let survivors: Vec<Arc<Transaction>> = inner.verified.values().cloned().collect();
        inner.verified.clear();
        inner.context = TransactionVerificationContext::new();
        for tx in survivors {
            inner.unverified.push_back(tx);
        }
        drop(inner);

        self.reverify_transactions(usize::MAX, snapshot);
    }

    /// Re-verifies up to `count` unverified transactions, readmitting the
    /// passing ones and dropping the rest as no longer valid.
    pub fn reverify_transactions(&self, count: usize, snapshot: &Arc<DataCache>) {
        let mut dropped = Vec::new();
        let mut inner = self.inner.write();
        for _ in 0..count {
            let Some(tx) = inner.unverified.pop_front() else {
                break;
            };
            let verdict =
                verify_state_dependent(&tx, snapshot, &self.settings, &inner.context, &[]);
            if verdict.is_success() {
                inner.context.add_transaction(&tx, snapshot);
                inner.verified.insert(PoolKey::of(&tx), Arc::clone(&tx));
            } else {
                inner.by_hash.remove(&tx.hash());
                inner.unregister_conflicts(&tx);
                dropped.push(tx);
            }
        }
        drop(inner);
        self.notify_removed(dropped, TransactionRemovalReason::NoLongerValid);
    }

    /// A snapshot of the verification context, for external verifiers.
    pub fn verification_context(&self) -> TransactionVerificationContext {
        self.inner.read().context.clone()
    }
}
