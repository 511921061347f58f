// Copyright (C) 2015-2025 The Neo Project.
//
// verification.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The transaction verification pipeline.

use crate::VerifyResult;
use neo3_config::{ProtocolSettings, MAX_TRANSACTION_SIZE};
use neo3_contract::native::{gas_token, ledger as ledger_native, neo_token, oracle, policy};
use neo3_contract::{ApplicationEngine, CallFlags, ContainerRef, TriggerType};
use neo3_core::{Transaction, TransactionAttribute, UInt160, Verifiable, Witness};
use neo3_crypto::{verify_multisig, ECPoint};
use neo3_persistence::DataCache;
use neo3_vm::{is_multisig_contract, is_signature_contract, OpCode, Script, VMState};
use num_bigint::BigInt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Gas budget for verifying one witness of a free (system) context.
pub const MAX_VERIFICATION_GAS: i64 = 1_5000_0000;

/// Per-sender fee and oracle-response accounting shared between the pool and
/// the verifier.
#[derive(Debug, Clone, Default)]
pub struct TransactionVerificationContext {
    /// Sender → total fees of pool-resident transactions, in datoshi.
    sender_fees: HashMap<UInt160, BigInt>,
    /// Oracle response id → hash of the pooled response transaction.
    oracle_responses: HashMap<u64, neo3_core::UInt256>,
}

impl TransactionVerificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn expected_fee(tx: &Transaction, snapshot: &Arc<DataCache>) -> BigInt {
        let mut fee = BigInt::from(tx.system_fee()) + BigInt::from(tx.network_fee());
        for attribute in tx.attributes() {
            fee += BigInt::from(policy::attribute_fee(snapshot, attribute.type_byte()));
        }
        fee
    }

    /// Whether the sender can afford `tx` on top of every pooled
    /// transaction, with `conflicts` about to leave the pool.
    pub fn check_transaction(
        &self,
        tx: &Transaction,
        conflicts: &[&Transaction],
        snapshot: &Arc<DataCache>,
    ) -> VerifyResult {
        // A second response to the same oracle request never enters.
        for attribute in tx.attributes() {
            if let TransactionAttribute::OracleResponse { id, .. } = attribute {
                if self.oracle_responses.contains_key(id) {
                    return VerifyResult::InvalidAttribute;
                }
            }
        }

        let balance = gas_token::balance_of(snapshot, &tx.sender());
        let mut pending = self
            .sender_fees
            .get(&tx.sender())
            .cloned()
            .unwrap_or_default();
        for conflict in conflicts {
            if conflict.sender() == tx.sender() {
                pending -= Self::expected_fee(conflict, snapshot);
            }
        }
        if balance < pending + Self::expected_fee(tx, snapshot) {
            return VerifyResult::InsufficientFunds;
        }
        VerifyResult::Succeed
    }

    /// Records a pooled transaction.
    pub fn add_transaction(&mut self, tx: &Transaction, snapshot: &Arc<DataCache>) {
        *self
            .sender_fees
            .entry(tx.sender())
            .or_default() += Self::expected_fee(tx, snapshot);
        for attribute in tx.attributes() {
            if let TransactionAttribute::OracleResponse { id, .. } = attribute {
                self.oracle_responses.insert(*id, tx.hash());
            }
        }
    }

    /// Forgets a transaction leaving the pool.
    pub fn remove_transaction(&mut self, tx: &Transaction, snapshot: &Arc<DataCache>) {
        if let Entry::Occupied(mut entry) = self.sender_fees.entry(tx.sender()) {
            *entry.get_mut() -= Self::expected_fee(tx, snapshot);
            if entry.get() <= &BigInt::from(0) {
                entry.remove();
            }
        }
        for attribute in tx.attributes() {
            if let TransactionAttribute::OracleResponse { id, .. } = attribute {
                self.oracle_responses.remove(id);
            }
        }
    }
}

/// Checks everything about `tx` that needs no chain state: size, script
/// well-formedness and recognizable witness templates.
pub fn verify_state_independent(tx: &Transaction, settings: &ProtocolSettings) -> VerifyResult {
    if tx.size() > MAX_TRANSACTION_SIZE {
        return VerifyResult::OverSize;
    }
    if Script::new(tx.script().to_vec()).is_err() {
        return VerifyResult::InvalidScript;
    }

    let hashes = tx.script_hashes_for_verifying();
    if hashes.len() != tx.witnesses().len() {
        return VerifyResult::Invalid;
    }
    let sign_data = tx.sign_data(settings.network);
    for (expected_hash, witness) in hashes.iter().zip(tx.witnesses()) {
        if witness.verification_script.is_empty() {
            // Contract-based witness: deferred to state-dependent checks.
            continue;
        }
        if &witness.script_hash() != expected_hash {
            return VerifyResult::Invalid;
        }
        if let Some(pubkey_bytes) = is_signature_contract(&witness.verification_script) {
            let Ok(pubkey) = ECPoint::from_bytes(&pubkey_bytes) else {
                return VerifyResult::InvalidSignature;
            };
            let Some(signatures) = parse_invocation_signatures(&witness.invocation_script, 1)
            else {
                return VerifyResult::InvalidSignature;
            };
            if !pubkey.verify_signature(&sign_data, &signatures[0]) {
                return VerifyResult::InvalidSignature;
            }
        } else if let Some(template) = is_multisig_contract(&witness.verification_script) {
            let mut pubkeys = Vec::with_capacity(template.pubkeys.len());
            for bytes in &template.pubkeys {
                match ECPoint::from_bytes(bytes) {
                    Ok(pubkey) => pubkeys.push(pubkey),
                    Err(_) => return VerifyResult::InvalidSignature,
                }
            }
            let Some(signatures) =
                parse_invocation_signatures(&witness.invocation_script, template.m)
            else {
                return VerifyResult::InvalidSignature;
            };
            if !verify_multisig(&sign_data, &signatures, &pubkeys) {
                return VerifyResult::InvalidSignature;
            }
        }
    }
    VerifyResult::Succeed
}

/// Parses an invocation script that must consist of exactly `count`
/// 64-byte `PUSHDATA1` signatures.
fn parse_invocation_signatures(script: &[u8], count: usize) -> Option<Vec<Vec<u8>>> {
    if script.len() != count * 66 {
        return None;
    }
    let mut signatures = Vec::with_capacity(count);
    for chunk in script.chunks_exact(66) {
        if chunk[0] != OpCode::PushData1 as u8 || chunk[1] != 64 {
            return None;
        }
        signatures.push(chunk[2..].to_vec());
    }
    Some(signatures)
}

/// Checks everything about `tx` that depends on the snapshot: expiry,
/// policy, fees, attributes and witness execution.
pub fn verify_state_dependent(
    tx: &Transaction,
    snapshot: &Arc<DataCache>,
    settings: &Arc<ProtocolSettings>,
    context: &TransactionVerificationContext,
    conflicting: &[&Transaction],
) -> VerifyResult {
    let current = ledger_native::current_index(snapshot);
    let height = current.map_or(0, |index| index + 1);
    match current {
        Some(current) => {
            if tx.valid_until_block() <= current
                || tx.valid_until_block() > current + settings.max_valid_until_block_increment
            {
                return VerifyResult::Expired;
            }
        }
        None => {
            if tx.valid_until_block() > settings.max_valid_until_block_increment {
                return VerifyResult::Expired;
            }
        }
    }

    for signer in tx.signers() {
        if policy::is_blocked(snapshot, &signer.account) {
            return VerifyResult::PolicyFail;
        }
    }

    let fee_check = context.check_transaction(tx, conflicting, snapshot);
    if !fee_check.is_success() {
        return fee_check;
    }

    let signers: Vec<UInt160> = tx.signers().iter().map(|s| s.account).collect();
    for attribute in tx.attributes() {
        match attribute {
            TransactionAttribute::HighPriority => {
                let Ok(committee) = neo_token::committee_address(snapshot, settings) else {
                    return VerifyResult::UnableToVerify;
                };
                if !signers.contains(&committee) {
                    return VerifyResult::InvalidAttribute;
                }
            }
            TransactionAttribute::Conflicts { hash } => {
                // A transaction conflicting with something already confirmed
                // is dead on arrival.
                if ledger_native::contains_transaction(snapshot, hash) {
                    return VerifyResult::InvalidAttribute;
                }
            }
            TransactionAttribute::OracleResponse { id, .. } => {
                if oracle::get_request(snapshot, *id).is_none() {
                    return VerifyResult::InvalidAttribute;
                }
            }
            TransactionAttribute::NotaryAssisted { .. } => {
                if !settings.is_hardfork_enabled(neo3_config::Hardfork::Echidna, height) {
                    return VerifyResult::InvalidAttribute;
                }
            }
        }
    }
    if ledger_native::contains_conflict(snapshot, &tx.hash(), &signers) {
        return VerifyResult::HasConflicts;
    }

    // The network fee covers bytes, attribute surcharges and witness
    // execution, in that order.
    let mut remaining_fee = tx.network_fee() - tx.size() as i64 * policy::fee_per_byte(snapshot);
    for attribute in tx.attributes() {
        remaining_fee -= policy::attribute_fee(snapshot, attribute.type_byte());
    }
    if remaining_fee < 0 {
        return VerifyResult::InsufficientFunds;
    }
    for (expected_hash, witness) in tx
        .script_hashes_for_verifying()
        .iter()
        .zip(tx.witnesses())
    {
        match verify_witness(tx, witness, expected_hash, snapshot, settings, remaining_fee) {
            Ok(consumed) => remaining_fee -= consumed,
            Err(result) => return result,
        }
    }
    VerifyResult::Succeed
}

/// Runs one witness in a verification-trigger engine with `gas_limit` as its
/// budget. Returns the gas consumed, or the failure classification.
pub fn verify_witness(
    verifiable: &Transaction,
    witness: &Witness,
    expected_hash: &UInt160,
    snapshot: &Arc<DataCache>,
    settings: &Arc<ProtocolSettings>,
    gas_limit: i64,
) -> Result<i64, VerifyResult> {
    let container = ContainerRef::Transaction(Arc::new(verifiable.clone()));
    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        container,
        Arc::new(snapshot.clone_cache()),
        None,
        Arc::clone(settings),
        gas_limit.min(MAX_VERIFICATION_GAS),
    );

    if witness.verification_script.is_empty() {
        // Contract-based witness: the account must be a deployed contract
        // with a `verify` method.
        let Some(contract) =
            neo3_contract::native::contract_management::get_contract(snapshot, expected_hash)
        else {
            return Err(VerifyResult::UnableToVerify);
        };
        if !contract.has_method("verify") {
            return Err(VerifyResult::Invalid);
        }
        if engine
            .load_contract(&contract, "verify", Vec::new(), CallFlags::READ_ONLY)
            .is_err()
        {
            return Err(VerifyResult::Invalid);
        }
    } else {
        if &witness.script_hash() != expected_hash {
            return Err(VerifyResult::Invalid);
        }
        if engine
            .load_script_with_flags(&witness.verification_script, CallFlags::READ_ONLY)
            .is_err()
        {
            return Err(VerifyResult::InvalidScript);
        }
        if !witness.invocation_script.is_empty()
            && engine
                .load_script_with_flags(&witness.invocation_script, CallFlags::NONE)
                .is_err()
        {
            return Err(VerifyResult::InvalidScript);
        }
    }

    if engine.execute() != VMState::Halt {
        return Err(VerifyResult::InvalidSignature);
    }
    let truthy = engine
        .result_stack()
        .peek(0)
        .map(|item| item.to_boolean())
        .unwrap_or(false);
    if !truthy || engine.result_stack().len() != 1 {
        return Err(VerifyResult::InvalidSignature);
    }
    Ok(engine.gas_consumed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::{Signer, TransactionBuilder};
    use neo3_crypto::KeyPair;
    use neo3_persistence::{CacheBackend, MemoryStore, SnapshotBackend, Store};
    use neo3_vm::signature_contract_script;

    fn snapshot() -> Arc<DataCache> {
        let store = MemoryStore::new();
        let backend = Arc::new(SnapshotBackend::new(store.snapshot()));
        Arc::new(DataCache::new(backend as Arc<dyn CacheBackend>))
    }

    fn signed_transaction(pair: &KeyPair, settings: &ProtocolSettings) -> Transaction {
        let verification = signature_contract_script(&pair.public_key().encode_compressed());
        let account = UInt160::from_script(&verification);
        let mut tx = TransactionBuilder::new()
            .nonce(7)
            .valid_until_block(100)
            .signer(Signer::called_by_entry(account))
            .script(vec![OpCode::Push1 as u8])
            .build()
            .unwrap();
        let signature = pair.sign(&tx.sign_data(settings.network)).unwrap();
        let mut invocation = vec![OpCode::PushData1 as u8, 64];
        invocation.extend_from_slice(&signature);
        tx.set_witnesses(vec![Witness::new(invocation, verification)]);
        tx
    }

    #[test]
    fn single_sig_template_verifies() {
        let settings = ProtocolSettings::default();
        let pair = KeyPair::generate();
        let tx = signed_transaction(&pair, &settings);
        assert_eq!(
            verify_state_independent(&tx, &settings),
            VerifyResult::Succeed
        );
    }

    #[test]
    fn wrong_network_magic_fails_the_signature() {
        let mut settings = ProtocolSettings::default();
        let pair = KeyPair::generate();
        let tx = signed_transaction(&pair, &settings);
        settings.network ^= 1;
        assert_eq!(
            verify_state_independent(&tx, &settings),
            VerifyResult::InvalidSignature
        );
    }

    #[test]
    fn oversize_is_rejected() {
        let settings = ProtocolSettings::default();
        let tx = TransactionBuilder::new()
            .valid_until_block(10)
            .signer(Signer::called_by_entry(UInt160::ZERO))
            .script(vec![OpCode::Push1 as u8; 64_000])
            .network_fee(1)
            .build()
            .unwrap();
        // Pad over the cap with witnesses.
        let mut tx = tx;
        tx.set_witnesses(vec![Witness::new(vec![0u8; 1000], vec![0x51; 600])]);
        if tx.size() > MAX_TRANSACTION_SIZE {
            assert_eq!(verify_state_independent(&tx, &settings), VerifyResult::OverSize);
        }
    }

    #[test]
    fn context_tracks_sender_fees_and_oracle_ids() {
        let snapshot = snapshot();
        let sender = UInt160::from_script(b"sender");
        // Fund the sender with 10 GAS.
        let state = neo3_contract::native::gas_token::GasAccountState {
            balance: BigInt::from(10_0000_0000i64),
        };
        use neo3_contract::Interoperable;
        snapshot.put(
            &neo3_contract::native::fungible::account_key(
                neo3_contract::native::gas_token::ID,
                &sender,
            ),
            state.to_storage_item().unwrap(),
        );

        let tx = |fee: i64, nonce: u32| {
            TransactionBuilder::new()
                .nonce(nonce)
                .valid_until_block(10)
                .system_fee(fee)
                .signer(Signer::called_by_entry(sender))
                .script(vec![OpCode::Push1 as u8])
                .build()
                .unwrap()
        };
        let mut context = TransactionVerificationContext::new();
        let first = tx(6_0000_0000, 1);
        assert!(context.check_transaction(&first, &[], &snapshot).is_success());
        context.add_transaction(&first, &snapshot);
        let second = tx(6_0000_0000, 2);
        assert_eq!(
            context.check_transaction(&second, &[], &snapshot),
            VerifyResult::InsufficientFunds
        );
        // With the first about to leave the pool, the second fits.
        assert!(context
            .check_transaction(&second, &[&first], &snapshot)
            .is_success());
    }
}
