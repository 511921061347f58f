// Copyright (C) 2015-2025 The Neo Project.
//
// neo_token.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! NeoToken: governance token, committee election and GAS distribution.

use super::fungible::{self, TokenAccountState, TokenInfo};
use super::{gas_token, NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use crate::{BinarySerializer, ContractError, ContractResult, Interoperable};
use neo3_config::ProtocolSettings;
use neo3_core::UInt160;
use neo3_crypto::ECPoint;
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::sync::Arc;

pub const ID: i32 = -5;

/// Indivisible total supply.
pub const TOTAL_AMOUNT: i64 = 100_000_000;

const PREFIX_VOTERS_COUNT: u8 = 1;
const PREFIX_REGISTER_PRICE: u8 = 13;
const PREFIX_COMMITTEE: u8 = 14;
const PREFIX_GAS_PER_BLOCK: u8 = 29;
const PREFIX_VOTER_REWARD_PER_COMMITTEE: u8 = 23;
const PREFIX_CANDIDATE: u8 = 33;

/// Reward split, in percent of the per-block GAS.
const NEO_HOLDER_REWARD_RATIO: i64 = 10;
const COMMITTEE_REWARD_RATIO: i64 = 10;
const VOTER_REWARD_RATIO: i64 = 80;

const DEFAULT_GAS_PER_BLOCK: i64 = 5_0000_0000;
const DEFAULT_REGISTER_PRICE: i64 = 1000_0000_0000;

/// The governance token.
pub struct NeoToken;

fn token_info() -> TokenInfo {
    TokenInfo {
        id: ID,
        hash: super::native_hash("NeoToken"),
        symbol: "NEO",
        decimals: 0,
    }
}

/// Account state carrying voting data next to the balance.
#[derive(Debug, Clone, Default)]
pub struct NeoAccountState {
    pub balance: BigInt,
    /// Height up to which GAS has been distributed to this account.
    pub balance_height: u32,
    pub vote_to: Option<ECPoint>,
    /// Snapshot of the candidate's reward accumulator at vote time.
    pub last_gas_per_vote: BigInt,
}

impl Interoperable for NeoAccountState {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self> {
        let StackItem::Struct(fields) = item else {
            return Err(ContractError::invalid_format("account state must be a struct"));
        };
        let fields = fields.borrow();
        if fields.len() != 4 {
            return Err(ContractError::invalid_format("account state needs 4 fields"));
        }
        let to_int = |item: &StackItem| {
            item.to_integer()
                .map_err(|e| ContractError::invalid_format(e.to_string()))
        };
        let vote_to = if fields[2].is_null() {
            None
        } else {
            let bytes = fields[2]
                .to_bytes()
                .map_err(|e| ContractError::invalid_format(e.to_string()))?;
            Some(
                ECPoint::from_bytes(&bytes)
                    .map_err(|e| ContractError::invalid_format(e.to_string()))?,
            )
        };
        Ok(Self {
            balance: to_int(&fields[0])?,
            balance_height: u32::try_from(&to_int(&fields[1])?)
                .map_err(|_| ContractError::invalid_format("balance height outside u32"))?,
            vote_to,
            last_gas_per_vote: to_int(&fields[3])?,
        })
    }

    fn to_stack_item(&self) -> StackItem {
        StackItem::from_struct(vec![
            StackItem::Integer(self.balance.clone()),
            StackItem::from_int(self.balance_height as i64),
            match &self.vote_to {
                Some(pubkey) => StackItem::from_bytes(pubkey.as_bytes().to_vec()),
                None => StackItem::Null,
            },
            StackItem::Integer(self.last_gas_per_vote.clone()),
        ])
    }
}

impl TokenAccountState for NeoAccountState {
    fn balance(&self) -> &BigInt {
        &self.balance
    }

    fn balance_mut(&mut self) -> &mut BigInt {
        &mut self.balance
    }
}

/// Candidate registration state.
#[derive(Debug, Clone, Default)]
pub struct CandidateState {
    pub registered: bool,
    pub votes: BigInt,
}

impl Interoperable for CandidateState {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self> {
        let StackItem::Struct(fields) = item else {
            return Err(ContractError::invalid_format("candidate state must be a struct"));
        };
        let fields = fields.borrow();
        if fields.len() != 2 {
            return Err(ContractError::invalid_format("candidate state needs 2 fields"));
        }
        Ok(Self {
            registered: fields[0].to_boolean(),
            votes: fields[1]
                .to_integer()
                .map_err(|e| ContractError::invalid_format(e.to_string()))?,
        })
    }

    fn to_stack_item(&self) -> StackItem {
        StackItem::from_struct(vec![
            StackItem::from_bool(self.registered),
            StackItem::Integer(self.votes.clone()),
        ])
    }
}

// ---- storage helpers ----

fn candidate_key(pubkey: &ECPoint) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_CANDIDATE).append(pubkey.as_bytes())
}

fn voter_reward_key(pubkey: &ECPoint) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_VOTER_REWARD_PER_COMMITTEE).append(pubkey.as_bytes())
}

fn gas_per_block_key(index: u32) -> StorageKey {
    StorageKey::with_prefix(ID, PREFIX_GAS_PER_BLOCK).append(&index.to_be_bytes())
}

fn candidate_state(snapshot: &Arc<DataCache>, pubkey: &ECPoint) -> Option<CandidateState> {
    let item = snapshot.try_get(&candidate_key(pubkey))?;
    CandidateState::from_storage_item(&item).ok()
}

fn put_candidate_state(snapshot: &Arc<DataCache>, pubkey: &ECPoint, state: &CandidateState) {
    if !state.registered && state.votes.is_zero() {
        snapshot.delete(&candidate_key(pubkey));
        return;
    }
    if let Ok(item) = state.to_storage_item() {
        snapshot.put(&candidate_key(pubkey), item);
    }
}

fn voters_count(snapshot: &Arc<DataCache>) -> BigInt {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, PREFIX_VOTERS_COUNT))
        .map(|item| item.as_int())
        .unwrap_or_else(BigInt::zero)
}

fn adjust_voters_count(snapshot: &Arc<DataCache>, delta: &BigInt) {
    let updated = voters_count(snapshot) + delta;
    snapshot.put(
        &StorageKey::with_prefix(ID, PREFIX_VOTERS_COUNT),
        StorageItem::from_int(&updated),
    );
}

fn voter_reward_per_committee(snapshot: &Arc<DataCache>, pubkey: &ECPoint) -> BigInt {
    snapshot
        .try_get(&voter_reward_key(pubkey))
        .map(|item| item.as_int())
        .unwrap_or_else(BigInt::zero)
}

/// The GAS minted per block at `index`.
pub fn gas_per_block(snapshot: &Arc<DataCache>, index: u32) -> BigInt {
    sorted_gas_records(snapshot, index)
        .first()
        .map(|(_, gas)| gas.clone())
        .unwrap_or_else(|| BigInt::from(DEFAULT_GAS_PER_BLOCK))
}

/// Gas-per-block records with activation index ≤ `end`, highest first.
fn sorted_gas_records(snapshot: &Arc<DataCache>, end: u32) -> Vec<(u32, BigInt)> {
    let prefix = StorageKey::with_prefix(ID, PREFIX_GAS_PER_BLOCK).to_bytes();
    let mut records: Vec<(u32, BigInt)> = snapshot
        .find(&prefix, SeekDirection::Forward)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, item)| {
            let suffix = key.suffix();
            if suffix.len() != 5 {
                return None;
            }
            let index = u32::from_be_bytes(suffix[1..5].try_into().ok()?);
            (index <= end).then(|| (index, item.as_int()))
        })
        .collect();
    records.sort_by(|a, b| b.0.cmp(&a.0));
    records
}

pub fn register_price(snapshot: &Arc<DataCache>) -> i64 {
    snapshot
        .try_get(&StorageKey::with_prefix(ID, PREFIX_REGISTER_PRICE))
        .map(|item| i64::try_from(&item.as_int()).unwrap_or(DEFAULT_REGISTER_PRICE))
        .unwrap_or(DEFAULT_REGISTER_PRICE)
}

// ---- committee ----

/// Parses the configured standby committee.
pub fn standby_committee(settings: &ProtocolSettings) -> VmResult<Vec<ECPoint>> {
    settings
        .standby_committee
        .iter()
        .map(|hex_key| {
            ECPoint::from_hex(hex_key)
                .map_err(|e| VmError::InvalidOperation(format!("bad standby key: {e}")))
        })
        .collect()
}

/// The cached committee: `(pubkey, votes)` ranked by the last election.
pub fn committee(snapshot: &Arc<DataCache>, settings: &ProtocolSettings) -> VmResult<Vec<(ECPoint, BigInt)>> {
    let Some(item) = snapshot.try_get(&StorageKey::with_prefix(ID, PREFIX_COMMITTEE)) else {
        return Ok(standby_committee(settings)?
            .into_iter()
            .map(|pubkey| (pubkey, BigInt::zero()))
            .collect());
    };
    let stack_item = BinarySerializer::deserialize(item.value())
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    let StackItem::Array(entries) = stack_item else {
        return Err(VmError::InvalidOperation("malformed committee cache".into()));
    };
    let mut members = Vec::new();
    for entry in entries.borrow().iter() {
        let StackItem::Struct(fields) = entry else {
            return Err(VmError::InvalidOperation("malformed committee entry".into()));
        };
        let fields = fields.borrow();
        let pubkey = ECPoint::from_bytes(&fields[0].to_bytes()?)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
        let votes = fields[1].to_integer()?;
        members.push((pubkey, votes));
    }
    Ok(members)
}

fn store_committee(snapshot: &Arc<DataCache>, members: &[(ECPoint, BigInt)]) -> VmResult<()> {
    let entries: Vec<StackItem> = members
        .iter()
        .map(|(pubkey, votes)| {
            StackItem::from_struct(vec![
                StackItem::from_bytes(pubkey.as_bytes().to_vec()),
                StackItem::Integer(votes.clone()),
            ])
        })
        .collect();
    let bytes = BinarySerializer::serialize(&StackItem::from_array(entries))
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    snapshot.put(
        &StorageKey::with_prefix(ID, PREFIX_COMMITTEE),
        StorageItem::new(bytes),
    );
    Ok(())
}

/// Ranks candidates and elects the committee, falling back to the standby
/// set on low turnout or too few candidates.
fn compute_committee_members(
    snapshot: &Arc<DataCache>,
    settings: &ProtocolSettings,
) -> VmResult<Vec<(ECPoint, BigInt)>> {
    let committee_size = settings.committee_members_count();
    let voters = voters_count(snapshot);
    // Turnout below 20% keeps the standby committee in charge.
    let turnout_ok = &voters * 5 >= BigInt::from(TOTAL_AMOUNT);

    let prefix = StorageKey::with_prefix(ID, PREFIX_CANDIDATE).to_bytes();
    let mut candidates: Vec<(ECPoint, BigInt)> = snapshot
        .find(&prefix, SeekDirection::Forward)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, item)| {
            let pubkey = ECPoint::from_bytes(&key.suffix()[1..]).ok()?;
            let state = CandidateState::from_storage_item(&item).ok()?;
            state.registered.then_some((pubkey, state.votes))
        })
        .collect();

    if !turnout_ok || candidates.len() < committee_size {
        return Ok(standby_committee(settings)?
            .into_iter()
            .map(|pubkey| (pubkey, BigInt::zero()))
            .collect());
    }
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates.truncate(committee_size);
    Ok(candidates)
}

/// Whether the committee re-elects at `index`.
fn should_refresh_committee(index: u32, committee_size: usize) -> bool {
    index % committee_size as u32 == 0
}

/// Validators for the next block: the committee prefix, sorted by key.
pub fn next_block_validators(
    snapshot: &Arc<DataCache>,
    settings: &ProtocolSettings,
) -> VmResult<Vec<ECPoint>> {
    let members = committee(snapshot, settings)?;
    let mut validators: Vec<ECPoint> = members
        .into_iter()
        .take(settings.validators_count as usize)
        .map(|(pubkey, _)| pubkey)
        .collect();
    validators.sort();
    Ok(validators)
}

/// The account of the block proposer with the given index.
pub fn primary_account(
    snapshot: &Arc<DataCache>,
    settings: &ProtocolSettings,
    primary_index: u8,
) -> VmResult<UInt160> {
    let validators = next_block_validators(snapshot, settings)?;
    let pubkey = validators
        .get(primary_index as usize)
        .ok_or_else(|| VmError::InvalidOperation(format!("no validator {primary_index}")))?;
    Ok(UInt160::from_script(&neo3_vm::signature_contract_script(
        &pubkey.encode_compressed(),
    )))
}

fn multisig_address(threshold: usize, mut pubkeys: Vec<ECPoint>) -> VmResult<UInt160> {
    pubkeys.sort();
    let keys: Vec<[u8; 33]> = pubkeys.iter().map(|key| key.encode_compressed()).collect();
    let script = neo3_vm::multisig_contract_script(threshold, &keys)
        .ok_or_else(|| VmError::InvalidOperation("invalid multisig parameters".into()))?;
    Ok(UInt160::from_script(&script))
}

/// The BFT address of the standby validators; the genesis supply lands here.
pub fn genesis_bft_address(settings: &ProtocolSettings) -> VmResult<UInt160> {
    let validators: Vec<ECPoint> = standby_committee(settings)?
        .into_iter()
        .take(settings.validators_count as usize)
        .collect();
    let threshold = validators.len() - (validators.len() - 1) / 3;
    multisig_address(threshold, validators)
}

/// The committee's majority multisig address.
pub fn committee_address(
    snapshot: &Arc<DataCache>,
    settings: &ProtocolSettings,
) -> VmResult<UInt160> {
    let members: Vec<ECPoint> = committee(snapshot, settings)?
        .into_iter()
        .map(|(pubkey, _)| pubkey)
        .collect();
    let threshold = members.len() - (members.len() - 1) / 2;
    multisig_address(threshold, members)
}

/// Faults unless the committee witnessed the current container.
pub fn require_committee_witness(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    let address = committee_address(&context.snapshot, &context.settings)?;
    if !context.check_witness_internal(engine, &address)? {
        return Err(VmError::InvalidOperation(
            "operation requires a committee witness".into(),
        ));
    }
    Ok(())
}

// ---- GAS distribution ----

/// GAS accrued by `state` between its balance height and `end`.
fn calculate_bonus(
    snapshot: &Arc<DataCache>,
    state: &NeoAccountState,
    end: u32,
) -> BigInt {
    if state.balance.is_zero() || state.balance.is_negative() || end <= state.balance_height {
        return BigInt::zero();
    }
    // Holder reward: walk the gas-per-block records backwards from end-1.
    let mut sum = BigInt::zero();
    let mut upper = end;
    let start = state.balance_height;
    let records = sorted_gas_records(snapshot, end - 1);
    if records.is_empty() {
        sum = BigInt::from(DEFAULT_GAS_PER_BLOCK) * (upper - start);
    }
    for (index, gas) in records {
        if index > start {
            sum += &gas * (upper - index);
            upper = index;
        } else {
            sum += &gas * (upper - start);
            break;
        }
    }
    let mut reward = &state.balance * sum * NEO_HOLDER_REWARD_RATIO / 100 / TOTAL_AMOUNT;

    // Voter reward: the accumulator delta since the vote was placed.
    if let Some(vote_to) = &state.vote_to {
        let latest = voter_reward_per_committee(snapshot, vote_to);
        reward += &state.balance * (latest - &state.last_gas_per_vote) / 100_000_000i64;
    }
    reward
}

/// Settles pending GAS for an account before its state changes.
fn distribute_gas(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    account: &UInt160,
    state: &mut NeoAccountState,
) -> VmResult<()> {
    let Some(block) = context.persisting_block.clone() else {
        return Ok(());
    };
    let gas = calculate_bonus(&context.snapshot, state, block.index());
    state.balance_height = block.index();
    if let Some(vote_to) = &state.vote_to {
        state.last_gas_per_vote = voter_reward_per_committee(&context.snapshot, vote_to);
    }
    if gas.is_positive() {
        gas_token::mint(context, engine, account, &gas)?;
    }
    Ok(())
}

/// The NEO balance-change hook: settle GAS, then move the account's vote
/// weight with the balance.
fn on_balance_changing(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    account: &UInt160,
    state: &mut NeoAccountState,
    delta: &BigInt,
) -> VmResult<()> {
    distribute_gas(context, engine, account, state)?;
    if delta.is_zero() {
        return Ok(());
    }
    if let Some(vote_to) = state.vote_to.clone() {
        adjust_voters_count(&context.snapshot, delta);
        if let Some(mut candidate) = candidate_state(&context.snapshot, &vote_to) {
            candidate.votes += delta;
            put_candidate_state(&context.snapshot, &vote_to, &candidate);
        }
    }
    Ok(())
}

/// GAS an account could claim at `end`.
pub fn unclaimed_gas(snapshot: &Arc<DataCache>, account: &UInt160, end: u32) -> BigInt {
    match fungible::account_state::<NeoAccountState>(snapshot, ID, account) {
        Some(state) => calculate_bonus(snapshot, &state, end),
        None => BigInt::zero(),
    }
}

// ---- voting ----

fn vote(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    account: &UInt160,
    vote_to: Option<ECPoint>,
) -> VmResult<bool> {
    if !context.check_witness_internal(engine, account)? {
        return Ok(false);
    }
    let key = fungible::account_key(ID, account);
    let Some(item) = context.snapshot.try_get(&key) else {
        return Ok(false);
    };
    let mut state = NeoAccountState::from_storage_item(&item)
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;

    // A vote for an unregistered candidate is refused.
    let new_candidate = match &vote_to {
        Some(pubkey) => match candidate_state(&context.snapshot, pubkey) {
            Some(candidate) if candidate.registered => Some((pubkey.clone(), candidate)),
            _ => return Ok(false),
        },
        None => None,
    };

    // Settle pending rewards under the old vote before anything moves.
    distribute_gas(context, engine, account, &mut state)?;

    // Voters-count moves only on null↔non-null transitions.
    match (&state.vote_to, &vote_to) {
        (None, Some(_)) => adjust_voters_count(&context.snapshot, &state.balance),
        (Some(_), None) => adjust_voters_count(&context.snapshot, &-state.balance.clone()),
        _ => {}
    }

    if let Some(old) = state.vote_to.clone() {
        if let Some(mut candidate) = candidate_state(&context.snapshot, &old) {
            candidate.votes -= &state.balance;
            put_candidate_state(&context.snapshot, &old, &candidate);
        }
    }
    match new_candidate {
        Some((pubkey, mut candidate)) => {
            candidate.votes += &state.balance;
            state.last_gas_per_vote = voter_reward_per_committee(&context.snapshot, &pubkey);
            put_candidate_state(&context.snapshot, &pubkey, &candidate);
            state.vote_to = Some(pubkey.clone());
            context.emit_native_notification(
                token_info().hash,
                "Vote",
                StackItem::from_array(vec![
                    StackItem::from_bytes(account.to_array().to_vec()),
                    match &state.vote_to {
                        Some(p) => StackItem::from_bytes(p.as_bytes().to_vec()),
                        None => StackItem::Null,
                    },
                    StackItem::Integer(state.balance.clone()),
                ]),
            );
        }
        None => {
            state.vote_to = None;
            state.last_gas_per_vote = BigInt::zero();
            context.emit_native_notification(
                token_info().hash,
                "Vote",
                StackItem::from_array(vec![
                    StackItem::from_bytes(account.to_array().to_vec()),
                    StackItem::Null,
                    StackItem::Integer(state.balance.clone()),
                ]),
            );
        }
    }

    let item = state
        .to_storage_item()
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    context.snapshot.put(&key, item);
    Ok(true)
}

// ---- methods ----

const METHODS: &[NativeMethod] = &[
    NativeMethod::safe("symbol", &[], ContractParameterType::String, 0),
    NativeMethod::safe("decimals", &[], ContractParameterType::Integer, 0),
    NativeMethod::safe("totalSupply", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::safe(
        "balanceOf",
        &[("account", ContractParameterType::Hash160)],
        ContractParameterType::Integer,
        1 << 15,
    ),
    NativeMethod::unsafe_method(
        "transfer",
        &[
            ("from", ContractParameterType::Hash160),
            ("to", ContractParameterType::Hash160),
            ("amount", ContractParameterType::Integer),
            ("data", ContractParameterType::Any),
        ],
        ContractParameterType::Boolean,
        1 << 17,
        50,
    ),
    NativeMethod::safe(
        "unclaimedGas",
        &[
            ("account", ContractParameterType::Hash160),
            ("end", ContractParameterType::Integer),
        ],
        ContractParameterType::Integer,
        1 << 17,
    ),
    NativeMethod::unsafe_method(
        "registerCandidate",
        &[("pubkey", ContractParameterType::PublicKey)],
        ContractParameterType::Boolean,
        0,
        0,
    ),
    NativeMethod::unsafe_method(
        "unregisterCandidate",
        &[("pubkey", ContractParameterType::PublicKey)],
        ContractParameterType::Boolean,
        1 << 16,
        0,
    ),
    NativeMethod::unsafe_method(
        "vote",
        &[
            ("account", ContractParameterType::Hash160),
            ("voteTo", ContractParameterType::PublicKey),
        ],
        ContractParameterType::Boolean,
        1 << 16,
        0,
    ),
    NativeMethod::safe("getCandidates", &[], ContractParameterType::Array, 1 << 22),
    NativeMethod::safe(
        "getAccountState",
        &[("account", ContractParameterType::Hash160)],
        ContractParameterType::Array,
        1 << 15,
    ),
    NativeMethod::safe("getCommittee", &[], ContractParameterType::Array, 1 << 16),
    NativeMethod::safe(
        "getNextBlockValidators",
        &[],
        ContractParameterType::Array,
        1 << 16,
    ),
    NativeMethod::safe("getGasPerBlock", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::unsafe_method(
        "setGasPerBlock",
        &[("gasPerBlock", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
    NativeMethod::safe("getRegisterPrice", &[], ContractParameterType::Integer, 1 << 15),
    NativeMethod::unsafe_method(
        "setRegisterPrice",
        &[("registerPrice", ContractParameterType::Integer)],
        ContractParameterType::Void,
        1 << 15,
        0,
    ),
];

impl NativeContract for NeoToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "NeoToken"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn initialize(&self, context: &mut EngineContext) -> VmResult<()> {
        let members: Vec<(ECPoint, BigInt)> = standby_committee(&context.settings)?
            .into_iter()
            .map(|pubkey| (pubkey, BigInt::zero()))
            .collect();
        store_committee(&context.snapshot, &members)?;
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_VOTERS_COUNT),
            StorageItem::from_i64(0),
        );
        context.snapshot.put(
            &gas_per_block_key(0),
            StorageItem::from_i64(DEFAULT_GAS_PER_BLOCK),
        );
        context.snapshot.put(
            &StorageKey::with_prefix(ID, PREFIX_REGISTER_PRICE),
            StorageItem::from_i64(DEFAULT_REGISTER_PRICE),
        );
        let genesis_account = genesis_bft_address(&context.settings)?;
        fungible::genesis_mint::<NeoAccountState>(
            context,
            &token_info(),
            &genesis_account,
            &BigInt::from(TOTAL_AMOUNT),
        )?;
        Ok(())
    }

    fn on_persist(&self, context: &mut EngineContext, _engine: &mut ExecutionEngine) -> VmResult<()> {
        let block = context
            .persisting_block
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperation("OnPersist without a block".into()))?
            .clone();
        let committee_size = context.settings.committee_members_count();
        if should_refresh_committee(block.index(), committee_size) {
            let members = compute_committee_members(&context.snapshot, &context.settings)?;
            store_committee(&context.snapshot, &members)?;
        }
        Ok(())
    }

    fn post_persist(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
    ) -> VmResult<()> {
        let block = context
            .persisting_block
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperation("PostPersist without a block".into()))?
            .clone();
        let members = committee(&context.snapshot, &context.settings)?;
        let n = members.len();
        let m = context.settings.validators_count as usize;
        let gas_per_block = gas_per_block(&context.snapshot, block.index());

        // Per-block committee reward.
        let reward_index = (block.index() as usize) % n;
        let (reward_pubkey, _) = &members[reward_index];
        let reward_account = UInt160::from_script(&neo3_vm::signature_contract_script(
            &reward_pubkey.encode_compressed(),
        ));
        let committee_reward = &gas_per_block * COMMITTEE_REWARD_RATIO / 100;
        gas_token::mint(context, engine, &reward_account, &committee_reward)?;

        // Voter reward accumulators advance at election boundaries.
        if should_refresh_committee(block.index(), n) {
            let voter_reward_each =
                &gas_per_block * VOTER_REWARD_RATIO * 100_000_000i64 / ((m + n) as i64) / 100;
            for (position, (pubkey, votes)) in members.iter().enumerate() {
                if votes.is_positive() {
                    let factor: i64 = if position < m { 2 } else { 1 };
                    let increment = &voter_reward_each * factor / votes;
                    let updated = voter_reward_per_committee(&context.snapshot, pubkey) + increment;
                    context
                        .snapshot
                        .put(&voter_reward_key(pubkey), StorageItem::from_int(&updated));
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        context: &mut EngineContext,
        engine: &mut ExecutionEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<Option<StackItem>> {
        match method {
            "symbol" => Ok(Some(StackItem::from_bytes(b"NEO".to_vec()))),
            "decimals" => Ok(Some(StackItem::from_int(0))),
            "totalSupply" => Ok(Some(StackItem::from_int(TOTAL_AMOUNT))),
            "balanceOf" => {
                let account = to_account(&args[0])?;
                Ok(Some(StackItem::Integer(fungible::balance_of::<
                    NeoAccountState,
                >(
                    &context.snapshot, ID, &account
                ))))
            }
            "transfer" => {
                let from = to_account(&args[0])?;
                let to = to_account(&args[1])?;
                let amount = args[2].to_integer()?;
                let data = args[3].clone();
                let succeeded = fungible::transfer::<NeoAccountState, _>(
                    context,
                    engine,
                    &token_info(),
                    &from,
                    &to,
                    &amount,
                    data,
                    on_balance_changing,
                )?;
                Ok(Some(StackItem::from_bool(succeeded)))
            }
            "unclaimedGas" => {
                let account = to_account(&args[0])?;
                let end = args[1].to_index()? as u32;
                Ok(Some(StackItem::Integer(unclaimed_gas(
                    &context.snapshot,
                    &account,
                    end,
                ))))
            }
            "registerCandidate" => {
                let pubkey = to_pubkey(&args[0])?;
                let account = UInt160::from_script(&neo3_vm::signature_contract_script(
                    &pubkey.encode_compressed(),
                ));
                if !context.check_witness_internal(engine, &account)? {
                    return Ok(Some(StackItem::from_bool(false)));
                }
                context.add_fee(register_price(&context.snapshot))?;
                let mut state =
                    candidate_state(&context.snapshot, &pubkey).unwrap_or_default();
                state.registered = true;
                put_candidate_state(&context.snapshot, &pubkey, &state);
                Ok(Some(StackItem::from_bool(true)))
            }
            "unregisterCandidate" => {
                let pubkey = to_pubkey(&args[0])?;
                let account = UInt160::from_script(&neo3_vm::signature_contract_script(
                    &pubkey.encode_compressed(),
                ));
                if !context.check_witness_internal(engine, &account)? {
                    return Ok(Some(StackItem::from_bool(false)));
                }
                if let Some(mut state) = candidate_state(&context.snapshot, &pubkey) {
                    state.registered = false;
                    put_candidate_state(&context.snapshot, &pubkey, &state);
                }
                Ok(Some(StackItem::from_bool(true)))
            }
            "vote" => {
                let account = to_account(&args[0])?;
                let vote_to = if args[1].is_null() {
                    None
                } else {
                    Some(to_pubkey(&args[1])?)
                };
                let succeeded = vote(context, engine, &account, vote_to)?;
                Ok(Some(StackItem::from_bool(succeeded)))
            }
            "getCandidates" => {
                let prefix = StorageKey::with_prefix(ID, PREFIX_CANDIDATE).to_bytes();
                let entries: Vec<StackItem> = context
                    .snapshot
                    .find(&prefix, SeekDirection::Forward)
                    .map_err(|e| VmError::InvalidOperation(e.to_string()))?
                    .into_iter()
                    .filter_map(|(key, item)| {
                        let pubkey = ECPoint::from_bytes(&key.suffix()[1..]).ok()?;
                        let state = CandidateState::from_storage_item(&item).ok()?;
                        state.registered.then(|| {
                            StackItem::from_struct(vec![
                                StackItem::from_bytes(pubkey.as_bytes().to_vec()),
                                StackItem::Integer(state.votes),
                            ])
                        })
                    })
                    .collect();
                Ok(Some(StackItem::from_array(entries)))
            }
            "getAccountState" => {
                let account = to_account(&args[0])?;
                Ok(Some(
                    fungible::account_state::<NeoAccountState>(&context.snapshot, ID, &account)
                        .map(|state| state.to_stack_item())
                        .unwrap_or(StackItem::Null),
                ))
            }
            "getCommittee" => {
                let mut members: Vec<ECPoint> = committee(&context.snapshot, &context.settings)?
                    .into_iter()
                    .map(|(pubkey, _)| pubkey)
                    .collect();
                members.sort();
                Ok(Some(StackItem::from_array(
                    members
                        .into_iter()
                        .map(|pubkey| StackItem::from_bytes(pubkey.as_bytes().to_vec()))
                        .collect(),
                )))
            }
            "getNextBlockValidators" => {
                let validators = next_block_validators(&context.snapshot, &context.settings)?;
                Ok(Some(StackItem::from_array(
                    validators
                        .into_iter()
                        .map(|pubkey| StackItem::from_bytes(pubkey.as_bytes().to_vec()))
                        .collect(),
                )))
            }
            "getGasPerBlock" => {
                let height = context.current_height();
                Ok(Some(StackItem::Integer(gas_per_block(
                    &context.snapshot,
                    height,
                ))))
            }
            "setGasPerBlock" => {
                let value = i64::try_from(&args[0].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("gas per block outside i64".into()))?;
                if !(0..=10_0000_0000).contains(&value) {
                    return Err(VmError::OutOfRange(format!("gas per block {value}")));
                }
                require_committee_witness(context, engine)?;
                let index = context.current_height() + 1;
                context
                    .snapshot
                    .put(&gas_per_block_key(index), StorageItem::from_i64(value));
                Ok(None)
            }
            "getRegisterPrice" => Ok(Some(StackItem::from_int(register_price(&context.snapshot)))),
            "setRegisterPrice" => {
                let value = i64::try_from(&args[0].to_integer()?)
                    .map_err(|_| VmError::OutOfRange("register price outside i64".into()))?;
                if value <= 0 {
                    return Err(VmError::OutOfRange("register price must be positive".into()));
                }
                require_committee_witness(context, engine)?;
                context.snapshot.put(
                    &StorageKey::with_prefix(ID, PREFIX_REGISTER_PRICE),
                    StorageItem::from_i64(value),
                );
                Ok(None)
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown NeoToken method {other}"
            ))),
        }
    }
}

fn to_account(item: &StackItem) -> VmResult<UInt160> {
    let bytes = item.to_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}

fn to_pubkey(item: &StackItem) -> VmResult<ECPoint> {
    let bytes = item.to_bytes()?;
    ECPoint::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}
