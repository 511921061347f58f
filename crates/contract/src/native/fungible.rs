//! Shared machinery of the fungible native tokens.

use crate::interop::EngineContext;
use crate::{CallFlags, Interoperable};
use neo3_core::UInt160;
use neo3_persistence::{DataCache, StorageKey};
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::sync::Arc;

/// Storage prefix of the total-supply item.
pub const PREFIX_TOTAL_SUPPLY: u8 = 11;

/// Storage prefix of per-account state.
pub const PREFIX_ACCOUNT: u8 = 20;

/// Identity of a token contract.
pub struct TokenInfo {
    pub id: i32,
    pub hash: UInt160,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Per-account state of a fungible token.
pub trait TokenAccountState: Interoperable + Default {
    fn balance(&self) -> &BigInt;
    fn balance_mut(&mut self) -> &mut BigInt;
}

pub fn account_key(token_id: i32, account: &UInt160) -> StorageKey {
    StorageKey::with_prefix(token_id, PREFIX_ACCOUNT).append(&account.to_array())
}

fn total_supply_key(token_id: i32) -> StorageKey {
    StorageKey::with_prefix(token_id, PREFIX_TOTAL_SUPPLY)
}

pub fn total_supply(snapshot: &Arc<DataCache>, token_id: i32) -> BigInt {
    snapshot
        .try_get(&total_supply_key(token_id))
        .map(|item| item.as_int())
        .unwrap_or_else(BigInt::zero)
}

/// Reads an account's state, if it holds a balance.
pub fn account_state<S: TokenAccountState>(
    snapshot: &Arc<DataCache>,
    token_id: i32,
    account: &UInt160,
) -> Option<S> {
    let item = snapshot.try_get(&account_key(token_id, account))?;
    S::from_storage_item(&item).ok()
}

pub fn balance_of<S: TokenAccountState>(
    snapshot: &Arc<DataCache>,
    token_id: i32,
    account: &UInt160,
) -> BigInt {
    account_state::<S>(snapshot, token_id, account)
        .map(|state| state.balance().clone())
        .unwrap_or_else(BigInt::zero)
}

/// Applies `delta` to an account, invoking `before` with the loaded state
/// before the balance moves. Zero-balance accounts leave storage.
pub fn apply_balance_delta<S, F>(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    token: &TokenInfo,
    account: &UInt160,
    delta: &BigInt,
    mut before: F,
) -> VmResult<()>
where
    S: TokenAccountState,
    F: FnMut(&mut EngineContext, &mut ExecutionEngine, &UInt160, &mut S, &BigInt) -> VmResult<()>,
{
    let key = account_key(token.id, account);
    let mut state: S = match context.snapshot.try_get(&key) {
        Some(item) => S::from_storage_item(&item)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
        None => {
            if delta.is_negative() {
                return Err(VmError::InvalidOperation(format!(
                    "account {account} holds no {}",
                    token.symbol
                )));
            }
            if delta.is_zero() {
                return Ok(());
            }
            S::default()
        }
    };
    before(context, engine, account, &mut state, delta)?;

    let new_balance = state.balance() + delta;
    if new_balance.is_negative() {
        return Err(VmError::InvalidOperation(format!(
            "insufficient {} balance of {account}",
            token.symbol
        )));
    }
    if new_balance.is_zero() {
        context.snapshot.delete(&key);
        return Ok(());
    }
    *state.balance_mut() = new_balance;
    let item = state
        .to_storage_item()
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    context.snapshot.put(&key, item);
    Ok(())
}

/// Mints outside any VM execution (genesis initialization): balance and
/// total supply move, hooks and callbacks do not run.
pub fn genesis_mint<S: TokenAccountState>(
    context: &mut EngineContext,
    token: &TokenInfo,
    account: &UInt160,
    amount: &BigInt,
) -> VmResult<()> {
    if amount.is_negative() {
        return Err(VmError::InvalidOperation("cannot mint a negative amount".into()));
    }
    let key = account_key(token.id, account);
    let mut state: S = match context.snapshot.try_get(&key) {
        Some(item) => S::from_storage_item(&item)
            .map_err(|e| VmError::InvalidOperation(e.to_string()))?,
        None => S::default(),
    };
    let new_balance = state.balance() + amount;
    *state.balance_mut() = new_balance;
    let item = state
        .to_storage_item()
        .map_err(|e| VmError::InvalidOperation(e.to_string()))?;
    context.snapshot.put(&key, item);
    adjust_total_supply(context, token.id, amount)
}

fn adjust_total_supply(
    context: &mut EngineContext,
    token_id: i32,
    delta: &BigInt,
) -> VmResult<()> {
    let key = total_supply_key(token_id);
    let current = total_supply(&context.snapshot, token_id);
    let updated = &current + delta;
    if updated.is_negative() {
        return Err(VmError::InvalidOperation("total supply underflow".into()));
    }
    context
        .snapshot
        .put(&key, neo3_persistence::StorageItem::from_int(&updated));
    Ok(())
}

/// Creates tokens in `account`, emitting `Transfer(null, account, amount)`.
pub fn mint<S, F>(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    token: &TokenInfo,
    account: &UInt160,
    amount: &BigInt,
    before: F,
) -> VmResult<()>
where
    S: TokenAccountState,
    F: FnMut(&mut EngineContext, &mut ExecutionEngine, &UInt160, &mut S, &BigInt) -> VmResult<()>,
{
    if amount.is_negative() {
        return Err(VmError::InvalidOperation("cannot mint a negative amount".into()));
    }
    if amount.is_zero() {
        return Ok(());
    }
    apply_balance_delta(context, engine, token, account, amount, before)?;
    adjust_total_supply(context, token.id, amount)?;
    emit_transfer(context, token, None, Some(account), amount);
    Ok(())
}

/// Destroys tokens held by `account`, emitting `Transfer(account, null, amount)`.
pub fn burn<S, F>(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    token: &TokenInfo,
    account: &UInt160,
    amount: &BigInt,
    before: F,
) -> VmResult<()>
where
    S: TokenAccountState,
    F: FnMut(&mut EngineContext, &mut ExecutionEngine, &UInt160, &mut S, &BigInt) -> VmResult<()>,
{
    if amount.is_negative() {
        return Err(VmError::InvalidOperation("cannot burn a negative amount".into()));
    }
    if amount.is_zero() {
        return Ok(());
    }
    apply_balance_delta(context, engine, token, account, &-amount, before)?;
    adjust_total_supply(context, token.id, &-amount)?;
    emit_transfer(context, token, Some(account), None, amount);
    Ok(())
}

/// The NEP-17 transfer: witness check, balance moves, event, recipient
/// callback.
#[allow(clippy::too_many_arguments)]
pub fn transfer<S, F>(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    token: &TokenInfo,
    from: &UInt160,
    to: &UInt160,
    amount: &BigInt,
    data: StackItem,
    mut before: F,
) -> VmResult<bool>
where
    S: TokenAccountState,
    F: FnMut(&mut EngineContext, &mut ExecutionEngine, &UInt160, &mut S, &BigInt) -> VmResult<()>,
{
    if amount.is_negative() {
        return Err(VmError::InvalidOperation("negative transfer amount".into()));
    }
    // The sender authorizes unless the caller IS the sender's contract.
    let authorized = context.current_state(engine)?.calling_script_hash.as_ref() == Some(from)
        || context.check_witness_internal(engine, from)?;
    if !authorized {
        return Ok(false);
    }
    if balance_of::<S>(&context.snapshot, token.id, from) < *amount {
        return Ok(false);
    }
    if !amount.is_zero() && from != to {
        apply_balance_delta(context, engine, token, from, &-amount, &mut before)?;
        apply_balance_delta(context, engine, token, to, amount, &mut before)?;
    }
    emit_transfer(context, token, Some(from), Some(to), amount);

    // Contract recipients get the NEP-17 payment callback.
    if let Some(recipient) = super::contract_management::get_contract(&context.snapshot, to) {
        if recipient.manifest.abi.get_method("onNEP17Payment", 3).is_some() {
            EngineContext::load_contract_method(
                context,
                engine,
                &recipient,
                "onNEP17Payment",
                vec![
                    StackItem::from_bytes(from.to_array().to_vec()),
                    StackItem::Integer(amount.clone()),
                    data,
                ],
                CallFlags::ALL,
                Some(token.hash),
                false,
            )?;
        }
    }
    Ok(true)
}

fn emit_transfer(
    context: &mut EngineContext,
    token: &TokenInfo,
    from: Option<&UInt160>,
    to: Option<&UInt160>,
    amount: &BigInt,
) {
    let encode = |account: Option<&UInt160>| match account {
        Some(account) => StackItem::from_bytes(account.to_array().to_vec()),
        None => StackItem::Null,
    };
    context.emit_native_notification(
        token.hash,
        "Transfer",
        StackItem::from_array(vec![
            encode(from),
            encode(to),
            StackItem::Integer(amount.clone()),
        ]),
    );
}
