//! GasToken: the divisible utility token fees are paid in.

use super::fungible::{self, TokenAccountState, TokenInfo};
use super::{NativeContract, NativeMethod};
use crate::interop::EngineContext;
use crate::manifest::ContractParameterType;
use crate::{ContractError, ContractResult, Interoperable};
use neo3_core::UInt160;
use neo3_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::Zero;

pub const ID: i32 = -6;

pub const DECIMALS: u8 = 8;

/// The divisible fee token.
pub struct GasToken;

fn token_info() -> TokenInfo {
    TokenInfo {
        id: ID,
        hash: super::native_hash("GasToken"),
        symbol: "GAS",
        decimals: DECIMALS,
    }
}

/// Plain balance-only account state.
#[derive(Debug, Clone, Default)]
pub struct GasAccountState {
    pub balance: BigInt,
}

impl Interoperable for GasAccountState {
    fn from_stack_item(item: &StackItem) -> ContractResult<Self> {
        let StackItem::Struct(fields) = item else {
            return Err(ContractError::invalid_format("account state must be a struct"));
        };
        let fields = fields.borrow();
        let balance = fields
            .first()
            .ok_or_else(|| ContractError::invalid_format("empty account state"))?
            .to_integer()
            .map_err(|e| ContractError::invalid_format(e.to_string()))?;
        Ok(Self { balance })
    }

    fn to_stack_item(&self) -> StackItem {
        StackItem::from_struct(vec![StackItem::Integer(self.balance.clone())])
    }
}

impl TokenAccountState for GasAccountState {
    fn balance(&self) -> &BigInt {
        &self.balance
    }

    fn balance_mut(&mut self) -> &mut BigInt {
        &mut self.balance
    }
}

fn no_hook(
    _context: &mut EngineContext,
    _engine: &mut ExecutionEngine,
    _account: &UInt160,
    _state: &mut GasAccountState,
    _delta: &BigInt,
) -> VmResult<()> {
    Ok(())
}

/// Mints GAS outside user transactions (rewards, genesis).
pub fn mint(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    account: &UInt160,
    amount: &BigInt,
) -> VmResult<()> {
    fungible::mint::<GasAccountState, _>(context, engine, &token_info(), account, amount, no_hook)
}

/// Burns GAS, e.g. consumed fees.
pub fn burn(
    context: &mut EngineContext,
    engine: &mut ExecutionEngine,
    account: &UInt160,
    amount: &BigInt,
) -> VmResult<()> {
    fungible::burn::<GasAccountState, _>(context, engine, &token_info(), account, amount, no_hook)
}

/// The GAS balance of an account in datoshi.
pub fn balance_of(snapshot: &std::sync::Arc<neo3_persistence::DataCache>, account: &UInt160) -> BigInt {
    fungible::balance_of::<GasAccountState>(snapshot, ID, account)
}

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
];

impl NativeContract for GasToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "GasToken"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn initialize(&self, context: &mut EngineContext) -> VmResult<()> {
        // The premined supply goes to the standby validators' BFT address.
        let genesis_account = super::neo_token::genesis_bft_address(&context.settings)?;
        let amount = BigInt::from(context.settings.initial_gas_distribution);
        // No engine is live during genesis initialization; mint directly.
        fungible::genesis_mint::<GasAccountState>(
            context,
            &token_info(),
            &genesis_account,
            &amount,
        )?;
        context.emit_native_notification(
            token_info().hash,
            "Transfer",
            StackItem::from_array(vec![
                StackItem::Null,
                StackItem::from_bytes(genesis_account.to_array().to_vec()),
                StackItem::Integer(amount),
            ]),
        );
        Ok(())
    }

    fn on_persist(&self, context: &mut EngineContext, engine: &mut ExecutionEngine) -> VmResult<()> {
        let block = context
            .persisting_block
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperation("OnPersist without a block".into()))?
            .clone();
        let mut network_fees = BigInt::zero();
        for tx in &block.transactions {
            let total = BigInt::from(tx.system_fee()) + BigInt::from(tx.network_fee());
            burn(context, engine, &tx.sender(), &total)?;
            network_fees += BigInt::from(tx.network_fee());
        }
        if !network_fees.is_zero() {
            // The proposer collects the block's network fees.
            let primary = super::neo_token::primary_account(
                &context.snapshot,
                &context.settings,
                block.header.primary_index,
            )?;
            mint(context, engine, &primary, &network_fees)?;
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
            "symbol" => Ok(Some(StackItem::from_bytes(b"GAS".to_vec()))),
            "decimals" => Ok(Some(StackItem::from_int(DECIMALS as i64))),
            "totalSupply" => Ok(Some(StackItem::Integer(fungible::total_supply(
                &context.snapshot,
                ID,
            )))),
            "balanceOf" => {
                let account = to_account(&args[0])?;
                Ok(Some(StackItem::Integer(balance_of(
                    &context.snapshot,
                    &account,
                ))))
            }
            "transfer" => {
                let from = to_account(&args[0])?;
                let to = to_account(&args[1])?;
                let amount = args[2].to_integer()?;
                let data = args[3].clone();
                let succeeded = fungible::transfer::<GasAccountState, _>(
                    context,
                    engine,
                    &token_info(),
                    &from,
                    &to,
                    &amount,
                    data,
                    no_hook,
                )?;
                Ok(Some(StackItem::from_bool(succeeded)))
            }
            other => Err(VmError::InvalidOperation(format!(
                "unknown GasToken method {other}"
            ))),
        }
    }
}

fn to_account(item: &StackItem) -> VmResult<UInt160> {
    let bytes = item.to_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| VmError::InvalidOperation(e.to_string()))
}
