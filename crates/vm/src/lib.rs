//! The deterministic, stack-based virtual machine.
//!
//! Scripts are validated up front, then executed instruction by instruction
//! against an invocation stack of [`ExecutionContext`]s. The host hooks in
//! through [`InteropHost`] for syscalls and gas accounting; everything else
//! is self-contained and strictly deterministic.

mod engine;
mod error;
mod evaluation_stack;
mod exception;
mod execution_context;
mod instruction;
mod limits;
mod op_code;
mod ops_compound;
mod ops_numeric;
mod ops_slot;
mod ops_splice;
mod ops_stack;
mod ops_types;
mod reference_counter;
// slot storage lives with the execution context
mod script;
mod script_builder;
mod stack_item;
mod templates;

pub use engine::{ExecutionEngine, InteropHost, NullHost, VMState};
pub use error::{VmError, VmResult};
pub use evaluation_stack::EvaluationStack;
pub use exception::{ExceptionHandlingContext, ExceptionHandlingState};
pub use execution_context::{ExecutionContext, Slot};
pub use instruction::Instruction;
pub use limits::ExecutionEngineLimits;
pub use op_code::{OpCode, OperandSize};
pub use reference_counter::ReferenceCounter;
pub use script::Script;
pub use script_builder::ScriptBuilder;
pub use stack_item::{MapKey, StackItem, StackItemType};
pub use templates::{
    is_multisig_contract, is_signature_contract, multisig_contract_script,
    signature_contract_script, MultisigTemplate, CHECKMULTISIG_SYSCALL, CHECKSIG_SYSCALL,
};
