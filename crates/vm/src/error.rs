//! Error types for the virtual machine.

use thiserror::Error;

/// Result alias used throughout the vm crate.
pub type VmResult<T> = Result<T, VmError>;

/// Errors that fault the machine.
///
/// Any of these reaching the execution loop puts the engine into the FAULT
/// state; they are never recoverable from inside the script except through
/// [`VmError::Throw`], which unwinds to the nearest catch handler instead.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// A script failed static validation.
    #[error("bad script: {0}")]
    BadScript(String),

    /// The evaluation stack held fewer items than an instruction needs.
    #[error("stack underflow")]
    StackUnderflow,

    /// An instruction received an operand of the wrong type.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// An out-of-range offset, index or count.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A configured engine limit was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Arithmetic outside the 256-bit integer range.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An operation is not valid in the current machine state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The execution budget ran out.
    #[error("gas exhausted")]
    OutOfGas,

    /// ABORT or ABORTMSG was executed; never catchable.
    #[error("abort: {0}")]
    Abort(String),

    /// A script-level exception travelling to the nearest catch block.
    /// Carried as an error so `?` propagates it to the unwinder.
    #[error("uncaught exception")]
    Throw,

    /// The host rejected a syscall.
    #[error("syscall failed: {0}")]
    Syscall(String),
}
