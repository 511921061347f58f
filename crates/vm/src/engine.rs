// Copyright (C) 2015-2025 The Neo Project.
//
// engine.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The execution engine: instruction loop, flow control and exception
//! unwinding. The remaining opcode families live in the `ops_*` modules.

use crate::{
    EvaluationStack, ExceptionHandlingContext, ExceptionHandlingState, ExecutionContext,
    ExecutionEngineLimits, Instruction, OpCode, ReferenceCounter, Script, StackItem, VmError,
    VmResult,
};
use num_bigint::BigInt;
use std::rc::Rc;

/// The machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    /// Running, or ready to run.
    None,
    /// Loaded and paused before the first instruction.
    Break,
    /// Completed successfully; results are on the result stack.
    Halt,
    /// Completed with an error; no results are produced.
    Fault,
}

/// The host side of the machine: syscalls, per-instruction accounting and
/// method-token resolution.
pub trait InteropHost {
    /// Handles a `SYSCALL` by its 32-bit descriptor hash.
    fn syscall(&mut self, engine: &mut ExecutionEngine, hash: u32) -> VmResult<()>;

    /// Runs before every instruction; the place to charge gas.
    fn pre_execute(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Handles `CALLT` by method-token index.
    fn load_token(&mut self, _engine: &mut ExecutionEngine, _token: u16) -> VmResult<()> {
        Err(VmError::InvalidOperation(
            "method tokens are not supported by this host".into(),
        ))
    }
}

/// A host that rejects every syscall; sufficient for pure scripts.
pub struct NullHost;

impl InteropHost for NullHost {
    fn syscall(&mut self, _engine: &mut ExecutionEngine, hash: u32) -> VmResult<()> {
        Err(VmError::Syscall(format!("no handler for syscall {hash:#010x}")))
    }
}

/// The virtual machine.
pub struct ExecutionEngine {
    state: VMState,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: EvaluationStack,
    reference_counter: ReferenceCounter,
    limits: ExecutionEngineLimits,
    uncaught_exception: Option<StackItem>,
    fault_message: Option<String>,
    /// Set by instructions that position the pointer themselves.
    jumping: bool,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        Self {
            state: VMState::Break,
            invocation_stack: Vec::new(),
            result_stack: EvaluationStack::new(reference_counter.clone()),
            reference_counter,
            limits,
            uncaught_exception: None,
            fault_message: None,
            jumping: false,
        }
    }

    pub fn state(&self) -> VMState {
        self.state
    }

    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    pub fn result_stack(&self) -> &EvaluationStack {
        &self.result_stack
    }

    pub fn result_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.result_stack
    }

    /// The exception item that faulted the machine, if any.
    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    /// Human-readable description of the fault, if any.
    pub fn fault_message(&self) -> Option<&str> {
        self.fault_message.as_deref()
    }

    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// The executing context (top of the invocation stack).
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// The first loaded context (bottom of the invocation stack).
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// Loads a fresh script as a new context with its own stack.
    pub fn load_script(&mut self, script: Script, rvcount: i32, offset: usize) -> VmResult<()> {
        let mut context =
            ExecutionContext::new(Rc::new(script), rvcount, &self.reference_counter);
        context.jump_to(offset)?;
        self.load_context(context)
    }

    /// Pushes a prepared context onto the invocation stack.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::LimitExceeded(format!(
                "invocation stack exceeds {}",
                self.limits.max_invocation_stack_size
            )));
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    /// Runs until the machine halts or faults.
    pub fn execute(&mut self, host: &mut dyn InteropHost) -> VMState {
        if self.state == VMState::Break {
            self.state = VMState::None;
        }
        while self.state == VMState::None {
            self.execute_next(host);
        }
        self.state
    }

    /// Executes one instruction (or unwinds one exception step).
    pub fn execute_next(&mut self, host: &mut dyn InteropHost) {
        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
            return;
        }
        match self.execute_instruction(host) {
            Ok(()) => {}
            Err(VmError::Throw) => {
                if let Err(error) = self.handle_exception() {
                    self.fault(error);
                }
            }
            Err(error) => self.fault(error),
        }
    }

    fn execute_instruction(&mut self, host: &mut dyn InteropHost) -> VmResult<()> {
        let context_index = self.invocation_stack.len() - 1;
        let instruction = match self.invocation_stack[context_index].current_instruction()? {
            Some(instruction) => instruction,
            None => {
                // Past the script end: implicit RET.
                self.execute_ret()?;
                return self.post_execute();
            }
        };

        host.pre_execute(self, &instruction)?;
        self.jumping = false;
        self.dispatch(host, &instruction)?;
        if !self.jumping {
            if let Some(context) = self.invocation_stack.get_mut(context_index) {
                context.move_next()?;
            }
        }
        self.post_execute()
    }

    fn post_execute(&mut self) -> VmResult<()> {
        if self.reference_counter.count() > self.limits.max_stack_size {
            if self.reference_counter.needs_sweep() {
                let mut roots: Vec<StackItem> = self.result_stack.iter().cloned().collect();
                for context in &self.invocation_stack {
                    roots.extend(context.reference_roots());
                }
                self.reference_counter.recount(roots.iter());
            }
            if self.reference_counter.count() > self.limits.max_stack_size {
                return Err(VmError::LimitExceeded(format!(
                    "{} stack items exceed the limit of {}",
                    self.reference_counter.count(),
                    self.limits.max_stack_size
                )));
            }
        }
        Ok(())
    }

    fn fault(&mut self, error: VmError) {
        self.fault_message = Some(error.to_string());
        self.state = VMState::Fault;
    }

    // ---- stack helpers used by every opcode family ----

    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("no context to push onto".into()))?;
        context.evaluation_stack.borrow_mut().push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<StackItem> {
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("no context to pop from".into()))?;
        let item = context.evaluation_stack.borrow_mut().pop()?;
        Ok(item)
    }

    /// Pops an item and interprets it as an integer.
    pub fn pop_int(&mut self) -> VmResult<BigInt> {
        self.pop()?.to_integer()
    }

    /// Pops an item and interprets it as a 31-bit index.
    pub fn pop_index(&mut self) -> VmResult<usize> {
        self.pop()?.to_index()
    }

    pub fn peek(&self, depth: usize) -> VmResult<StackItem> {
        let context = self
            .current_context()
            .ok_or(VmError::InvalidOperation("no context to peek".into()))?;
        let stack = context.evaluation_stack.borrow();
        Ok(stack.peek(depth)?.clone())
    }

    /// Enforces the single-item byte-size limit.
    pub fn check_item_size(&self, size: usize) -> VmResult<()> {
        if size > self.limits.max_item_size {
            return Err(VmError::LimitExceeded(format!(
                "item of {size} bytes exceeds the limit of {}",
                self.limits.max_item_size
            )));
        }
        Ok(())
    }

    // ---- dispatch ----

    fn dispatch(&mut self, host: &mut dyn InteropHost, instruction: &Instruction) -> VmResult<()> {
        use OpCode::*;
        match instruction.opcode() {
            // Constants
            PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushInt128 | PushInt256 => {
                self.push(StackItem::Integer(BigInt::from_signed_bytes_le(
                    instruction.operand(),
                )))
            }
            PushT => self.push(StackItem::from_bool(true)),
            PushF => self.push(StackItem::from_bool(false)),
            PushA => {
                let target = instruction.jump_target_long()?;
                self.push(StackItem::Pointer(target))
            }
            PushNull => self.push(StackItem::Null),
            PushData1 | PushData2 | PushData4 => {
                self.check_item_size(instruction.operand().len())?;
                self.push(StackItem::from_bytes(instruction.operand().to_vec()))
            }
            PushM1 | Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8
            | Push9 | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 => {
                let value = instruction.opcode() as u8 as i32 - Push0 as u8 as i32;
                self.push(StackItem::from_int(value))
            }

            // Flow control
            Nop => Ok(()),
            Jmp => self.branch_unconditional(instruction.jump_target_short()?),
            JmpL => self.branch_unconditional(instruction.jump_target_long()?),
            JmpIf | JmpIfL => {
                let condition = self.pop()?.to_boolean();
                self.branch_conditional(instruction, condition)
            }
            JmpIfNot | JmpIfNotL => {
                let condition = self.pop()?.to_boolean();
                self.branch_conditional(instruction, !condition)
            }
            JmpEq | JmpEqL => self.branch_compare(instruction, |a, b| a == b),
            JmpNe | JmpNeL => self.branch_compare(instruction, |a, b| a != b),
            JmpGt | JmpGtL => self.branch_compare(instruction, |a, b| a > b),
            JmpGe | JmpGeL => self.branch_compare(instruction, |a, b| a >= b),
            JmpLt | JmpLtL => self.branch_compare(instruction, |a, b| a < b),
            JmpLe | JmpLeL => self.branch_compare(instruction, |a, b| a <= b),
            Call => {
                let target = instruction.jump_target_short()?;
                self.execute_call(target)
            }
            CallL => {
                let target = instruction.jump_target_long()?;
                self.execute_call(target)
            }
            CallA => {
                let target = match self.pop()? {
                    StackItem::Pointer(position) => position,
                    other => {
                        return Err(VmError::InvalidType(format!(
                            "CALLA expects a pointer, got {:?}",
                            other.item_type()
                        )))
                    }
                };
                self.execute_call(target)
            }
            CallT => host.load_token(self, instruction.operand_u16()),
            Abort => Err(VmError::Abort("ABORT is executed".into())),
            Assert => {
                if !self.pop()?.to_boolean() {
                    return Err(VmError::Abort("ASSERT failed".into()));
                }
                Ok(())
            }
            AbortMsg => {
                let message = String::from_utf8_lossy(&self.pop()?.to_bytes()?).into_owned();
                Err(VmError::Abort(message))
            }
            AssertMsg => {
                let message = String::from_utf8_lossy(&self.pop()?.to_bytes()?).into_owned();
                if !self.pop()?.to_boolean() {
                    return Err(VmError::Abort(format!("ASSERT failed: {message}")));
                }
                Ok(())
            }
            Throw => {
                let exception = self.pop()?;
                self.uncaught_exception = Some(exception);
                Err(VmError::Throw)
            }
            Try => {
                let catch = instruction.operand_i8(0) as i32;
                let finally = instruction.operand_i8(1) as i32;
                self.execute_try(instruction, catch, finally)
            }
            TryL => {
                let catch = instruction.operand_i32(0);
                let finally = instruction.operand_i32(4);
                self.execute_try(instruction, catch, finally)
            }
            EndTry => {
                let target = instruction.jump_target_short()?;
                self.execute_end_try(target)
            }
            EndTryL => {
                let target = instruction.jump_target_long()?;
                self.execute_end_try(target)
            }
            EndFinally => self.execute_end_finally(),
            Ret => self.execute_ret(),
            Syscall => host.syscall(self, instruction.operand_u32()),

            // Stack manipulation
            Depth | Drop | Nip | XDrop | Clear | Dup | Over | Pick | Tuck | Swap | Rot | Roll
            | Reverse3 | Reverse4 | ReverseN => self.execute_stack_op(instruction.opcode()),

            // Slots
            InitSSlot | InitSlot | LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5
            | LdSFld6 | LdSFld | StSFld0 | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5
            | StSFld6 | StSFld | LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6
            | LdLoc | StLoc0 | StLoc1 | StLoc2 | StLoc3 | StLoc4 | StLoc5 | StLoc6 | StLoc
            | LdArg0 | LdArg1 | LdArg2 | LdArg3 | LdArg4 | LdArg5 | LdArg6 | LdArg | StArg0
            | StArg1 | StArg2 | StArg3 | StArg4 | StArg5 | StArg6 | StArg => {
                self.execute_slot_op(instruction)
            }

            // Splice
            NewBuffer | MemCpy | Cat | SubStr | Left | Right => {
                self.execute_splice_op(instruction.opcode())
            }

            // Bitwise, arithmetic, comparison
            Invert | And | Or | Xor | Equal | NotEqual | Sign | Abs | Negate | Inc | Dec | Add
            | Sub | Mul | Div | Mod | Pow | Sqrt | ModMul | ModPow | Shl | Shr | Not | BoolAnd
            | BoolOr | Nz | NumEqual | NumNotEqual | Lt | Le | Gt | Ge | Min | Max | Within => {
                self.execute_numeric_op(instruction.opcode())
            }

            // Compound types
            PackMap | PackStruct | Pack | Unpack | NewArray0 | NewArray | NewArrayT
            | NewStruct0 | NewStruct | NewMap | Size | HasKey | Keys | Values | PickItem
            | Append | SetItem | ReverseItems | Remove | ClearItems | PopItem => {
                self.execute_compound_op(instruction)
            }

            // Types
            IsNull | IsType | Convert => self.execute_type_op(instruction),
        }
    }

    // ---- flow control ----

    fn branch_unconditional(&mut self, target: usize) -> VmResult<()> {
        self.jump(target)
    }

    fn branch_conditional(&mut self, instruction: &Instruction, taken: bool) -> VmResult<()> {
        if taken {
            let target = self.resolve_target(instruction)?;
            self.jump(target)?;
        }
        Ok(())
    }

    fn branch_compare(
        &mut self,
        instruction: &Instruction,
        compare: fn(&BigInt, &BigInt) -> bool,
    ) -> VmResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.branch_conditional(instruction, compare(&a, &b))
    }

    fn resolve_target(&self, instruction: &Instruction) -> VmResult<usize> {
        match instruction.opcode().operand_size() {
            crate::OperandSize::Fixed(1) => instruction.jump_target_short(),
            _ => instruction.jump_target_long(),
        }
    }

    fn jump(&mut self, target: usize) -> VmResult<()> {
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("no context to jump in".into()))?;
        context.jump_to(target)?;
        self.jumping = true;
        Ok(())
    }

    /// `CALL`: a clone of the current context starting at `target`, sharing
    /// the evaluation stack and static fields.
    fn execute_call(&mut self, target: usize) -> VmResult<()> {
        let context = self
            .current_context()
            .ok_or(VmError::InvalidOperation("no context to call from".into()))?;
        let mut callee = context.call_clone(target);
        callee.jump_to(target)?;
        self.load_context(callee)
        // Not a jump: the caller's pointer advances past the CALL while the
        // callee starts executing at `target`.
    }

    /// `RET`: unload the current context, moving results to the caller or,
    /// for the last context, to the result stack.
    pub(crate) fn execute_ret(&mut self) -> VmResult<()> {
        let mut context = self
            .invocation_stack
            .pop()
            .ok_or(VmError::InvalidOperation("RET without a context".into()))?;
        self.jumping = true;

        match self.invocation_stack.last_mut() {
            Some(caller) => {
                if !Rc::ptr_eq(&context.evaluation_stack, &caller.evaluation_stack) {
                    if context.rvcount >= 0
                        && context.evaluation_stack.borrow().len() != context.rvcount as usize
                    {
                        return Err(VmError::InvalidOperation(
                            "result count does not match the evaluation stack".into(),
                        ));
                    }
                    context
                        .evaluation_stack
                        .borrow_mut()
                        .drain_to(&mut caller.evaluation_stack.borrow_mut());
                }
            }
            None => {
                if context.rvcount >= 0
                    && context.evaluation_stack.borrow().len() != context.rvcount as usize
                {
                    return Err(VmError::InvalidOperation(
                        "result count does not match the evaluation stack".into(),
                    ));
                }
                context
                    .evaluation_stack
                    .borrow_mut()
                    .drain_to(&mut self.result_stack);
                self.state = VMState::Halt;
            }
        }
        context.release();
        Ok(())
    }

    fn execute_try(
        &mut self,
        instruction: &Instruction,
        catch_offset: i32,
        finally_offset: i32,
    ) -> VmResult<()> {
        if catch_offset == 0 && finally_offset == 0 {
            return Err(VmError::BadScript(
                "TRY with neither catch nor finally".into(),
            ));
        }
        let catch_pointer = (catch_offset != 0)
            .then(|| instruction.checked_target(catch_offset))
            .transpose()?;
        let finally_pointer = (finally_offset != 0)
            .then(|| instruction.checked_target(finally_offset))
            .transpose()?;

        let max_depth = self.limits.max_try_nesting_depth;
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("TRY without a context".into()))?;
        if context.try_stack.len() >= max_depth {
            return Err(VmError::LimitExceeded(format!(
                "try nesting exceeds {max_depth}"
            )));
        }
        context
            .try_stack
            .push(ExceptionHandlingContext::new(catch_pointer, finally_pointer));
        Ok(())
    }

    fn execute_end_try(&mut self, target: usize) -> VmResult<()> {
        let context = self
            .current_context_mut()
            .ok_or(VmError::InvalidOperation("ENDTRY without a context".into()))?;
        let try_context = context
            .try_stack
            .last_mut()
            .ok_or(VmError::InvalidOperation("ENDTRY without a TRY".into()))?;
        if try_context.state == ExceptionHandlingState::Finally {
            return Err(VmError::InvalidOperation(
                "ENDTRY inside a finally block".into(),
            ));
        }
        if try_context.pending_finally() {
            // Run the finally block first, then continue at the target.
            try_context.state = ExceptionHandlingState::Finally;
            try_context.end_pointer = Some(target);
            let finally_pointer = try_context
                .finally_pointer
                .expect("pending_finally implies a finally pointer");
            context.jump_to(finally_pointer)?;
        } else {
            context.try_stack.pop();
            context.jump_to(target)?;
        }
        self.jumping = true;
        Ok(())
    }

    fn execute_end_finally(&mut self) -> VmResult<()> {
        let context = self.current_context_mut().ok_or(VmError::InvalidOperation(
            "ENDFINALLY without a context".into(),
        ))?;
        let try_context = context
            .try_stack
            .pop()
            .ok_or(VmError::InvalidOperation("ENDFINALLY without a TRY".into()))?;
        if try_context.state != ExceptionHandlingState::Finally {
            return Err(VmError::InvalidOperation(
                "ENDFINALLY outside a finally block".into(),
            ));
        }
        if self.uncaught_exception.is_some() {
            // The finally ran during unwinding; resume the exception.
            return Err(VmError::Throw);
        }
        let end_pointer = try_context.end_pointer.ok_or(VmError::InvalidOperation(
            "finally block has no continuation".into(),
        ))?;
        self.jump(end_pointer)
    }

    /// Routes a pending exception to the nearest handler, running finally
    /// blocks on the way out.
    fn handle_exception(&mut self) -> VmResult<()> {
        while let Some(context) = self.invocation_stack.last_mut() {
            enum Unwind {
                Catch(usize),
                Finally(usize),
            }
            let mut action = None;
            while let Some(try_context) = context.try_stack.last_mut() {
                if try_context.can_catch() {
                    try_context.state = ExceptionHandlingState::Catch;
                    let pointer = try_context
                        .catch_pointer
                        .expect("can_catch implies a catch pointer");
                    action = Some(Unwind::Catch(pointer));
                    break;
                }
                if try_context.pending_finally() {
                    try_context.state = ExceptionHandlingState::Finally;
                    let pointer = try_context
                        .finally_pointer
                        .expect("pending_finally implies a finally pointer");
                    action = Some(Unwind::Finally(pointer));
                    break;
                }
                context.try_stack.pop();
            }
            match action {
                Some(Unwind::Catch(pointer)) => {
                    context.jump_to(pointer)?;
                    let exception = self
                        .uncaught_exception
                        .take()
                        .ok_or(VmError::InvalidOperation("no exception to catch".into()))?;
                    context.evaluation_stack.borrow_mut().push(exception);
                    self.jumping = true;
                    return Ok(());
                }
                Some(Unwind::Finally(pointer)) => {
                    context.jump_to(pointer)?;
                    self.jumping = true;
                    return Ok(());
                }
                None => {
                    let mut unwound = self
                        .invocation_stack
                        .pop()
                        .expect("loop condition guarantees a context");
                    unwound.evaluation_stack.borrow_mut().clear();
                    unwound.release();
                }
            }
        }
        Err(VmError::InvalidOperation("uncaught exception".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptBuilder;

    fn run(script: Vec<u8>) -> (VMState, ExecutionEngine) {
        let mut engine = ExecutionEngine::new();
        engine
            .load_script(Script::new(script).expect("valid test script"), -1, 0)
            .unwrap();
        let state = engine.execute(&mut NullHost);
        (state, engine)
    }

    #[test]
    fn add_halts_with_result() {
        // PUSH1 PUSH2 ADD RET
        let (state, engine) = run(vec![0x11, 0x12, 0x9E, 0x40]);
        assert_eq!(state, VMState::Halt);
        assert_eq!(
            engine.result_stack().peek(0).unwrap().to_integer().unwrap(),
            3.into()
        );
    }

    #[test]
    fn division_by_zero_faults() {
        // PUSH1 PUSH0 DIV
        let (state, engine) = run(vec![0x11, 0x10, 0xA1]);
        assert_eq!(state, VMState::Fault);
        assert!(engine.fault_message().unwrap().contains("division"));
    }

    #[test]
    fn abort_is_not_catchable() {
        let mut builder = ScriptBuilder::new();
        // TRY with a catch that would swallow anything catchable.
        builder.emit_try(3, 0);
        builder.emit(OpCode::Abort);
        builder.emit(OpCode::Ret);
        let (state, _) = run(builder.into_bytes());
        assert_eq!(state, VMState::Fault);
    }

    #[test]
    fn throw_without_try_faults_preserving_the_exception() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(42);
        builder.emit(OpCode::Throw);
        let (state, engine) = run(builder.into_bytes());
        assert_eq!(state, VMState::Fault);
        assert_eq!(
            engine.uncaught_exception().unwrap().to_integer().unwrap(),
            42.into()
        );
    }

    #[test]
    fn call_shares_the_evaluation_stack() {
        // PUSH2 PUSH3 CALL +4 RET ; ADD RET
        let script = vec![0x12, 0x13, 0x34, 0x04, 0x40, 0x9E, 0x40];
        let (state, engine) = run(script);
        assert_eq!(state, VMState::Halt);
        assert_eq!(
            engine.result_stack().peek(0).unwrap().to_integer().unwrap(),
            5.into()
        );
    }

    #[test]
    fn try_catch_recovers_from_throw() {
        let mut builder = ScriptBuilder::new();
        // TRY catch=+6: PUSH1 THROW ; catch: drop exception, PUSH7 ; RET
        builder.emit_try(6, 0); // 3 bytes, catch at offset 6 from TRY
        builder.emit_push_int(1); // 1 byte (PUSH1)
        builder.emit(OpCode::Throw); // offset 4
        builder.emit(OpCode::Nop); // offset 5
        builder.emit(OpCode::Drop); // offset 6: catch handler, drops exception
        builder.emit_push_int(7);
        builder.emit(OpCode::Ret);
        let (state, engine) = run(builder.into_bytes());
        assert_eq!(state, VMState::Halt);
        assert_eq!(
            engine.result_stack().peek(0).unwrap().to_integer().unwrap(),
            7.into()
        );
    }
}
