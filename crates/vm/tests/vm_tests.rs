//! Behavioral tests for the execution engine.

use neo3_vm::{
    ExecutionEngine, NullHost, OpCode, Script, ScriptBuilder, StackItem, StackItemType, VMState,
};

fn run_script(bytes: Vec<u8>) -> (VMState, ExecutionEngine) {
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(Script::new(bytes).expect("script must validate"), -1, 0)
        .expect("load");
    let state = engine.execute(&mut NullHost);
    (state, engine)
}

fn run_builder(build: impl FnOnce(&mut ScriptBuilder)) -> (VMState, ExecutionEngine) {
    let mut builder = ScriptBuilder::new();
    build(&mut builder);
    run_script(builder.into_bytes())
}

fn top_int(engine: &ExecutionEngine) -> i64 {
    let value = engine
        .result_stack()
        .peek(0)
        .expect("result")
        .to_integer()
        .expect("integer");
    i64::try_from(&value).expect("fits i64")
}

// ---- SUBSTR boundary policy ----

fn substr(data: &[u8], index: i64, count: i64) -> (VMState, ExecutionEngine) {
    run_builder(|b| {
        b.emit_push_bytes(data);
        b.emit_push_int(index);
        b.emit_push_int(count);
        b.emit(OpCode::SubStr);
        b.emit(OpCode::Ret);
    })
}

#[test]
fn substr_negative_count_faults() {
    let (state, _) = substr(b"hello", 0, -1);
    assert_eq!(state, VMState::Fault);
}

#[test]
fn substr_negative_index_faults() {
    let (state, _) = substr(b"hello", -1, 2);
    assert_eq!(state, VMState::Fault);
}

#[test]
fn substr_overrun_faults() {
    let (state, _) = substr(b"hello", 3, 3);
    assert_eq!(state, VMState::Fault);
}

#[test]
fn substr_index_outside_31_bits_faults() {
    let (state, _) = substr(b"hello", i64::from(i32::MAX) + 1, 1);
    assert_eq!(state, VMState::Fault);
}

#[test]
fn substr_non_string_operand_faults() {
    let (state, _) = run_builder(|b| {
        b.emit(OpCode::NewArray0);
        b.emit_push_int(0);
        b.emit_push_int(1);
        b.emit(OpCode::SubStr);
    });
    assert_eq!(state, VMState::Fault);
}

#[test]
fn substr_to_exact_end_returns_empty_buffer() {
    let (state, engine) = substr(b"hello", 5, 0);
    assert_eq!(state, VMState::Halt);
    let result = engine.result_stack().peek(0).unwrap();
    assert_eq!(result.item_type(), StackItemType::Buffer);
    assert!(result.to_bytes().unwrap().is_empty());
}

#[test]
fn substr_result_is_a_mutable_buffer() {
    let (state, engine) = substr(b"hello", 1, 3);
    assert_eq!(state, VMState::Halt);
    let result = engine.result_stack().peek(0).unwrap();
    assert_eq!(result.item_type(), StackItemType::Buffer);
    assert_eq!(result.to_bytes().unwrap(), b"ell");
}

// ---- arithmetic range ----

#[test]
fn arithmetic_overflow_faults() {
    // (2^255 - 1) + 1 leaves the representable range.
    let (state, _) = run_builder(|b| {
        use num_bigint::BigInt;
        let max = (BigInt::from(1) << 255) - 1;
        b.emit_push_int(max);
        b.emit_push_int(1);
        b.emit(OpCode::Add);
    });
    assert_eq!(state, VMState::Fault);
}

#[test]
fn modpow_with_inverse_exponent() {
    let (state, engine) = run_builder(|b| {
        b.emit_push_int(3);
        b.emit_push_int(-1);
        b.emit_push_int(7);
        b.emit(OpCode::ModPow);
        b.emit(OpCode::Ret);
    });
    assert_eq!(state, VMState::Halt);
    assert_eq!(top_int(&engine), 5);
}

// ---- compound semantics ----

#[test]
fn structs_append_by_value_into_arrays() {
    // s = struct{7}; a = [s]; reading a[0][0] yields 7 through the copy.
    let (state, engine) = run_builder(|b| {
        b.emit(OpCode::NewStruct0);
        b.emit(OpCode::Dup);
        b.emit_push_int(7);
        b.emit(OpCode::Append); // s = struct{7}
        b.emit(OpCode::NewArray0);
        b.emit(OpCode::Dup);
        b.emit(OpCode::Rot); // stack: a a s
        b.emit(OpCode::Append); // a = [copy of s]
        b.emit_push_int(0);
        b.emit(OpCode::PickItem);
        b.emit_push_int(0);
        b.emit(OpCode::PickItem);
        b.emit(OpCode::Ret);
    });
    assert_eq!(state, VMState::Halt);
    assert_eq!(top_int(&engine), 7);
}

#[test]
fn map_preserves_insertion_order() {
    let (state, engine) = run_builder(|b| {
        b.emit(OpCode::NewMap);
        b.emit(OpCode::Dup);
        b.emit_push_string("zz");
        b.emit_push_int(1);
        b.emit(OpCode::SetItem);
        b.emit(OpCode::Dup);
        b.emit_push_string("aa");
        b.emit_push_int(2);
        b.emit(OpCode::SetItem);
        b.emit(OpCode::Keys);
        b.emit_push_int(0);
        b.emit(OpCode::PickItem);
        b.emit(OpCode::Ret);
    });
    assert_eq!(state, VMState::Halt);
    // "zz" was inserted first and stays first.
    assert_eq!(
        engine.result_stack().peek(0).unwrap().to_bytes().unwrap(),
        b"zz"
    );
}

#[test]
fn unpack_pushes_reversed_items_and_count() {
    let (state, engine) = run_builder(|b| {
        b.emit_push_int(10);
        b.emit_push_int(20);
        b.emit_push_int(2);
        b.emit(OpCode::Pack);
        b.emit(OpCode::Unpack);
        b.emit(OpCode::Ret);
    });
    assert_eq!(state, VMState::Halt);
    // Stack from top: count, first element, second element.
    assert_eq!(top_int(&engine), 2);
    let first = engine.result_stack().peek(1).unwrap().to_integer().unwrap();
    assert_eq!(first, 20.into());
}

#[test]
fn popitem_on_empty_array_faults() {
    let (state, _) = run_builder(|b| {
        b.emit(OpCode::NewArray0);
        b.emit(OpCode::PopItem);
    });
    assert_eq!(state, VMState::Fault);
}

// ---- determinism (invariant 7) ----

#[test]
fn execution_is_deterministic() {
    let build = |b: &mut ScriptBuilder| {
        b.emit_push_int(123456);
        b.emit_push_int(789);
        b.emit(OpCode::Mul);
        b.emit_push_bytes(b"suffix");
        b.emit(OpCode::Cat);
        b.emit(OpCode::Ret);
    };
    let (state_a, engine_a) = run_builder(build);
    let (state_b, engine_b) = run_builder(build);
    assert_eq!(state_a, state_b);
    let a = engine_a.result_stack().peek(0).unwrap().to_bytes().unwrap();
    let b = engine_b.result_stack().peek(0).unwrap().to_bytes().unwrap();
    assert_eq!(a, b);
}

// ---- reference counting ----

#[test]
fn runaway_stack_growth_faults() {
    // An unbounded DUP+APPEND loop must hit the item limit, not spin forever.
    let (state, _) = run_builder(|b| {
        b.emit(OpCode::NewArray0);
        // loop: DUP; PUSH0; APPEND? grows array forever
        b.emit(OpCode::Dup); // offset 1
        b.emit_push_int(0);
        b.emit(OpCode::Append);
        b.emit_jump(OpCode::Jmp, -4); // back to DUP
    });
    assert_eq!(state, VMState::Fault);
}

#[test]
fn finally_runs_on_the_normal_path() {
    let (state, engine) = run_builder(|b| {
        b.emit_try(0, 6); // 0: TRY, finally at 6
        b.emit(OpCode::Nop); // 3
        b.emit_jump(OpCode::EndTry, 5); // 4: continue at 9 after the finally
        b.emit_push_int(9); // 6: finally body
        b.emit(OpCode::EndFinally); // 7
        b.emit(OpCode::Ret); // 8 (skipped; ENDTRY targets 9, the script end)
    });
    assert_eq!(state, VMState::Halt);
    assert_eq!(top_int(&engine), 9);
}

#[test]
fn finally_runs_before_an_uncaught_throw_faults() {
    let (state, engine) = run_builder(|b| {
        b.emit_try(0, 6); // 0: TRY, finally at 6
        b.emit_push_int(1); // 3
        b.emit(OpCode::Throw); // 4
        b.emit(OpCode::Nop); // 5
        b.emit(OpCode::Nop); // 6: finally body
        b.emit(OpCode::EndFinally); // 7: rethrows the pending exception
        b.emit(OpCode::Ret); // 8
    });
    assert_eq!(state, VMState::Fault);
    // The exception survived the finally block and faulted the machine.
    assert_eq!(
        engine.uncaught_exception().unwrap().to_integer().unwrap(),
        1.into()
    );
}
