mod common;

use common::*;
use php_opvm::compiler::block::{BlockError, CodeBlock};
use php_opvm::compiler::verify::{VerifyError, verify};
use php_opvm::core::value::Val;
use php_opvm::runtime::context::RuntimeContext;
use php_opvm::vm::opcode::{CompareOp, Instruction, OpCode};
use proptest::prelude::*;

/// Operations whose stack effect does not depend on operands
fn simple_op() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        any::<i64>().prop_map(int),
        Just(OpCode::Dup),
        Just(OpCode::Drop),
        Just(OpCode::Swap),
        Just(OpCode::Not),
        Just(OpCode::Compare(CompareOp::Lt)),
    ]
}

fn expected_effect(op: &OpCode) -> i32 {
    match op {
        OpCode::Push(_) | OpCode::Dup => 1,
        OpCode::Drop | OpCode::Compare(_) => -1,
        _ => 0,
    }
}

proptest! {
    #[test]
    fn push_count_is_the_sum_of_instruction_effects(ops in prop::collection::vec(simple_op(), 0..40)) {
        let expected: i32 = ops.iter().map(expected_effect).sum();
        let block: CodeBlock = ops.into_iter().collect();
        prop_assert_eq!(block.push_count(), expected);
    }

    #[test]
    fn append_keeps_the_running_count(
        left in prop::collection::vec(simple_op(), 0..20),
        pushes in 1usize..5,
    ) {
        let mut outer: CodeBlock = left.into_iter().collect();
        let before = outer.push_count();
        let inner: CodeBlock = (0..pushes).map(|i| int(i as i64)).collect();
        outer.append_push(inner).unwrap();
        prop_assert_eq!(outer.push_count(), before + pushes as i32);
    }
}

#[test]
fn test_typed_appends_reject_wrong_shapes() {
    let mut outer = CodeBlock::new();
    let two: CodeBlock = vec![int(1), int(2)].into_iter().collect();
    let err = outer.append_push1(two.clone()).unwrap_err();
    assert_eq!(
        err,
        BlockError::PushCountMismatch {
            contract: "push-one",
            expected: "1",
            actual: 2,
        }
    );
    assert!(outer.append_flat(two.clone()).is_err());
    assert!(outer.append_pop1(two.clone()).is_err());
    outer.append_push(two).unwrap();
    assert_eq!(outer.push_count(), 2);
    assert!(outer.append_pop1(block(vec![OpCode::Drop])).is_ok());
    assert!(outer.append_flat(CodeBlock::new()).is_ok());
    assert_eq!(outer.push_count(), 1);
}

#[test]
fn test_forward_and_backward_labels_build_a_loop() {
    // $i = 0; while ($i < 3) { echo $i; $i++; }
    let mut code = CodeBlock::new();
    code.emit(int(0));
    code.emit(store("i"));
    let top = code.emit(load("i"));
    code.emit(int(3));
    code.emit(OpCode::Compare(CompareOp::Lt));
    let exit = code.emit_forward(OpCode::BrFalse(0)).unwrap();
    code.emit(load("i"));
    code.emit(OpCode::Echo);
    code.emit(load("i"));
    code.emit(int(1));
    code.emit(OpCode::Arith {
        op: php_opvm::vm::opcode::ArithOp::Add,
        in_place: false,
    });
    code.emit(store("i"));
    code.emit_backward(Instruction::new(OpCode::Branch(0)), top).unwrap();
    code.resolve_here(exit).unwrap();

    assert_eq!(code.push_count(), 0);
    let profile = verify(&code).unwrap();
    assert_eq!(profile.max_height, 2);

    let ops: Vec<OpCode> = code.instructions().iter().map(|i| i.op.clone()).collect();
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.stdout, "012");
    assert_eq!(run.value(), &Val::Null);
}

#[test]
fn test_forward_label_requires_a_branch() {
    let mut code = CodeBlock::new();
    assert!(matches!(
        code.emit_forward(OpCode::Dup),
        Err(BlockError::NotABranch { .. })
    ));
}

#[test]
fn test_verify_reports_underflow_and_unbalanced_return() {
    let errors = verify(&block(vec![OpCode::Drop])).unwrap_err();
    assert!(matches!(errors[0], VerifyError::StackUnderflow { at: 0, .. }));

    let errors = verify(&block(vec![int(1), int(2), OpCode::Return(true)])).unwrap_err();
    assert!(matches!(
        errors[0],
        VerifyError::UnbalancedReturn { at: 2, height: 2, expected: 1 }
    ));
}

#[test]
fn test_verify_accepts_try_catch_shape() {
    // try { 1; } catch (Exception $e) { }
    let code = block(vec![
        OpCode::TryEnter(4),
        int(1),
        OpCode::Drop,
        OpCode::TryExit,
        OpCode::Branch(4),
        OpCode::CatchEnter {
            class: php_opvm::core::value::Name::new("Exception"),
            skip: 2,
        },
        OpCode::Drop,
        OpCode::Branch(1),
        OpCode::Throw,
        OpCode::Return(false),
    ]);
    let profile = verify(&code).unwrap();
    assert_eq!(profile.heights[5], Some(1));
    assert_eq!(profile.heights[9], Some(0));

    let run = run_in(RuntimeContext::new(), code.instructions().iter().map(|i| i.op.clone()).collect());
    assert!(run.result.is_ok());
}
