mod common;

use common::*;
use php_opvm::compiler::block::{BlockError, CodeBlock};
use php_opvm::core::value::{Handle, Name, Val};
use php_opvm::runtime::context::{ClassDef, RuntimeContext};
use php_opvm::vm::engine::{VM, VmError};
use php_opvm::vm::opcode::{ArithOp, CompareOp, OpCode};
use std::num::NonZeroU32;

fn new_exception(class: &str, message: &str) -> Vec<OpCode> {
    vec![
        OpCode::ClassNew {
            class: Some(Name::new(class)),
            no_ctor: 3,
        },
        string(message),
        arg(),
        OpCode::Invoke { argc: 1, discard: true },
    ]
}

fn catch(class: &str, skip: i32) -> OpCode {
    OpCode::CatchEnter {
        class: Name::new(class),
        skip,
    }
}

#[test]
fn test_catch_binds_the_thrown_exception() {
    let mut ops = vec![OpCode::TryEnter(7)];
    ops.extend(new_exception("Exception", "boom"));
    ops.extend([
        OpCode::Throw,
        OpCode::TryExit,
        OpCode::Branch(7),
        catch("Exception", 5),
        store("e"),
        load("e"),
        OpCode::FindMethod(Some(Name::new("getMessage"))),
        invoke(0),
        OpCode::Return(true),
        OpCode::Throw,
    ]);
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.value(), &s("boom"));
    assert_eq!(run.vm.operand_stack.len(), 0);
}

#[test]
fn test_uncaught_exception_reports_class_and_message() {
    let mut ops = new_exception("Exception", "bad");
    ops.push(OpCode::Throw);
    let run = run_in(RuntimeContext::new(), ops);
    match run.error() {
        VmError::UncaughtException { class, message } => {
            assert_eq!(class, "Exception");
            assert_eq!(message, "bad");
        }
        other => panic!("Expected uncaught exception, got {:?}", other),
    }
}

#[test]
fn test_throw_from_callee_restores_operand_stack() {
    let mut thrower = new_exception("Exception", "x");
    thrower.push(OpCode::Throw);
    let mut ctx = RuntimeContext::new();
    ctx.register_function(function("thrower", &[], thrower));

    // return 1 + thrower(); with a catch returning 5
    let ops = vec![
        OpCode::TryEnter(5),
        int(1),
        call("thrower"),
        invoke(0),
        OpCode::Arith {
            op: ArithOp::Add,
            in_place: false,
        },
        OpCode::Return(true),
        catch("Exception", 3),
        OpCode::Drop,
        int(5),
        OpCode::Return(true),
        OpCode::Throw,
    ];
    let run = run_in(ctx, ops);
    assert_eq!(run.value(), &Val::Int(5));
    assert_eq!(run.vm.frames.len(), 0);
}

#[test]
fn test_catch_clauses_are_tried_in_order() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("LogicEx").extends("Exception"));
    ctx.register_class(ClassDef::new("MyEx").extends("Exception"));

    let mut ops = vec![OpCode::TryEnter(5)];
    ops.extend(new_exception("MyEx", "m"));
    ops.extend([
        OpCode::Throw,
        catch("LogicEx", 3),
        OpCode::Drop,
        string("logic"),
        OpCode::Return(true),
        catch("MyEx", 3),
        OpCode::Drop,
        string("mine"),
        OpCode::Return(true),
        OpCode::Throw,
    ]);
    let run = run_in(ctx, ops);
    assert_eq!(run.value(), &s("mine"));
}

#[test]
fn test_unmatched_catch_rethrows() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("LogicEx").extends("Exception"));

    let mut ops = vec![OpCode::TryEnter(5)];
    ops.extend(new_exception("Exception", "plain"));
    ops.extend([
        OpCode::Throw,
        catch("LogicEx", 3),
        OpCode::Drop,
        string("logic"),
        OpCode::Return(true),
        OpCode::Throw,
    ]);
    let run = run_in(ctx, ops);
    assert!(matches!(
        run.error(),
        VmError::UncaughtException { message, .. } if message == "plain"
    ));
}

#[test]
fn test_throwing_a_non_object_is_fatal() {
    let run = run_in(RuntimeContext::new(), vec![int(1), OpCode::Throw]);
    match run.error() {
        VmError::Fatal(msg) => assert_eq!(msg, "Can only throw objects"),
        other => panic!("Expected fatal error, got {:?}", other),
    }
}

#[test]
fn test_exception_code_defaults_to_zero() {
    let mut ops = new_exception("Exception", "m");
    ops.extend([
        OpCode::FindMethod(Some(Name::new("getCode"))),
        invoke(0),
        OpCode::Return(true),
    ]);
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.value(), &Val::Int(0));
}

/// aux_depths(): "<foreach depth>/<list depth>" of the calling frame
fn aux_depths(vm: &mut VM, _this: Option<Handle>, _args: &[Handle]) -> Result<Handle, VmError> {
    let depths = vm
        .frames
        .last()
        .map(|f| format!("{}/{}", f.fe_stack.len(), f.list_stack.len()))
        .unwrap_or_default();
    Ok(vm.arena.alloc(Val::string(depths.as_bytes())))
}

fn new_array(values: &[i64]) -> Vec<OpCode> {
    let mut ops = vec![OpCode::NewArray];
    for &v in values {
        ops.extend([int(v), OpCode::ArrayAppend { by_ref: false }]);
    }
    ops
}

/// ```php
/// foreach ([7] as $o) {
///     try {
///         foreach ([1, 2, 3] as $v) { <body> }
///     } catch (Exception $e) { $depth = aux_depths(); }
/// }
/// $sum = 0; foreach ([4, 5, 6] as $w) { $sum = $sum + $w; }
/// return $sum;
/// ```
fn loop_under_try(body: impl FnOnce(&mut CodeBlock) -> Result<(), BlockError>) -> Result<CodeBlock, BlockError> {
    let mut code = CodeBlock::new();
    for op in new_array(&[7]) {
        code.emit(op);
    }
    let outer_empty = code.emit_forward(OpCode::FeInit { arrow: false, by_ref: false, empty: 0 })?;
    let outer_body = code.emit(store("o"));
    let handler = code.emit_forward(OpCode::TryEnter(0))?;
    for op in new_array(&[1, 2, 3]) {
        code.emit(op);
    }
    let inner_empty = code.emit_forward(OpCode::FeInit { arrow: false, by_ref: false, empty: 0 })?;
    let inner_body = code.emit(store("v"));
    body(&mut code)?;
    code.emit_backward(OpCode::FeNext(0).into(), inner_body)?;
    code.resolve_here(inner_empty)?;
    code.emit(OpCode::FeFree);
    code.emit(OpCode::TryExit);
    let done = code.emit_forward(OpCode::Branch(0))?;

    code.resolve_here(handler)?;
    let rethrow = code.emit_forward(catch("Exception", 0))?;
    code.emit(store("e"));
    code.emit(call("aux_depths"));
    code.emit(invoke(0));
    code.emit(store("depth"));
    let caught = code.emit_forward(OpCode::Branch(0))?;
    code.resolve_here(rethrow)?;
    code.emit(OpCode::Throw);

    code.resolve_all_here([done, caught])?;
    code.emit_backward(OpCode::FeNext(0).into(), outer_body)?;
    code.resolve_here(outer_empty)?;
    code.emit(OpCode::FeFree);

    code.emit(int(0));
    code.emit(store("sum"));
    for op in new_array(&[4, 5, 6]) {
        code.emit(op);
    }
    let second_empty = code.emit_forward(OpCode::FeInit { arrow: false, by_ref: false, empty: 0 })?;
    let second_body = code.emit(store("w"));
    code.emit(load("sum"));
    code.emit(load("w"));
    code.emit(OpCode::Arith { op: ArithOp::Add, in_place: false });
    code.emit(store("sum"));
    code.emit_backward(OpCode::FeNext(0).into(), second_body)?;
    code.resolve_here(second_empty)?;
    code.emit(OpCode::FeFree);
    code.emit(load("sum"));
    code.emit(OpCode::Return(true));
    Ok(code)
}

fn run_loop_under_try(ctx: RuntimeContext, code: CodeBlock) -> Run {
    let ops = code.instructions().iter().map(|i| i.op.clone()).collect();
    run_in(ctx, ops)
}

fn depth_ctx() -> RuntimeContext {
    let mut ctx = RuntimeContext::new();
    ctx.register_native("aux_depths", Vec::new(), aux_depths);
    ctx
}

#[test]
fn test_throw_inside_foreach_unwinds_to_the_catch_depth() {
    // if ($v == 2) throw new Exception("x");
    let code = loop_under_try(|code| {
        code.emit(load("v"));
        code.emit(int(2));
        code.emit(OpCode::Compare(CompareOp::Eq));
        let skip = code.emit_forward(OpCode::BrFalse(0))?;
        for op in new_exception("Exception", "x") {
            code.emit(op);
        }
        code.emit(OpCode::Throw);
        code.resolve_here(skip)
    })
    .unwrap();

    let run = run_loop_under_try(depth_ctx(), code);
    assert_eq!(run.value(), &Val::Int(15));
    assert_eq!(global(&run.vm, "depth"), Some(s("1/0")));
    assert_eq!(global(&run.vm, "v"), Some(Val::Int(2)));
    assert_eq!(run.stderr, "");
    assert!(run.vm.frames.is_empty());
    assert_eq!(run.vm.operand_stack.len(), 0);
}

#[test]
fn test_throw_inside_list_unwinds_to_the_catch_depth() {
    let mut thrower = new_exception("Exception", "from list");
    thrower.push(OpCode::Throw);
    let mut ctx = depth_ctx();
    ctx.register_function(function("thrower", &[], thrower));

    // list($p, $q) = [$v, $v] with thrower() running between the two stores
    let code = loop_under_try(|code| {
        code.emit(OpCode::NewArray);
        code.emit(load("v"));
        code.emit(OpCode::ArrayAppend { by_ref: false });
        code.emit(load("v"));
        code.emit(OpCode::ArrayAppend { by_ref: false });
        code.emit(OpCode::ListInit {
            count: NonZeroU32::new(2).unwrap(),
            silent: false,
        });
        code.emit(store("q"));
        code.emit(call("thrower"));
        code.emit(OpCode::Invoke { argc: 0, discard: true });
        code.emit(OpCode::ListNext { silent: false });
        code.emit(store("p"));
        code.emit(OpCode::ListFree { keep: false });
        Ok(())
    })
    .unwrap();

    let run = run_loop_under_try(ctx, code);
    assert_eq!(run.value(), &Val::Int(15));
    assert_eq!(global(&run.vm, "depth"), Some(s("1/0")));
    assert_eq!(global(&run.vm, "q"), Some(Val::Int(1)));
    assert_eq!(global(&run.vm, "p"), None);
    assert_eq!(run.stderr, "");
    assert!(run.vm.frames.is_empty());
}
