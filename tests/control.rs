mod common;

use common::*;
use php_opvm::compiler::block::CodeBlock;
use php_opvm::core::value::{Literal, Name, Val};
use php_opvm::runtime::context::RuntimeContext;
use php_opvm::vm::cancel::CancelFlag;
use php_opvm::vm::engine::{ErrorLevel, VM, VmError};
use php_opvm::vm::opcode::{ArithOp, CompareOp, OpCode};
use std::sync::Arc;

fn break_table(levels: i64) -> Vec<OpCode> {
    vec![
        int(levels),
        OpCode::Break { loops: 2 },
        OpCode::Branch(1),
        OpCode::Branch(2),
        string("one"),
        OpCode::Return(true),
        string("two"),
        OpCode::Return(true),
    ]
}

#[test]
fn test_break_selects_branch_by_level() {
    let run = run_in(RuntimeContext::new(), break_table(1));
    assert_eq!(run.value(), &s("one"));

    let run = run_in(RuntimeContext::new(), break_table(2));
    assert_eq!(run.value(), &s("two"));
}

#[test]
fn test_break_beyond_enclosing_loops_is_fatal() {
    let run = run_in(RuntimeContext::new(), break_table(3));
    match run.error() {
        VmError::Fatal(msg) => assert_eq!(msg, "Cannot break 3 levels"),
        other => panic!("Expected fatal error, got {:?}", other),
    }
}

#[test]
fn test_counting_loop() {
    // for ($i = 0; $i < 5; $i = $i + 1) { $t = $t + $i; }
    let ops = vec![
        int(0),
        store("t"),
        int(0),
        store("i"),
        load("i"),
        int(5),
        OpCode::Compare(CompareOp::Lt),
        OpCode::BrFalse(9),
        load("t"),
        load("i"),
        OpCode::Arith { op: ArithOp::Add, in_place: false },
        store("t"),
        load("i"),
        int(1),
        OpCode::Arith { op: ArithOp::Add, in_place: false },
        store("i"),
        OpCode::Branch(-13),
        load("t"),
        OpCode::Return(true),
    ];
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.value(), &Val::Int(10));
}

#[test]
fn test_silence_suppresses_diagnostics() {
    let ops = vec![
        OpCode::Silence(true),
        load("x"),
        OpCode::Drop,
        OpCode::Silence(false),
        load("y"),
        OpCode::Drop,
        OpCode::Return(false),
    ];
    let run = run_in(RuntimeContext::new(), ops);
    assert!(!run.stderr.contains("Undefined variable: x"));
    assert!(run.stderr.contains("Notice: Undefined variable: y"));
}

#[test]
fn test_tick_functions_run_at_tick_boundaries() {
    let mut ctx = RuntimeContext::new();
    ctx.register_function(function(
        "tick",
        &[],
        vec![string("t"), OpCode::Echo, OpCode::Return(false)],
    ));

    let mut code = CodeBlock::new();
    for op in [
        call("register_tick_function"),
        string("tick"),
        arg(),
        OpCode::Invoke { argc: 1, discard: true },
        OpCode::Ticks(Some(1)),
        string("a"),
        OpCode::Echo,
    ] {
        code.emit(op);
    }
    code.set_tick();
    code.emit(string("b"));
    code.emit(OpCode::Echo);
    code.set_tick();
    code.emit(OpCode::Ticks(None));
    code.emit(string("c"));
    code.emit(OpCode::Echo);
    code.set_tick();

    let mut vm = VM::new(ctx);
    let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = out.clone();
    vm.set_output_writer(Box::new(
        php_opvm::vm::engine::CapturingOutputWriter::new(move |b: &[u8]| {
            sink.borrow_mut().extend_from_slice(b)
        }),
    ));
    vm.execute(Arc::new(code), &[]).unwrap();
    assert_eq!(String::from_utf8_lossy(&out.borrow()), "atbtc");
}

#[test]
fn test_constants() {
    let mut ctx = RuntimeContext::new();
    ctx.define_constant("ANSWER", Literal::Int(42));
    let run = run_in(ctx, vec![OpCode::Constant(Name::new("ANSWER")), OpCode::Return(true)]);
    assert_eq!(run.value(), &Val::Int(42));

    let run = run_in(
        RuntimeContext::new(),
        vec![OpCode::Constant(Name::new("FOO")), OpCode::Return(true)],
    );
    assert_eq!(run.value(), &s("FOO"));
    assert!(run.stderr.contains("Use of undefined constant FOO - assumed 'FOO'"));
}

#[test]
fn test_cancel_flag_stops_an_endless_loop() {
    let flag = CancelFlag::new();
    let mut vm = VM::new(RuntimeContext::new());
    vm.set_cancellation(Box::new(flag.clone()), 1);
    flag.cancel();
    let err = vm
        .execute(Arc::new(block(vec![OpCode::Branch(-1)])), &[])
        .unwrap_err();
    match err {
        VmError::Cancelled(reason) => assert_eq!(reason, "Execution cancelled by host"),
        other => panic!("Expected cancellation, got {:?}", other),
    }
    assert!(vm.frames.is_empty());
}

#[test]
fn test_error_opcode_reports_or_aborts() {
    let run = run_in(
        RuntimeContext::new(),
        vec![
            OpCode::Error {
                level: ErrorLevel::UserWarning,
                message: "careful".into(),
            },
            OpCode::Return(false),
        ],
    );
    assert!(run.result.is_ok());
    assert_eq!(run.stderr, "User warning: careful\n");

    let run = run_in(
        RuntimeContext::new(),
        vec![OpCode::Error {
            level: ErrorLevel::Error,
            message: "stop".into(),
        }],
    );
    assert!(matches!(run.error(), VmError::Fatal(msg) if msg == "stop"));
}

#[test]
fn test_exit_from_nested_call() {
    let mut ctx = RuntimeContext::new();
    ctx.register_function(function("quit", &[], vec![int(3), OpCode::Exit(true)]));
    let run = run_in(
        ctx,
        vec![call("quit"), invoke(0), string("unreached"), OpCode::Echo],
    );
    assert!(matches!(run.error(), VmError::Exit(3)));
    assert!(run.stdout.is_empty());
    assert!(run.vm.frames.is_empty());
}

#[test]
fn test_global_statement_binds_to_global_scope() {
    let mut ctx = RuntimeContext::new();
    ctx.register_function(function(
        "bump",
        &[],
        vec![
            OpCode::MakeGlobal(Some(Name::new("g"))),
            load("g"),
            int(1),
            OpCode::Arith { op: ArithOp::Add, in_place: false },
            store("g"),
            OpCode::Return(false),
        ],
    ));
    let run = run_in(
        ctx,
        vec![
            int(10),
            store("g"),
            call("bump"),
            OpCode::Invoke { argc: 0, discard: true },
            load("g"),
            OpCode::Return(true),
        ],
    );
    assert_eq!(run.value(), &Val::Int(11));
}

#[test]
fn test_running_off_the_end_returns_null() {
    let run = run_in(RuntimeContext::new(), vec![int(1), store("x")]);
    assert_eq!(run.value(), &Val::Null);
    assert_eq!(global(&run.vm, "x"), Some(Val::Int(1)));
}

#[test]
fn test_compound_add_updates_the_variable() {
    // $a = 1; return $a += 2;
    let ops = vec![
        int(1),
        store("a"),
        OpCode::Local {
            name: Name::new("a"),
            intent: php_opvm::vm::opcode::Intent::RW,
        },
        int(2),
        OpCode::Arith { op: ArithOp::Add, in_place: true },
        OpCode::Return(true),
    ];
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.value(), &Val::Int(3));
    assert_eq!(global(&run.vm, "a"), Some(Val::Int(3)));
}

/// VM whose echo output and diagnostics land in shared buffers
fn capturing_vm(
    ctx: RuntimeContext,
) -> (
    VM,
    std::rc::Rc<std::cell::RefCell<String>>,
    std::rc::Rc<std::cell::RefCell<String>>,
) {
    let out = std::rc::Rc::new(std::cell::RefCell::new(String::new()));
    let err = std::rc::Rc::new(std::cell::RefCell::new(String::new()));
    let mut vm = VM::new(ctx);
    let sink = out.clone();
    vm.set_output_writer(Box::new(
        php_opvm::vm::engine::CapturingOutputWriter::new(move |b: &[u8]| {
            sink.borrow_mut().push_str(&String::from_utf8_lossy(b))
        }),
    ));
    let sink = err.clone();
    vm.set_error_handler(Box::new(
        php_opvm::vm::engine::CapturingErrorHandler::new(move |level: ErrorLevel, msg: &str| {
            sink.borrow_mut().push_str(&format!("{}: {}\n", level, msg))
        }),
    ));
    (vm, out, err)
}

#[test]
fn test_failed_run_inside_silence_does_not_mute_the_next_run() {
    let (mut vm, _, err) = capturing_vm(RuntimeContext::new());
    // @throw new Exception("x");
    let first = block(vec![
        OpCode::Silence(true),
        OpCode::ClassNew {
            class: Some(Name::new("Exception")),
            no_ctor: 3,
        },
        string("x"),
        arg(),
        OpCode::Invoke { argc: 1, discard: true },
        OpCode::Throw,
    ]);
    let failure = vm.execute(Arc::new(first), &[]).unwrap_err();
    assert!(matches!(failure, VmError::UncaughtException { .. }));
    assert_eq!(vm.silence, 0);

    let second = block(vec![
        OpCode::Error {
            level: ErrorLevel::Notice,
            message: "visible".into(),
        },
        OpCode::Return(false),
    ]);
    vm.execute(Arc::new(second), &[]).unwrap();
    assert_eq!(err.borrow().as_str(), "Notice: visible\n");
}

#[test]
fn test_exit_inside_ticks_region_does_not_leak_into_the_next_run() {
    let mut ctx = RuntimeContext::new();
    ctx.register_function(function(
        "tick",
        &[],
        vec![string("t"), OpCode::Echo, OpCode::Return(false)],
    ));
    let (mut vm, out, _) = capturing_vm(ctx);
    let first = block(vec![
        call("register_tick_function"),
        string("tick"),
        arg(),
        OpCode::Invoke { argc: 1, discard: true },
        OpCode::Ticks(Some(1)),
        int(1),
        OpCode::Exit(true),
    ]);
    assert!(matches!(vm.execute(Arc::new(first), &[]), Err(VmError::Exit(1))));

    let mut second = CodeBlock::new();
    second.emit(string("a"));
    second.emit(OpCode::Echo);
    second.set_tick();
    vm.execute(Arc::new(second), &[]).unwrap();
    assert_eq!(out.borrow().as_str(), "a");
}
