mod common;

use common::*;
use php_opvm::core::value::Val;
use php_opvm::runtime::context::RuntimeContext;
use php_opvm::vm::opcode::{ArithOp, CompareOp, OpCode};
use std::sync::Arc;

fn add() -> OpCode {
    OpCode::Arith { op: ArithOp::Add, in_place: false }
}

/// `$i = 0; while ($i < n) { $i = $i + 1; } return $i;`
fn count_to(n: i64) -> Vec<OpCode> {
    vec![
        int(0),
        store("i"),
        load("i"),
        int(n),
        OpCode::Compare(CompareOp::Lt),
        OpCode::BrFalse(5),
        load("i"),
        int(1),
        add(),
        store("i"),
        OpCode::Branch(-9),
        load("i"),
        OpCode::Return(true),
    ]
}

#[test]
fn test_long_loop_keeps_the_arena_bounded() {
    let run = run_in(RuntimeContext::new(), count_to(50_000));
    assert_eq!(run.value(), &Val::Int(50_000));
    assert!(
        run.vm.arena.slot_count() < 4096,
        "arena grew to {} slots",
        run.vm.arena.slot_count()
    );
}

#[test]
fn test_arena_size_does_not_depend_on_iteration_count() {
    let short = run_in(RuntimeContext::new(), count_to(5_000));
    let long = run_in(RuntimeContext::new(), count_to(60_000));
    assert!(long.vm.arena.slot_count() <= short.vm.arena.slot_count() * 2);
}

#[test]
fn test_collection_keeps_elements_of_a_temporary_foreach_source() {
    // foreach ([10, 20, 30] as $v) { for ($i = 0; $i < 3000; $i = $i + 1); $sum = $sum + $v; }
    let ops = vec![
        int(0),
        store("sum"),
        OpCode::NewArray,
        int(10),
        OpCode::ArrayAppend { by_ref: false },
        int(20),
        OpCode::ArrayAppend { by_ref: false },
        int(30),
        OpCode::ArrayAppend { by_ref: false },
        OpCode::FeInit { arrow: false, by_ref: false, empty: 17 },
        store("v"),
        int(0),
        store("i"),
        load("i"),
        int(3000),
        OpCode::Compare(CompareOp::Lt),
        OpCode::BrFalse(5),
        load("i"),
        int(1),
        add(),
        store("i"),
        OpCode::Branch(-9),
        load("sum"),
        load("v"),
        add(),
        store("sum"),
        OpCode::FeNext(-17),
        OpCode::FeFree,
        load("sum"),
        OpCode::Return(true),
    ];
    let run = run_in(RuntimeContext::new(), ops);
    assert_eq!(run.value(), &Val::Int(60));
}

#[test]
fn test_collect_garbage_keeps_globals() {
    let mut ops = vec![
        OpCode::NewArray,
        int(1),
        OpCode::ArrayAppend { by_ref: false },
        int(2),
        OpCode::ArrayAppend { by_ref: false },
        store("a"),
    ];
    for i in 0..16 {
        ops.push(string(&format!("scratch {}", i)));
        ops.push(OpCode::Drop);
    }
    ops.push(OpCode::Return(false));
    let mut run = run_in(RuntimeContext::new(), ops);
    assert!(run.vm.collect_garbage() >= 16);

    let a = global(&run.vm, "a").unwrap();
    assert_eq!(array_values(&run.vm, &a), vec![Val::Int(1), Val::Int(2)]);

    // Freed slots are handed out again without disturbing live ones
    let before = run.vm.arena.slot_count();
    let next = block(vec![
        load_w("a"),
        int(3),
        OpCode::AssignAppend { keep: false },
        load("a"),
        OpCode::Return(true),
    ]);
    let value = run.vm.execute(Arc::new(next), &[]).unwrap();
    assert_eq!(
        array_values(&run.vm, &value),
        vec![Val::Int(1), Val::Int(2), Val::Int(3)]
    );
    assert_eq!(run.vm.arena.slot_count(), before);
}
