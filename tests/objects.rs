mod common;

use common::*;
use php_opvm::core::value::{Literal, Name, Val, Visibility};
use php_opvm::runtime::context::{ClassDef, Param, RuntimeContext};
use php_opvm::vm::engine::VmError;
use php_opvm::vm::opcode::{ArithOp, IncDecOp, Intent, OpCode};

fn new_object(class: &str) -> OpCode {
    OpCode::ClassNew {
        class: Some(Name::new(class)),
        no_ctor: 0,
    }
}

fn prop(name: &str, intent: Intent) -> OpCode {
    OpCode::Property {
        name: Some(Name::new(name)),
        intent,
    }
}

fn assign_prop(name: &str) -> OpCode {
    OpCode::AssignProperty {
        name: Some(Name::new(name)),
        keep: false,
    }
}

fn method(name: &str) -> OpCode {
    OpCode::FindMethod(Some(Name::new(name)))
}

fn params(names: &[&str]) -> Vec<Param> {
    names.iter().map(|n| Param::new(n)).collect()
}

#[test]
fn test_constructor_receives_arguments() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(
        ClassDef::new("P")
            .property("x", Literal::Null, Visibility::Public)
            .method(
                "__construct",
                params(&["x"]),
                block(vec![load("x"), load("this"), assign_prop("x"), OpCode::Return(false)]),
                Visibility::Public,
            ),
    );
    let run = run_in(
        ctx,
        vec![
            OpCode::ClassNew {
                class: Some(Name::new("P")),
                no_ctor: 3,
            },
            int(4),
            arg(),
            OpCode::Invoke { argc: 1, discard: true },
            prop("x", Intent::R),
            OpCode::Return(true),
        ],
    );
    assert_eq!(run.value(), &Val::Int(4));
}

#[test]
fn test_class_without_constructor_skips_the_call() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("Plain").property("v", Literal::Int(3), Visibility::Public));
    let run = run_in(
        ctx,
        vec![
            OpCode::ClassNew {
                class: Some(Name::new("Plain")),
                no_ctor: 2,
            },
            int(99),
            arg(),
            prop("v", Intent::R),
            OpCode::Return(true),
        ],
    );
    assert_eq!(run.value(), &Val::Int(3));
}

fn magic_context() -> RuntimeContext {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(
        ClassDef::new("Magic")
            .method(
                "__get",
                params(&["n"]),
                block(vec![
                    load("n"),
                    string("!"),
                    OpCode::Arith {
                        op: ArithOp::Concat,
                        in_place: false,
                    },
                    OpCode::Return(true),
                ]),
                Visibility::Public,
            )
            .method(
                "__call",
                params(&["name", "args"]),
                block(vec![load("name"), OpCode::Return(true)]),
                Visibility::Public,
            ),
    );
    ctx
}

#[test]
fn test_magic_get_for_missing_property() {
    let run = run_in(
        magic_context(),
        vec![new_object("Magic"), prop("foo", Intent::R), OpCode::Return(true)],
    );
    assert_eq!(run.value(), &s("foo!"));
}

#[test]
fn test_magic_call_for_missing_method() {
    let run = run_in(
        magic_context(),
        vec![new_object("Magic"), method("doThing"), invoke(0), OpCode::Return(true)],
    );
    assert_eq!(run.value(), &s("doThing"));
}

#[test]
fn test_private_property_is_inaccessible_outside_the_class() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("Point").property("secret", Literal::Int(1), Visibility::Private));
    let run = run_in(
        ctx,
        vec![new_object("Point"), prop("secret", Intent::R), OpCode::Return(true)],
    );
    match run.error() {
        VmError::Fatal(msg) => assert_eq!(msg, "Cannot access private property Point::$secret"),
        other => panic!("Expected fatal error, got {:?}", other),
    }
}

/// ArrayAccess over a private array property
fn box_class() -> ClassDef {
    let d = |intent| vec![load("this"), prop("d", intent)];

    let mut set = vec![load("v")];
    set.extend(d(Intent::W));
    set.extend([load("k"), OpCode::AssignIndex { key: None, keep: false }, OpCode::Return(false)]);

    let mut get = d(Intent::R);
    get.extend([
        load("k"),
        OpCode::Index {
            key: None,
            intent: Intent::R,
        },
        OpCode::Return(true),
    ]);

    let mut exists = d(Intent::R);
    exists.extend([
        load("k"),
        OpCode::IssetIndex { key: None, empty: false },
        OpCode::Return(true),
    ]);

    let mut unset = d(Intent::W);
    unset.extend([load("k"), OpCode::UnsetIndex(None), OpCode::Return(false)]);

    ClassDef::new("Box")
        .implements("ArrayAccess")
        .property("d", Literal::Null, Visibility::Private)
        .method("offsetSet", params(&["k", "v"]), block(set), Visibility::Public)
        .method("offsetGet", params(&["k"]), block(get), Visibility::Public)
        .method("offsetExists", params(&["k"]), block(exists), Visibility::Public)
        .method("offsetUnset", params(&["k"]), block(unset), Visibility::Public)
}

#[test]
fn test_array_access_routes_to_offset_methods() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(box_class());

    let ops = vec![
        new_object("Box"),
        store("b"),
        // $b['a'] = 5;
        int(5),
        load_w("b"),
        string("a"),
        OpCode::AssignIndex { key: None, keep: false },
        // return [$b['a'], isset($b['a']), (unset($b['a']), isset($b['a']))];
        OpCode::NewArray,
        load("b"),
        OpCode::Index {
            key: Some(Literal::String("a".into())),
            intent: Intent::R,
        },
        OpCode::ArrayAppend { by_ref: false },
        load("b"),
        OpCode::IssetIndex {
            key: Some(Literal::String("a".into())),
            empty: false,
        },
        OpCode::ArrayAppend { by_ref: false },
        load("b"),
        OpCode::UnsetIndex(Some(Literal::String("a".into()))),
        load("b"),
        OpCode::IssetIndex {
            key: Some(Literal::String("a".into())),
            empty: false,
        },
        OpCode::ArrayAppend { by_ref: false },
        OpCode::Return(true),
    ];
    let run = run_in(ctx, ops);
    assert_eq!(
        array_values(&run.vm, run.value()),
        vec![Val::Int(5), Val::Bool(true), Val::Bool(false)]
    );
}

#[test]
fn test_indexing_a_plain_object_is_fatal() {
    let run = run_in(
        RuntimeContext::new(),
        vec![
            new_object("stdClass"),
            OpCode::Index {
                key: Some(Literal::Int(0)),
                intent: Intent::R,
            },
            OpCode::Return(true),
        ],
    );
    match run.error() {
        VmError::Fatal(msg) => assert_eq!(msg, "Cannot use object of type stdClass as array"),
        other => panic!("Expected fatal error, got {:?}", other),
    }
}

#[test]
fn test_static_property_and_method() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(
        ClassDef::new("S")
            .constant("K", Literal::Int(7))
            .static_property("count", Literal::Int(0), Visibility::Public)
            .static_method(
                "get",
                vec![],
                block(vec![
                    OpCode::ClassConstant {
                        class: Name::new("self"),
                        name: Name::new("K"),
                    },
                    OpCode::Return(true),
                ]),
                Visibility::Public,
            ),
    );

    let bump = || {
        vec![
            OpCode::StaticProperty {
                class: Name::new("S"),
                name: Some(Name::new("count")),
            },
            OpCode::IncDec {
                op: IncDecOp::PreInc,
                keep: false,
            },
        ]
    };
    let mut ops = bump();
    ops.extend(bump());
    ops.extend([
        OpCode::StaticProperty {
            class: Name::new("S"),
            name: Some(Name::new("count")),
        },
        OpCode::FindStaticMethod {
            class: Name::new("S"),
            method: Some(Name::new("get")),
        },
        invoke(0),
        OpCode::Arith {
            op: ArithOp::Mul,
            in_place: false,
        },
        OpCode::Return(true),
    ]);
    let run = run_in(ctx, ops);
    assert_eq!(run.value(), &Val::Int(14));
}

#[test]
fn test_clone_copies_properties() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("P").property("x", Literal::Int(1), Visibility::Public));
    let ops = vec![
        new_object("P"),
        store("a"),
        load("a"),
        OpCode::Clone,
        store("b"),
        int(2),
        load_w("b"),
        assign_prop("x"),
        load("a"),
        prop("x", Intent::R),
        load("b"),
        prop("x", Intent::R),
        OpCode::Arith {
            op: ArithOp::Concat,
            in_place: false,
        },
        OpCode::Return(true),
    ];
    let run = run_in(ctx, ops);
    assert_eq!(run.value(), &s("12"));
}

#[test]
fn test_instanceof_follows_the_parent_chain() {
    let mut ctx = RuntimeContext::new();
    ctx.register_class(ClassDef::new("Base"));
    ctx.register_class(ClassDef::new("Child").extends("Base"));
    let run = run_in(
        ctx,
        vec![
            new_object("Child"),
            OpCode::InstanceOf(Some(Name::new("Base"))),
            OpCode::Return(true),
        ],
    );
    assert_eq!(run.value(), &Val::Bool(true));
}

#[test]
fn test_property_write_on_null_creates_std_class() {
    let run = run_in(
        RuntimeContext::new(),
        vec![
            int(1),
            load_w("o"),
            assign_prop("p"),
            load("o"),
            OpCode::InstanceOf(Some(Name::new("stdClass"))),
            OpCode::Return(true),
        ],
    );
    assert_eq!(run.value(), &Val::Bool(true));
    assert!(run.stderr.contains("Creating default object from empty value"));
}
