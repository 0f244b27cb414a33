//! Common test helpers for opvm tests
//!
//! Programs are written directly as opcode lists. These helpers build the
//! blocks, run them through the `vm::executor` API or a hand-made VM, and
//! read values back out of the arena.

#![allow(dead_code)]

use php_opvm::compiler::block::CodeBlock;
use php_opvm::core::value::{ArrayKey, Literal, Name, Val};
use php_opvm::runtime::context::{Param, RuntimeContext, UserFunc};
use php_opvm::vm::engine::{CapturingErrorHandler, CapturingOutputWriter, VM, VmError};
use php_opvm::vm::executor::{ExecutionResult, execute};
use php_opvm::vm::opcode::{ArgPassing, Intent, OpCode};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub fn block(ops: Vec<OpCode>) -> CodeBlock {
    ops.into_iter().collect()
}

pub fn int(i: i64) -> OpCode {
    OpCode::Push(Literal::Int(i))
}

pub fn string(s: &str) -> OpCode {
    OpCode::Push(Literal::String(s.to_string()))
}

pub fn load(name: &str) -> OpCode {
    OpCode::Local {
        name: Name::new(name),
        intent: Intent::R,
    }
}

pub fn load_w(name: &str) -> OpCode {
    OpCode::Local {
        name: Name::new(name),
        intent: Intent::W,
    }
}

pub fn store(name: &str) -> OpCode {
    OpCode::AssignLocal {
        name: Some(Name::new(name)),
        keep: false,
    }
}

pub fn call(name: &str) -> OpCode {
    OpCode::FindFunction(Some(Name::new(name)))
}

pub fn arg() -> OpCode {
    OpCode::PrepareArg(ArgPassing::ByValue)
}

pub fn invoke(argc: u32) -> OpCode {
    OpCode::Invoke { argc, discard: false }
}

pub fn function(name: &str, params: &[&str], ops: Vec<OpCode>) -> UserFunc {
    let params = params.iter().map(|p| Param::new(p)).collect();
    UserFunc::new(name, params, block(ops))
}

/// Run a main block against the built-in runtime; panics on failure
pub fn run_ops(ops: Vec<OpCode>) -> ExecutionResult {
    execute(block(ops), &[]).expect("execution failed")
}

/// Outcome of a run on a hand-made VM, with the VM kept for inspection
pub struct Run {
    pub result: Result<Val, VmError>,
    pub vm: VM,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    pub fn value(&self) -> &Val {
        self.result.as_ref().expect("execution failed")
    }

    pub fn error(&self) -> &VmError {
        self.result.as_ref().err().expect("execution should have failed")
    }
}

/// Run a main block against `ctx`, capturing output and diagnostics
pub fn run_in(ctx: RuntimeContext, ops: Vec<OpCode>) -> Run {
    let mut vm = VM::new(ctx);
    vm.max_call_depth = 200;

    let stdout = Rc::new(RefCell::new(Vec::<u8>::new()));
    let stderr = Rc::new(RefCell::new(String::new()));
    let out = Rc::clone(&stdout);
    vm.set_output_writer(Box::new(CapturingOutputWriter::new(move |bytes| {
        out.borrow_mut().extend_from_slice(bytes);
    })));
    let err = Rc::clone(&stderr);
    vm.set_error_handler(Box::new(CapturingErrorHandler::new(move |level, message| {
        err.borrow_mut().push_str(&format!("{}: {}\n", level, message));
    })));

    let result = vm.execute(Arc::new(block(ops)), &[]);
    let stdout = String::from_utf8_lossy(&stdout.borrow()).into_owned();
    let stderr = stderr.borrow().clone();
    Run {
        result,
        vm,
        stdout,
        stderr,
    }
}

/// Element values of an array in insertion order
pub fn array_values(vm: &VM, val: &Val) -> Vec<Val> {
    match val {
        Val::Array(arr) => arr.map.values().map(|&h| vm.arena.value(h).clone()).collect(),
        other => panic!("Expected array, got {:?}", other),
    }
}

/// Keys of an array in insertion order
pub fn array_keys(val: &Val) -> Vec<ArrayKey> {
    match val {
        Val::Array(arr) => arr.map.keys().cloned().collect(),
        other => panic!("Expected array, got {:?}", other),
    }
}

pub fn str_key(s: &str) -> ArrayKey {
    ArrayKey::Str(Rc::new(s.as_bytes().to_vec()))
}

pub fn s(text: &str) -> Val {
    Val::string(text.as_bytes())
}

/// Current value of a global variable, if it exists
pub fn global(vm: &VM, name: &str) -> Option<Val> {
    vm.scopes[0]
        .get(&Name::new(name))
        .map(|&h| vm.arena.value(h).clone())
}
