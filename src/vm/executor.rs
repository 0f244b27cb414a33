//! Centralized Code Execution API
//!
//! Provides a unified interface for running code blocks and program files
//! with configurable options, so hosts and tests share one set of execution
//! semantics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use php_opvm::vm::executor::{execute, ExecutionConfig};
//!
//! // Simple execution
//! let result = execute(block, &[]).unwrap();
//! assert_eq!(result.value, Val::Int(42));
//!
//! // With configuration
//! let mut config = ExecutionConfig::default();
//! config.timeout_ms = 1000;
//! let result = execute_with_config(block, &[], config).unwrap();
//! ```

use crate::compiler::block::CodeBlock;
use crate::core::value::Val;
use crate::runtime::context::RuntimeContext;
use crate::runtime::program::Program;
use crate::vm::cancel::Deadline;
use crate::vm::engine::{
    CapturingErrorHandler, CapturingOutputWriter, DEFAULT_MAX_CALL_DEPTH, DEFAULT_POLL_INTERVAL, VM, VmError,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result of a completed execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Value of the main block's `RETURN`, or null; the status for `exit`
    pub value: Val,
    /// Captured echo output
    pub stdout: String,
    /// Captured diagnostics, one `Level: message` line each
    pub stderr: String,
    /// Execution time in microseconds
    pub duration_us: u64,
    pub opcodes_executed: u64,
    pub function_calls: u64,
}

/// Execution that ended in an error, with whatever was captured before it
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: VmError,
    pub stdout: String,
    pub stderr: String,
}

/// Configuration for code execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum execution time in milliseconds (0 = unlimited)
    pub timeout_ms: u64,
    /// Capture output and diagnostics instead of writing to stdout/stderr
    pub capture_output: bool,
    /// Nested user calls allowed before a fatal error
    pub max_call_depth: usize,
    /// Write one `pc/op/stack-height` line per instruction to stderr
    pub trace: bool,
    /// Instructions between two timeout polls
    pub poll_interval: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000, // 5 second default
            capture_output: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Run a block against the built-in runtime with default configuration
pub fn execute(block: CodeBlock, args: &[Val]) -> Result<ExecutionResult, ExecutionFailure> {
    execute_with_config(block, args, ExecutionConfig::default())
}

/// Run a block against the built-in runtime
pub fn execute_with_config(
    block: CodeBlock,
    args: &[Val],
    config: ExecutionConfig,
) -> Result<ExecutionResult, ExecutionFailure> {
    execute_in_context(RuntimeContext::new(), block, args, config)
}

/// Declare a program's functions and classes, then run its main block
pub fn execute_program(
    program: &Program,
    args: &[Val],
    config: ExecutionConfig,
) -> Result<ExecutionResult, ExecutionFailure> {
    let mut context = RuntimeContext::new();
    program.install(&mut context).map_err(|e| ExecutionFailure {
        error: VmError::Fatal(e.to_string()),
        stdout: String::new(),
        stderr: String::new(),
    })?;
    execute_in_context(context, program.main.clone(), args, config)
}

/// Run a block against a caller-built runtime context
pub fn execute_in_context(
    context: RuntimeContext,
    block: CodeBlock,
    args: &[Val],
    config: ExecutionConfig,
) -> Result<ExecutionResult, ExecutionFailure> {
    let start = Instant::now();
    let mut vm = VM::new(context);
    vm.max_call_depth = config.max_call_depth;
    vm.trace = config.trace;

    if config.timeout_ms > 0 {
        let deadline = Deadline::after(Duration::from_millis(config.timeout_ms));
        vm.set_cancellation(Box::new(deadline), config.poll_interval);
    }

    let captured_stdout = Rc::new(RefCell::new(Vec::<u8>::new()));
    let captured_stderr = Rc::new(RefCell::new(Vec::<u8>::new()));

    if config.capture_output {
        let stdout_clone = Rc::clone(&captured_stdout);
        vm.set_output_writer(Box::new(CapturingOutputWriter::new(move |bytes| {
            stdout_clone.borrow_mut().extend_from_slice(bytes);
        })));

        let stderr_clone = Rc::clone(&captured_stderr);
        vm.set_error_handler(Box::new(CapturingErrorHandler::new(move |level, message| {
            let formatted = format!("{}: {}\n", level, message);
            stderr_clone.borrow_mut().extend_from_slice(formatted.as_bytes());
        })));
    }

    let outcome = match vm.execute(Arc::new(block), args) {
        Ok(value) => Ok(value),
        Err(VmError::Exit(status)) => Ok(Val::Int(status)),
        Err(error) => Err(error),
    };

    let stdout = String::from_utf8_lossy(&captured_stdout.borrow()).into_owned();
    let stderr = String::from_utf8_lossy(&captured_stderr.borrow()).into_owned();

    match outcome {
        Ok(value) => Ok(ExecutionResult {
            value,
            stdout,
            stderr,
            duration_us: start.elapsed().as_micros() as u64,
            opcodes_executed: vm.opcodes_executed,
            function_calls: vm.function_calls,
        }),
        Err(error) => Err(ExecutionFailure { error, stdout, stderr }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Literal;
    use crate::vm::opcode::{ArithOp, OpCode};

    fn block(ops: Vec<OpCode>) -> CodeBlock {
        ops.into_iter().collect()
    }

    #[test]
    fn returns_the_main_block_value() {
        let code = block(vec![
            OpCode::Push(Literal::Int(40)),
            OpCode::Push(Literal::Int(2)),
            OpCode::Arith { op: ArithOp::Add, in_place: false },
            OpCode::Return(true),
        ]);
        let result = execute(code, &[]).unwrap();
        assert_eq!(result.value, Val::Int(42));
        assert!(result.opcodes_executed >= 4);
    }

    #[test]
    fn captures_echo_output() {
        let code = block(vec![OpCode::Push(Literal::String("hi".into())), OpCode::Echo]);
        let result = execute(code, &[]).unwrap();
        assert_eq!(result.stdout, "hi");
        assert_eq!(result.value, Val::Null);
    }

    #[test]
    fn exit_is_not_a_failure() {
        let code = block(vec![
            OpCode::Push(Literal::String("bye".into())),
            OpCode::Echo,
            OpCode::Push(Literal::Int(3)),
            OpCode::Exit(true),
        ]);
        let result = execute(code, &[]).unwrap();
        assert_eq!(result.value, Val::Int(3));
        assert_eq!(result.stdout, "bye");
    }

    #[test]
    fn infinite_loop_hits_the_timeout() {
        let code = block(vec![OpCode::Branch(-1)]);
        let config = ExecutionConfig {
            timeout_ms: 20,
            ..ExecutionConfig::default()
        };
        let failure = execute_with_config(code, &[], config).unwrap_err();
        assert!(matches!(failure.error, VmError::Cancelled(_)));
    }
}
