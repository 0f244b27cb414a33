//! VM Engine Core
//!
//! This module contains the interpreter loop and the state it runs against.
//!
//! ## Architecture
//!
//! The VM follows a stack-based execution model similar to Zend Engine:
//! - **Operand Stack**: one stack shared by every frame; each frame records
//!   the height it was entered at
//! - **Call Frames**: owned by the VM, so user-to-user calls never recurse on
//!   the Rust stack; native code that calls back into user code re-enters
//!   [`VM::run_loop`] with a target depth
//! - **Arena**: every value lives in a slot addressed by a [`Handle`]
//!
//! ## Delegated Responsibilities
//!
//! - **Operators**: [`opcodes::arithmetic`](crate::vm::opcodes::arithmetic),
//!   [`opcodes::comparison`](crate::vm::opcodes::comparison)
//! - **Variables and constants**: [`opcodes::variables`](crate::vm::opcodes::variables)
//! - **Arrays**: [`opcodes::arrays`](crate::vm::opcodes::arrays)
//! - **Objects**: [`opcodes::objects`](crate::vm::opcodes::objects)
//! - **Control flow**: [`opcodes::control_flow`](crate::vm::opcodes::control_flow)
//! - **Calls**: [`calls`](crate::vm::calls)
//! - **Iteration**: [`foreach`](crate::vm::foreach), [`list`](crate::vm::list)
//!
//! ## Error Handling
//!
//! - **No Panics**: All errors return [`VmError`]
//! - **Exceptions**: [`VmError::Exception`] is the only error the loop catches;
//!   fatal errors, cancellation and `exit` always reach the host
//! - **Diagnostics**: non-fatal levels go to the [`ErrorHandler`] unless an
//!   `@` region is active
//!
//! ## References
//!
//! - Zend VM: `$PHP_SRC_PATH/Zend/zend_execute.c` - Main execution loop

use crate::compiler::block::CodeBlock;
use crate::core::heap::Arena;
use crate::core::value::{Handle, Name, Val};
use crate::runtime::context::{Callable, RuntimeContext};
use crate::vm::cancel::Cancellation;
use crate::vm::frame::{Frame, Scope};
use crate::vm::invocation::InvocationEntry;
use crate::vm::opcode::OpCode;
use crate::vm::stack::Stack;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// Instructions executed between two cancellation polls
pub const DEFAULT_POLL_INTERVAL: u32 = 200;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Mis-composed code popped more than it pushed
    #[error("Stack underflow during {operation}")]
    StackUnderflow { operation: &'static str },
    /// A frame returned with values left above its entry height
    #[error("Stack imbalance: {height} value(s) left on the operand stack at return")]
    StackImbalance { height: usize },
    /// E_ERROR and friends; never catchable
    #[error("Fatal error: {0}")]
    Fatal(String),
    /// PHP exception object in flight
    #[error("Uncaught exception")]
    Exception(Handle),
    /// An exception that escaped the outermost frame
    #[error("Fatal error: Uncaught exception '{class}' with message '{message}'")]
    UncaughtException { class: String, message: String },
    /// Execution stopped by a [`Cancellation`] source
    #[error("Fatal error: {0}")]
    Cancelled(String),
    #[error("exit({0})")]
    Exit(i64),
    /// Host-side failure (output, internal invariants)
    #[error("{0}")]
    RuntimeError(String),
}

/// PHP error levels matching Zend constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Notice,      // E_NOTICE
    Warning,     // E_WARNING
    Error,       // E_ERROR
    ParseError,  // E_PARSE
    Strict,      // E_STRICT
    UserNotice,  // E_USER_NOTICE
    UserWarning, // E_USER_WARNING
    UserError,   // E_USER_ERROR
    Deprecated,  // E_DEPRECATED
}

impl ErrorLevel {
    /// Levels that terminate the script
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorLevel::Error | ErrorLevel::ParseError | ErrorLevel::UserError
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorLevel::Notice => "Notice",
            ErrorLevel::Warning => "Warning",
            ErrorLevel::Error => "Fatal error",
            ErrorLevel::ParseError => "Parse error",
            ErrorLevel::Strict => "Strict Standards",
            ErrorLevel::UserNotice => "User notice",
            ErrorLevel::UserWarning => "User warning",
            ErrorLevel::UserError => "User error",
            ErrorLevel::Deprecated => "Deprecated",
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub trait ErrorHandler {
    /// Report an error/warning/notice at runtime
    fn report(&mut self, level: ErrorLevel, message: &str);
}

/// Default error handler that writes to stderr
pub struct StderrErrorHandler {
    stderr: io::Stderr,
}

impl Default for StderrErrorHandler {
    fn default() -> Self {
        Self {
            stderr: io::stderr(),
        }
    }
}

impl ErrorHandler for StderrErrorHandler {
    fn report(&mut self, level: ErrorLevel, message: &str) {
        let _ = writeln!(self.stderr, "{}: {}", level, message);
        let _ = self.stderr.flush();
    }
}

/// Capturing error handler for testing and output capture
pub struct CapturingErrorHandler<F: FnMut(ErrorLevel, &str)> {
    callback: F,
}

impl<F: FnMut(ErrorLevel, &str)> CapturingErrorHandler<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(ErrorLevel, &str)> ErrorHandler for CapturingErrorHandler<F> {
    fn report(&mut self, level: ErrorLevel, message: &str) {
        (self.callback)(level, message);
    }
}

pub trait OutputWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError>;
    fn flush(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

pub struct StdoutWriter {
    stdout: io::Stdout,
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl OutputWriter for StdoutWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.stdout
            .write_all(bytes)
            .map_err(|e| VmError::RuntimeError(format!("Failed to write output: {}", e)))
    }

    fn flush(&mut self) -> Result<(), VmError> {
        self.stdout
            .flush()
            .map_err(|e| VmError::RuntimeError(format!("Failed to flush output: {}", e)))
    }
}

/// Capturing output writer for testing
pub struct CapturingOutputWriter<F: FnMut(&[u8])> {
    callback: F,
}

impl<F: FnMut(&[u8])> CapturingOutputWriter<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(&[u8])> OutputWriter for CapturingOutputWriter<F> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        (self.callback)(bytes);
        Ok(())
    }
}

/// Interpreter state a failed host-level call puts back
#[derive(Debug, Clone, Copy)]
struct HostState {
    silence: u32,
    tick_depth: usize,
    tick_counter: u32,
}

pub struct VM {
    pub arena: Arena,
    pub operand_stack: Stack,
    pub frames: Vec<Frame>,
    /// Variable tables; index 0 holds the globals
    pub scopes: Vec<Scope>,
    pub context: RuntimeContext,
    pub output_writer: Box<dyn OutputWriter>,
    pub error_handler: Box<dyn ErrorHandler>,
    /// Depth of nested `@` regions
    pub silence: u32,
    /// Function statics keyed by the function's statics key
    pub(crate) function_statics: HashMap<String, IndexMap<Name, Handle>>,
    /// Static property storage keyed by lowercase declaring class
    pub(crate) static_properties: HashMap<String, IndexMap<Name, Handle>>,
    /// `(object, magic method, property)` calls in progress; a guarded
    /// access falls back to plain property semantics
    pub(crate) magic_guards: HashSet<(Handle, &'static str, Name)>,
    /// Active `declare(ticks=N)` intervals, innermost last
    pub(crate) tick_intervals: Vec<u32>,
    pub(crate) tick_functions: Vec<Name>,
    pub(crate) tick_counter: u32,
    /// Interpreter loops started by native code that are still running
    pub(crate) nested_loops: u32,
    cancellation: Option<Box<dyn Cancellation>>,
    poll_interval: u32,
    poll_countdown: u32,
    pub max_call_depth: usize,
    pub trace: bool,
    pub opcodes_executed: u64,
    pub function_calls: u64,
}

impl VM {
    pub fn new(context: RuntimeContext) -> Self {
        Self {
            arena: Arena::new(),
            operand_stack: Stack::new(),
            frames: Vec::new(),
            scopes: vec![Scope::new()],
            context,
            output_writer: Box::new(StdoutWriter::default()),
            error_handler: Box::new(StderrErrorHandler::default()),
            silence: 0,
            function_statics: HashMap::new(),
            static_properties: HashMap::new(),
            magic_guards: HashSet::new(),
            tick_intervals: Vec::new(),
            tick_functions: Vec::new(),
            tick_counter: 0,
            nested_loops: 0,
            cancellation: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_countdown: DEFAULT_POLL_INTERVAL,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace: false,
            opcodes_executed: 0,
            function_calls: 0,
        }
    }

    pub fn with_output_writer(mut self, writer: Box<dyn OutputWriter>) -> Self {
        self.output_writer = writer;
        self
    }

    pub fn set_output_writer(&mut self, writer: Box<dyn OutputWriter>) {
        self.output_writer = writer;
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.error_handler = handler;
    }

    /// Install a cancellation source polled every `interval` instructions
    pub fn set_cancellation(&mut self, source: Box<dyn Cancellation>, interval: u32) {
        self.cancellation = Some(source);
        self.poll_interval = interval.max(1);
        self.poll_countdown = self.poll_interval;
    }

    /// Run a top-level block in the global scope.
    ///
    /// Non-empty `args` are exposed as `$argv`/`$argc`, the way a CLI script
    /// receives them. The value of the block's `RETURN` (or null) is returned.
    pub fn execute(&mut self, code: Arc<CodeBlock>, args: &[Val]) -> Result<Val, VmError> {
        if !args.is_empty() {
            let argv = self.arena.alloc_array(args.iter().cloned());
            self.bind_global("argv", argv);
            let argc = self.arena.alloc(Val::Int(args.len() as i64));
            self.bind_global("argc", argc);
        }

        let state = self.host_state();
        let depth = self.frames.len();
        let entry_height = self.operand_stack.len();
        self.frames.push(Frame::new(code, 0, entry_height));
        let outcome = self.run_loop(depth).and_then(|_| self.pop_operand_required());
        self.operand_stack.truncate(entry_height);
        let flushed = self.output_writer.flush();
        let result = self.finish_host_call(outcome, state);
        flushed?;
        result
    }

    /// Call a registered function by name from the host
    pub fn call_function(&mut self, name: &str, args: &[Val]) -> Result<Val, VmError> {
        let callable = self
            .context
            .find_function(name)
            .cloned()
            .ok_or_else(|| VmError::Fatal(format!("Call to undefined function {}()", name)))?;
        let state = self.host_state();
        let handles: Vec<Handle> = args.iter().map(|v| self.arena.alloc(v.clone())).collect();
        let outcome = match &callable {
            Callable::User(func) => {
                let depth = self.frames.len();
                let entry = InvocationEntry::function(callable.clone());
                self.push_user_frame(Rc::clone(func), entry, &handles, false)
                    .and_then(|_| self.run_loop(depth))
                    .and_then(|_| self.pop_operand_required())
            }
            Callable::Native(_) => self.call_sync(&callable, None, &handles),
        };
        self.finish_host_call(outcome, state)
    }

    fn host_state(&self) -> HostState {
        HostState {
            silence: self.silence,
            tick_depth: self.tick_intervals.len(),
            tick_counter: self.tick_counter,
        }
    }

    /// Convert a host-level outcome, undoing `@` and `declare(ticks)`
    /// regions the failed run left open
    fn finish_host_call(&mut self, outcome: Result<Handle, VmError>, state: HostState) -> Result<Val, VmError> {
        match outcome {
            Ok(h) => Ok(self.arena.value(h).clone()),
            Err(err) => {
                self.silence = state.silence;
                self.tick_intervals.truncate(state.tick_depth);
                self.tick_counter = state.tick_counter;
                Err(match err {
                    VmError::Exception(ex) => self.uncaught(ex),
                    other => other,
                })
            }
        }
    }

    fn bind_global(&mut self, name: &str, h: Handle) {
        self.arena.bind(h);
        if let Some(old) = self.scopes[0].insert(Name::new(name), h) {
            self.arena.unbind(old);
        }
    }

    /// Describe an escaped exception object for the host
    fn uncaught(&self, ex: Handle) -> VmError {
        let class = self
            .arena
            .object(ex)
            .map(|o| o.class.to_string())
            .unwrap_or_else(|| "Exception".to_string());
        let message = self
            .read_property_raw(ex, "message")
            .map(|v| String::from_utf8_lossy(&v.to_php_string_bytes()).into_owned())
            .unwrap_or_default();
        VmError::UncaughtException { class, message }
    }

    pub fn current_frame(&self) -> Result<&Frame, VmError> {
        self.frames
            .last()
            .ok_or_else(|| VmError::RuntimeError("No active frame".into()))
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::RuntimeError("No active frame".into()))
    }

    /// Variable table of the running frame
    pub(crate) fn current_scope(&self) -> usize {
        self.frames.last().map(|f| f.scope).unwrap_or(0)
    }

    /// Move the running frame's PC by `displacement` (relative to the
    /// already-advanced PC)
    pub(crate) fn branch(&mut self, displacement: i32) -> Result<(), VmError> {
        let frame = self.current_frame_mut()?;
        let target = frame.pc as i64 + displacement as i64;
        if target < 0 || target > frame.code.len() as i64 {
            return Err(VmError::RuntimeError(format!(
                "Branch target {} outside code block of {} instructions",
                target,
                frame.code.len()
            )));
        }
        frame.pc = target as usize;
        Ok(())
    }

    /// Report a diagnostic. Fatal levels become an error; the rest are
    /// written to the error handler unless silenced.
    pub fn raise(&mut self, level: ErrorLevel, message: &str) -> Result<(), VmError> {
        if level.is_fatal() {
            return Err(VmError::Fatal(message.to_string()));
        }
        if self.silence == 0 {
            self.error_handler.report(level, message);
        }
        Ok(())
    }

    pub(crate) fn notice(&mut self, message: &str) {
        let _ = self.raise(ErrorLevel::Notice, message);
    }

    pub(crate) fn warning(&mut self, message: &str) {
        let _ = self.raise(ErrorLevel::Warning, message);
    }

    pub(crate) fn strict(&mut self, message: &str) {
        let _ = self.raise(ErrorLevel::Strict, message);
    }

    pub(crate) fn write_output(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.output_writer.write(bytes)
    }

    /// Execute frames until the frame count drops back to `target_depth`.
    ///
    /// Exceptions are dispatched to the innermost catch entry of the frames
    /// owned by this invocation; when none matches they propagate to the
    /// caller with those frames already unwound.
    pub(crate) fn run_loop(&mut self, target_depth: usize) -> Result<(), VmError> {
        while self.frames.len() > target_depth {
            self.opcodes_executed += 1;

            self.poll_countdown -= 1;
            if self.poll_countdown == 0 {
                self.poll_countdown = self.poll_interval;
                if let Err(e) = self.poll_cancellation() {
                    self.unwind_to(target_depth);
                    return Err(e);
                }
                self.maybe_collect();
            }

            let (code, pc) = {
                let frame = self.current_frame_mut()?;
                let pc = frame.pc;
                frame.pc += 1;
                (Arc::clone(&frame.code), pc)
            };

            let result = match code.get(pc) {
                // Running off the end is a value-less return
                None => self.return_from_frame(None),
                Some(instr) => {
                    if self.trace {
                        let scope = self.frames.last().map(|f| f.display_name()).unwrap_or_default();
                        eprintln!(
                            "[{:>3}] {} {:4}: {} (stack {})",
                            self.frames.len(),
                            scope,
                            pc,
                            instr,
                            self.operand_stack.len()
                        );
                    }
                    let outcome = self.execute_opcode(&instr.op);
                    if outcome.is_ok() && instr.tick {
                        self.tick()
                    } else {
                        outcome
                    }
                }
            };

            if let Err(err) = result {
                match err {
                    VmError::Exception(ex) => {
                        if !self.handle_exception(ex, target_depth) {
                            return Err(VmError::Exception(ex));
                        }
                    }
                    other => {
                        self.unwind_to(target_depth);
                        return Err(other);
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_cancellation(&mut self) -> Result<(), VmError> {
        match self.cancellation.as_ref().and_then(|c| c.poll()) {
            Some(reason) => Err(VmError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Route an exception to the innermost catch entry above `target_depth`,
    /// popping frames that have none. Returns false when no handler exists.
    fn handle_exception(&mut self, ex: Handle, target_depth: usize) -> bool {
        while self.frames.len() > target_depth {
            let Some(frame) = self.frames.last_mut() else {
                return false;
            };
            if let Some(entry) = frame.catch_stack.pop() {
                frame.fe_stack.truncate(entry.fe_depth);
                frame.list_stack.truncate(entry.list_depth);
                frame.invocations.truncate(entry.invocation_depth);
                frame.pc = entry.handler_pc;
                self.silence = entry.silence;
                self.operand_stack.truncate(entry.stack_height);
                self.operand_stack.push(ex);
                return true;
            }
            self.discard_frame();
        }
        false
    }

    /// Drop every frame above `target_depth` without producing results
    pub(crate) fn unwind_to(&mut self, target_depth: usize) {
        while self.frames.len() > target_depth {
            self.discard_frame();
        }
    }

    fn discard_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            self.operand_stack.truncate(frame.entry_height);
            self.release_scope(&frame);
        }
    }

    /// Tear down a finished frame and hand its result to the caller.
    ///
    /// The operand stack must be back at the frame's entry height; anything
    /// left above it is reported as [`VmError::StackImbalance`].
    pub(crate) fn return_from_frame(&mut self, value: Option<Handle>) -> Result<(), VmError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::RuntimeError("Return without an active frame".into()))?;

        let height = self.operand_stack.len();
        if height != frame.entry_height {
            self.operand_stack.truncate(frame.entry_height);
            self.release_scope(&frame);
            return Err(VmError::StackImbalance {
                height: height.saturating_sub(frame.entry_height),
            });
        }

        let returns_ref = frame.function.as_ref().is_some_and(|f| f.returns_ref);
        let result = match value {
            Some(h) if returns_ref => h,
            Some(h) => self.arena.clone_if_referenced(h),
            None => self.arena.alloc(Val::Null),
        };
        self.release_scope(&frame);

        if !frame.discard_result {
            self.operand_stack.push(result);
        }
        Ok(())
    }

    fn release_scope(&mut self, frame: &Frame) {
        if frame.owns_scope && frame.scope + 1 == self.scopes.len() {
            if let Some(scope) = self.scopes.pop() {
                for (_, h) in scope {
                    self.arena.unbind(h);
                }
            }
        }
    }

    fn tick(&mut self) -> Result<(), VmError> {
        let Some(&interval) = self.tick_intervals.last() else {
            return Ok(());
        };
        self.tick_counter += 1;
        if self.tick_counter < interval {
            return Ok(());
        }
        self.tick_counter = 0;
        for name in self.tick_functions.clone() {
            if let Some(callable) = self.context.find_function(name.as_str()).cloned() {
                self.call_sync(&callable, None, &[])?;
            }
        }
        Ok(())
    }

    /// Single opcode execution, delegated to the handler modules
    fn execute_opcode(&mut self, op: &OpCode) -> Result<(), VmError> {
        use OpCode::*;
        match op {
            Push(_) | Dup | Drop | Swap | Reverse(_) => self.exec_stack_op(op),

            Local { .. }
            | Indirect { .. }
            | IssetLocal { .. }
            | UnsetLocal(_)
            | AssignLocal { .. }
            | AssignRefLocal { .. }
            | LoadStatic { .. }
            | MakeGlobal(_)
            | Global { .. }
            | IssetGlobal { .. }
            | UnsetGlobal(_)
            | AssignGlobal { .. }
            | AssignRefGlobal { .. }
            | Constant(_)
            | ClassConstant { .. } => self.exec_variable_op(op),

            Arith { op, in_place } => self.exec_arith(*op, *in_place),
            Compare(op) => self.exec_compare(*op),
            Logical(op) => self.exec_logical(*op),
            Not | Neg | Plus | BitNot => self.exec_unary(op),
            Cast(kind) => self.exec_cast(*kind),
            IncDec { op, keep } => self.exec_inc_dec(*op, *keep),
            MultiConcat(n) => self.exec_multi_concat(n.get()),

            Branch(_) | BrTrue(_) | BrFalse(_) | Break { .. } | Return(_) | TryEnter(_) | TryExit
            | CatchEnter { .. } | Throw | Exit(_) | Echo | Error { .. } | Silence(_) | Ticks(_)
            | ReturnByRefCheck => self.exec_control_flow(op),

            FindFunction(_)
            | FindMethod(_)
            | FindStaticMethod { .. }
            | PrepareArg(_)
            | ArgContext { .. }
            | Invoke { .. } => self.exec_call_op(op),

            ClassNew { .. }
            | ObjectInitCheck
            | Clone
            | InstanceOf(_)
            | Property { .. }
            | AssignProperty { .. }
            | AssignRefProperty { .. }
            | IssetProperty { .. }
            | UnsetProperty(_)
            | StaticProperty { .. }
            | AssignStaticProperty { .. }
            | AssignRefStaticProperty { .. }
            | IssetStaticProperty { .. }
            | UnsetStaticProperty { .. } => self.exec_object_op(op),

            NewArray
            | ArrayInitCheck
            | ArrayAppend { .. }
            | ArrayInsert { .. }
            | Index { .. }
            | IndexAppend
            | AssignIndex { .. }
            | AssignRefIndex { .. }
            | AssignAppend { .. }
            | AssignRefAppend { .. }
            | IssetIndex { .. }
            | UnsetIndex(_) => self.exec_array_op(op),

            FeInit { arrow, by_ref, empty } => self.exec_fe_init(*arrow, *by_ref, *empty),
            FeNext(d) => self.exec_fe_next(*d),
            FeFree => self.exec_fe_free(),
            ListInit { count, silent } => self.exec_list_init(count.get(), *silent),
            ListNext { silent } => self.exec_list_next(*silent),
            ListFree { keep } => self.exec_list_free(*keep),
        }
    }

    fn exec_stack_op(&mut self, op: &OpCode) -> Result<(), VmError> {
        match op {
            OpCode::Push(lit) => {
                let h = self.arena.alloc(lit.to_val());
                self.operand_stack.push(h);
            }
            OpCode::Dup => {
                let h = self.peek_operand()?;
                self.operand_stack.push(h);
            }
            OpCode::Drop => {
                self.pop_operand_required()?;
            }
            OpCode::Swap => {
                if !self.operand_stack.swap_top() {
                    return Err(VmError::StackUnderflow { operation: "swap" });
                }
            }
            OpCode::Reverse(n) => {
                if !self.operand_stack.reverse_top(*n as usize) {
                    return Err(VmError::StackUnderflow { operation: "reverse" });
                }
            }
            _ => unreachable!("Not a stack op"),
        }
        Ok(())
    }
}
