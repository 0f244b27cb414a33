//! Control flow operations
//!
//! ## Operations
//!
//! - **Branch / BrTrue / BrFalse**: displacement relative to the next
//!   instruction; the conditional forms pop their operand
//! - **Break**: pops the requested level count and lands on the matching
//!   entry of the branch table that follows it
//! - **TryEnter / TryExit / CatchEnter / Throw**: catch-stack management;
//!   the unwinder itself lives in the engine loop
//! - **Return / Exit**: frame and script termination
//!
//! Conditional jumps use PHP's truthiness rules:
//! - Falsy: false, 0, 0.0, "", "0", null, empty arrays
//! - Truthy: everything else
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - jump, throw and catch handlers

use crate::core::value::{Name, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::OpCode;

impl VM {
    pub(crate) fn exec_control_flow(&mut self, op: &OpCode) -> Result<(), VmError> {
        match op {
            OpCode::Branch(d) => self.branch(*d),
            OpCode::BrTrue(d) => self.branch_if(*d, true),
            OpCode::BrFalse(d) => self.branch_if(*d, false),
            OpCode::Break { loops } => self.exec_break(*loops),
            OpCode::Return(with_value) => {
                let value = if *with_value {
                    Some(self.pop_operand_required()?)
                } else {
                    None
                };
                self.return_from_frame(value)
            }
            OpCode::TryEnter(d) => {
                let height = self.operand_stack.len();
                let silence = self.silence;
                let frame = self.current_frame_mut()?;
                let handler = (frame.pc as i64 + *d as i64) as usize;
                let entry = frame.catch_entry(handler, height, silence);
                frame.catch_stack.push(entry);
                Ok(())
            }
            OpCode::TryExit => {
                self.current_frame_mut()?
                    .catch_stack
                    .pop()
                    .map(|_| ())
                    .ok_or_else(|| VmError::RuntimeError("TRY_EXIT without an active try region".into()))
            }
            OpCode::CatchEnter { class, skip } => self.exec_catch_enter(class, *skip),
            OpCode::Throw => self.exec_throw(),
            OpCode::Exit(with_status) => self.exec_exit(*with_status),
            OpCode::Echo => {
                let h = self.pop_operand_required()?;
                let bytes = self.value_to_string_bytes(h)?;
                self.write_output(&bytes)
            }
            OpCode::Error { level, message } => self.raise(*level, message),
            OpCode::Silence(begin) => {
                if *begin {
                    self.silence += 1;
                } else {
                    self.silence = self.silence.saturating_sub(1);
                }
                Ok(())
            }
            OpCode::Ticks(interval) => {
                match interval {
                    Some(n) => self.tick_intervals.push((*n).max(1)),
                    None => {
                        self.tick_intervals.pop();
                    }
                }
                self.tick_counter = 0;
                Ok(())
            }
            OpCode::ReturnByRefCheck => {
                let h = self.peek_operand()?;
                let returns_ref = self
                    .current_frame()?
                    .function
                    .as_ref()
                    .is_some_and(|f| f.returns_ref);
                if returns_ref && !self.arena.is_referenced(h) {
                    self.notice("Only variable references should be returned by reference");
                }
                Ok(())
            }
            _ => unreachable!("Not a control flow op"),
        }
    }

    fn branch_if(&mut self, displacement: i32, when: bool) -> Result<(), VmError> {
        let h = self.pop_operand_required()?;
        if self.value_to_bool(h) == when {
            self.branch(displacement)?;
        }
        Ok(())
    }

    /// `break N` / `continue N`. The instruction is followed by `loops`
    /// branches, one per enclosing loop level; level N lands on branch N.
    fn exec_break(&mut self, loops: u32) -> Result<(), VmError> {
        let h = self.pop_operand_required()?;
        let levels = self.arena.value(h).to_int().max(1);
        if levels > loops as i64 {
            return Err(VmError::Fatal(format!(
                "Cannot break {} level{}",
                levels,
                if levels == 1 { "" } else { "s" }
            )));
        }
        self.branch((levels - 1) as i32)
    }

    /// Catch clauses test the in-flight exception (left on the stack by the
    /// unwinder) and skip to the next clause when the class doesn't match
    fn exec_catch_enter(&mut self, class: &Name, skip: i32) -> Result<(), VmError> {
        let ex = self.peek_operand()?;
        let class = self.resolve_class_name(class)?;
        if !self.instance_of(ex, class.as_str()) {
            self.branch(skip)?;
        }
        Ok(())
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_THROW
    fn exec_throw(&mut self) -> Result<(), VmError> {
        let h = self.pop_operand_required()?;
        if !matches!(self.arena.value(h), Val::Object(_)) {
            return Err(VmError::Fatal("Can only throw objects".into()));
        }
        if !self.instance_of(h, "Exception") {
            return Err(VmError::Fatal(
                "Exceptions must be valid objects derived from the Exception base class".into(),
            ));
        }
        Err(VmError::Exception(h))
    }

    fn exec_exit(&mut self, with_status: bool) -> Result<(), VmError> {
        if !with_status {
            return Err(VmError::Exit(0));
        }
        let h = self.pop_operand_required()?;
        match self.arena.value(h).clone() {
            Val::Int(status) => Err(VmError::Exit(status)),
            Val::String(s) => {
                self.write_output(&s)?;
                Err(VmError::Exit(0))
            }
            other => Err(VmError::Exit(other.to_int())),
        }
    }
}
