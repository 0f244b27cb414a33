//! Stack operation helpers to reduce boilerplate
//!
//! Most handlers pop their operands, do the work and push a result. These
//! helpers standardise the first step and report [`VmError::StackUnderflow`]
//! with the operation that ran dry.

use crate::core::value::{Handle, Name, Val};
use crate::vm::engine::{VM, VmError};

impl VM {
    /// Pop a single operand
    #[inline(always)]
    pub(crate) fn pop_operand_required(&mut self) -> Result<Handle, VmError> {
        self.operand_stack
            .pop()
            .ok_or(VmError::StackUnderflow { operation: "pop" })
    }

    /// Pop two operands for binary operations (returns in (left, right) order)
    #[inline]
    pub(crate) fn pop_binary_operands(&mut self) -> Result<(Handle, Handle), VmError> {
        let right = self.pop_operand_required()?;
        let left = self.pop_operand_required()?;
        Ok((left, right))
    }

    /// Pop N operands and return them in the order they were pushed
    #[inline]
    pub(crate) fn pop_n_operands(&mut self, count: usize) -> Result<Vec<Handle>, VmError> {
        if self.operand_stack.len() < count {
            return Err(VmError::StackUnderflow { operation: "pop_n" });
        }
        let mut operands = Vec::with_capacity(count);
        for _ in 0..count {
            operands.push(self.pop_operand_required()?);
        }
        operands.reverse();
        Ok(operands)
    }

    #[inline]
    pub(crate) fn peek_operand(&self) -> Result<Handle, VmError> {
        self.operand_stack
            .peek()
            .ok_or(VmError::StackUnderflow { operation: "peek" })
    }

    /// Push a fresh temporary holding `val`
    #[inline]
    pub(crate) fn push_value(&mut self, val: Val) {
        let h = self.arena.alloc(val);
        self.operand_stack.push(h);
    }

    /// Name operand: the inline one when present, otherwise popped and
    /// converted to a string
    pub(crate) fn name_operand(&mut self, inline: &Option<Name>) -> Result<Name, VmError> {
        match inline {
            Some(name) => Ok(name.clone()),
            None => {
                let h = self.pop_operand_required()?;
                let bytes = self.value_to_string_bytes(h)?;
                Ok(Name::from_bytes(&bytes))
            }
        }
    }
}
