//! Code blocks: instruction lists that track their net operand-stack effect
//!
//! Appends are checked against the push count the caller expects, and
//! branches are emitted with labels that are patched once the target is
//! known.

use crate::vm::opcode::{Instruction, OpCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("{contract} append expected a block with net push {expected}, found {actual}")]
    PushCountMismatch {
        contract: &'static str,
        expected: &'static str,
        actual: i32,
    },
    #[error("instruction {index} ({mnemonic}) carries no branch displacement")]
    NotABranch { index: usize, mnemonic: &'static str },
    #[error("label {index} does not refer to an instruction of this block")]
    DanglingLabel { index: usize },
}

/// Pending forward branch, resolved once the target position is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an unresolved label leaves a zero displacement behind"]
pub struct ForwardLabel(usize);

impl ForwardLabel {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered instruction sequence with a running declared net push count.
///
/// Sub-blocks are composed through the typed `append_*` operations, each of
/// which checks the sub-block's net effect against its contract, so the
/// stack shape of the result is known without simulating it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Instruction>", into = "Vec<Instruction>")]
pub struct CodeBlock {
    code: Vec<Instruction>,
    push_count: i32,
}

impl From<Vec<Instruction>> for CodeBlock {
    fn from(code: Vec<Instruction>) -> Self {
        let push_count = code.iter().map(Instruction::push_count).sum();
        Self { code, push_count }
    }
}

impl From<CodeBlock> for Vec<Instruction> {
    fn from(block: CodeBlock) -> Self {
        block.code
    }
}

impl FromIterator<OpCode> for CodeBlock {
    fn from_iter<I: IntoIterator<Item = OpCode>>(iter: I) -> Self {
        iter.into_iter().map(Instruction::new).collect::<Vec<_>>().into()
    }
}

impl CodeBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn push_count(&self) -> i32 {
        self.push_count
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    #[inline]
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.code.get(pc)
    }

    /// Append a single instruction, returning its index
    pub fn emit(&mut self, instr: impl Into<Instruction>) -> usize {
        let instr = instr.into();
        self.push_count += instr.push_count();
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Append a branch-carrying instruction whose displacement is patched
    /// later by [`CodeBlock::resolve_here`]
    pub fn emit_forward(&mut self, instr: impl Into<Instruction>) -> Result<ForwardLabel, BlockError> {
        let instr = instr.into();
        if instr.op.displacement().is_none() {
            return Err(BlockError::NotABranch {
                index: self.code.len(),
                mnemonic: instr.op.mnemonic(),
            });
        }
        Ok(ForwardLabel(self.emit(instr)))
    }

    /// Append a branch back to `target`; the displacement is computed from
    /// the instruction following the branch
    pub fn emit_backward(&mut self, mut instr: Instruction, target: usize) -> Result<usize, BlockError> {
        let displacement = target as i64 - (self.code.len() as i64 + 1);
        if !instr.op.set_displacement(displacement as i32) {
            return Err(BlockError::NotABranch {
                index: self.code.len(),
                mnemonic: instr.op.mnemonic(),
            });
        }
        Ok(self.emit(instr))
    }

    /// Point `label` at the next instruction to be appended
    pub fn resolve_here(&mut self, label: ForwardLabel) -> Result<(), BlockError> {
        let end = self.code.len();
        let instr = self
            .code
            .get_mut(label.0)
            .ok_or(BlockError::DanglingLabel { index: label.0 })?;
        let displacement = (end - (label.0 + 1)) as i32;
        if instr.op.set_displacement(displacement) {
            Ok(())
        } else {
            Err(BlockError::NotABranch {
                index: label.0,
                mnemonic: instr.op.mnemonic(),
            })
        }
    }

    pub fn resolve_all_here(&mut self, labels: impl IntoIterator<Item = ForwardLabel>) -> Result<(), BlockError> {
        labels.into_iter().try_for_each(|label| self.resolve_here(label))
    }

    /// Append a block that leaves exactly one value behind
    pub fn append_push1(&mut self, block: CodeBlock) -> Result<(), BlockError> {
        self.append_checked(block, "push-one", "1", |n| n == 1)
    }

    /// Append a block that consumes exactly one value
    pub fn append_pop1(&mut self, block: CodeBlock) -> Result<(), BlockError> {
        self.append_checked(block, "pop-one", "-1", |n| n == -1)
    }

    /// Append a block that leaves one or more values behind
    pub fn append_push(&mut self, block: CodeBlock) -> Result<(), BlockError> {
        self.append_checked(block, "push", "> 0", |n| n > 0)
    }

    /// Append a stack-neutral block
    pub fn append_flat(&mut self, block: CodeBlock) -> Result<(), BlockError> {
        self.append_checked(block, "flat", "0", |n| n == 0)
    }

    fn append_checked(
        &mut self,
        block: CodeBlock,
        contract: &'static str,
        expected: &'static str,
        accepts: impl Fn(i32) -> bool,
    ) -> Result<(), BlockError> {
        if !accepts(block.push_count) {
            return Err(BlockError::PushCountMismatch {
                contract,
                expected,
                actual: block.push_count,
            });
        }
        self.push_count += block.push_count;
        self.code.extend(block.code);
        Ok(())
    }

    pub fn remove_last(&mut self) -> Option<Instruction> {
        let instr = self.code.pop()?;
        self.push_count -= instr.push_count();
        Some(instr)
    }

    /// Flag the last instruction as a `declare(ticks)` boundary
    pub fn set_tick(&mut self) {
        if let Some(last) = self.code.last_mut() {
            last.tick = true;
        }
    }

    /// Stamp a source position onto every instruction that has none
    pub fn set_position(&mut self, file: &str, line: u32) {
        let file: std::sync::Arc<str> = std::sync::Arc::from(file);
        for instr in self.code.iter_mut().filter(|i| i.file.is_none()) {
            instr.file = Some(file.clone());
            if instr.line == 0 {
                instr.line = line;
            }
        }
    }
}

impl fmt::Display for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, instr) in self.code.iter().enumerate() {
            write!(f, "{:4}: {}", pc, instr)?;
            if let Some(d) = instr.op.displacement() {
                write!(f, "    ; -> {}", pc as i64 + 1 + d as i64)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
