//! Static stack-shape check for code blocks.
//!
//! Walks every control-flow edge of a block with the declared stack effects
//! from [`OpCode::push_count`] and reports the first inconsistency on each
//! path. This is the executable use of the push-count table: a block that
//! passes can be run without the interpreter ever hitting an operand-stack
//! underflow caused by mis-composed code.
//!
//! Exception handlers are modelled with the caught value already on the
//! stack: the try-enter handler edge carries `height + 1`, and catch-enter
//! is neutral on both of its edges (its declared `+1` is a composition-time
//! account of that same value).

use crate::compiler::block::CodeBlock;
use crate::vm::opcode::OpCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("recorded net push {recorded} differs from the instruction total {computed}")]
    PushCountMismatch { recorded: i32, computed: i32 },
    #[error("branch at instruction {at} targets {target}, outside the block")]
    BranchOutOfRange { at: usize, target: i64 },
    #[error("stack underflow at instruction {at}: height would be {height}")]
    StackUnderflow { at: usize, height: i64 },
    #[error("inconsistent stack height at instruction {at}: {first} on one path, {second} on another")]
    HeightMismatch { at: usize, first: i64, second: i64 },
    #[error("return at instruction {at} leaves {height} values where {expected} expected")]
    UnbalancedReturn { at: usize, height: i64, expected: i64 },
}

/// Stack heights computed for each reachable instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProfile {
    pub heights: Vec<Option<i64>>,
    pub max_height: i64,
}

/// Verify a block entered with an empty operand stack
pub fn verify(block: &CodeBlock) -> Result<StackProfile, Vec<VerifyError>> {
    let mut errors = Vec::new();

    let computed: i32 = block.instructions().iter().map(|i| i.push_count()).sum();
    if computed != block.push_count() {
        errors.push(VerifyError::PushCountMismatch {
            recorded: block.push_count(),
            computed,
        });
    }

    let len = block.len();
    let mut heights: Vec<Option<i64>> = vec![None; len];
    let mut max_height = 0;
    let mut worklist = Vec::new();
    if len > 0 {
        heights[0] = Some(0);
        worklist.push(0usize);
    }

    while let Some(pc) = worklist.pop() {
        let Some(height) = heights[pc] else { continue };
        let Some(instr) = block.get(pc) else { continue };
        max_height = max_height.max(height);

        if let OpCode::Return(with_value) = instr.op {
            let expected = with_value as i64;
            if height != expected {
                errors.push(VerifyError::UnbalancedReturn { at: pc, height, expected });
            }
            continue;
        }

        for (target, next_height) in successors(pc, height, &instr.op) {
            if next_height < 0 {
                errors.push(VerifyError::StackUnderflow { at: pc, height: next_height });
                continue;
            }
            if target < 0 || target > len as i64 {
                errors.push(VerifyError::BranchOutOfRange { at: pc, target });
                continue;
            }
            // Falling off the end is an implicit value-less return
            if target == len as i64 {
                continue;
            }
            let target = target as usize;
            match heights[target] {
                None => {
                    heights[target] = Some(next_height);
                    worklist.push(target);
                }
                Some(existing) if existing != next_height => {
                    errors.push(VerifyError::HeightMismatch {
                        at: target,
                        first: existing,
                        second: next_height,
                    });
                }
                Some(_) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(StackProfile { heights, max_height })
    } else {
        Err(errors)
    }
}

/// Outgoing edges as `(target_pc, height_on_arrival)`.
///
/// The back edge of fe-next is omitted: its arrival height depends on the
/// arrow flag of the matching fe-init, and the loop head was already reached
/// through that fe-init.
fn successors(pc: usize, height: i64, op: &OpCode) -> Vec<(i64, i64)> {
    let next = pc as i64 + 1;
    let mut edges = Vec::with_capacity(2);

    match op {
        OpCode::CatchEnter { skip, .. } => {
            edges.push((next, height));
            edges.push((next + *skip as i64, height));
            return edges;
        }
        OpCode::TryEnter(d) => edges.push((next + *d as i64, height + 1)),
        OpCode::Branch(d) => edges.push((next + *d as i64, height)),
        OpCode::BrTrue(d) | OpCode::BrFalse(d) => edges.push((next + *d as i64, height - 1)),
        OpCode::FeInit { empty, .. } => edges.push((next + *empty as i64, height - 1)),
        OpCode::ClassNew { no_ctor, .. } => {
            edges.push((next + *no_ctor as i64, height + op.push_count() as i64))
        }
        OpCode::Break { loops } => {
            for level in 0..(*loops).max(1) {
                edges.push((next + level as i64, height - 1));
            }
        }
        OpCode::ArgContext { by_value, by_ref, .. } => {
            edges.push((next + *by_value as i64, height));
            edges.push((next + *by_ref as i64, height));
        }
        _ => {}
    }

    if !op.is_terminal() {
        edges.push((next, height + op.push_count() as i64));
    }
    edges
}
