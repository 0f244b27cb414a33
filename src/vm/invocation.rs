//! Pending calls between target resolution and INVOKE.
//!
//! FIND_* pushes an entry; argument preparation consults the top entry for
//! the callee's parameter declarations; INVOKE pops it. Nested calls in
//! argument expressions stack naturally.

use crate::core::gc::Traceable;
use crate::core::value::{Handle, Name};
use crate::runtime::context::{Callable, PassMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Direct,
    /// Routed to `__call(name, args)`
    MagicCall,
    /// Routed to `__callStatic(name, args)`
    MagicCallStatic,
}

#[derive(Debug, Clone)]
pub struct InvocationEntry {
    pub callable: Callable,
    pub receiver: Option<Handle>,
    /// Method name the caller asked for (used by magic calls)
    pub name: Name,
    pub kind: CallKind,
    /// Class whose private members the callee may touch
    pub class_scope: Option<Name>,
    /// Late static binding target
    pub called_class: Option<Name>,
}

impl InvocationEntry {
    pub fn function(callable: Callable) -> Self {
        let name = callable.name().clone();
        Self {
            callable,
            receiver: None,
            name,
            kind: CallKind::Direct,
            class_scope: None,
            called_class: None,
        }
    }

    /// Declared pass mode of argument `index`; magic calls take everything
    /// by value
    pub fn param_pass(&self, index: usize) -> PassMode {
        match self.kind {
            CallKind::Direct => self.callable.param_pass(index),
            CallKind::MagicCall | CallKind::MagicCallStatic => PassMode::ByValue,
        }
    }
}

#[derive(Debug, Default)]
pub struct InvocationStack {
    entries: Vec<InvocationEntry>,
}

impl InvocationStack {
    pub fn push(&mut self, entry: InvocationEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<InvocationEntry> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&InvocationEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn truncate(&mut self, depth: usize) {
        self.entries.truncate(depth);
    }
}

impl Traceable for InvocationStack {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        for h in self.entries.iter().filter_map(|e| e.receiver) {
            tracer(h);
        }
    }
}
