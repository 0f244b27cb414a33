//! `list(...) = expr` destructuring
//!
//! LIST_INIT pops the source and produces the element for the *last*
//! variable; each LIST_NEXT produces the one before it, so assignments run
//! right to left as in PHP 5. LIST_FREE drops the iterator, optionally
//! leaving the source as the value of the whole expression.

use crate::core::gc::Traceable;
use crate::core::value::{ArrayKey, Handle, Val};
use crate::vm::engine::{VM, VmError};

#[derive(Debug, Clone)]
pub struct ListIterator {
    source: Handle,
    remaining: u32,
}

impl ListIterator {
    pub fn new(source: Handle, count: u32) -> Self {
        Self {
            source,
            remaining: count,
        }
    }

    pub fn source(&self) -> Handle {
        self.source
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Traceable for ListIterator {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        tracer(self.source);
    }
}

impl VM {
    pub(crate) fn exec_list_init(&mut self, count: u32, silent: bool) -> Result<(), VmError> {
        let src = self.pop_operand_required()?;
        if let Val::Object(_) = self.arena.value(src) {
            let class = self.object_class(src).map(|c| c.to_string()).unwrap_or_default();
            return Err(VmError::Fatal(format!("Cannot use object of type {} as array", class)));
        }
        let source = self.arena.copy_of(src);
        let mut iterator = ListIterator::new(source, count);
        let value = self.list_element(&mut iterator, silent);
        self.current_frame_mut()?.list_stack.push(iterator);
        self.operand_stack.push(value);
        Ok(())
    }

    pub(crate) fn exec_list_next(&mut self, silent: bool) -> Result<(), VmError> {
        let mut iterator = self
            .current_frame_mut()?
            .list_stack
            .last()
            .cloned()
            .ok_or_else(|| VmError::RuntimeError("LIST_NEXT without an active list".into()))?;
        let value = self.list_element(&mut iterator, silent);
        if let Some(top) = self.current_frame_mut()?.list_stack.last_mut() {
            *top = iterator;
        }
        self.operand_stack.push(value);
        Ok(())
    }

    pub(crate) fn exec_list_free(&mut self, keep: bool) -> Result<(), VmError> {
        let iterator = self
            .current_frame_mut()?
            .list_stack
            .pop()
            .ok_or_else(|| VmError::RuntimeError("LIST_FREE without an active list".into()))?;
        if keep {
            self.operand_stack.push(iterator.source);
        }
        Ok(())
    }

    /// Element at index `remaining - 1`, then count down
    fn list_element(&mut self, iterator: &mut ListIterator, silent: bool) -> Handle {
        let index = i64::from(iterator.remaining) - 1;
        iterator.remaining = iterator.remaining.saturating_sub(1);

        match self.arena.value(iterator.source) {
            Val::Array(arr) => match arr.get(&ArrayKey::Int(index)) {
                Some(elem) => self.arena.copy_of(elem),
                None => {
                    if !silent {
                        self.notice(&format!("Undefined offset: {}", index));
                    }
                    self.arena.alloc(Val::Null)
                }
            },
            Val::String(s) => match usize::try_from(index).ok().and_then(|i| s.get(i)) {
                Some(&b) => self.arena.alloc(Val::string(&[b])),
                None => {
                    if !silent {
                        self.notice(&format!("Uninitialized string offset: {}", index));
                    }
                    self.arena.alloc(Val::string(b""))
                }
            },
            _ => self.arena.alloc(Val::Null),
        }
    }
}
