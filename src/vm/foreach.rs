//! `foreach` iteration state
//!
//! Three sources are iterable:
//! - arrays: by-value loops walk a copy-on-write snapshot taken at FE_INIT
//!   and leave the caller's array untouched; by-reference loops (and loops
//!   over a variable that is itself a reference) walk the live array, see
//!   its modifications, and drive its internal pointer: reset at FE_INIT,
//!   then kept one element past the current one
//! - `Traversable` objects: driven through `Iterator` methods, with
//!   `IteratorAggregate::getIterator()` followed until an `Iterator` appears
//! - other objects: their properties visible from the running scope
//!
//! FE_INIT always pushes one entry onto the frame's foreach stack (`None`
//! when the source could not be iterated) so FE_FREE stays balanced.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_FE_RESET, ZEND_FE_FETCH

use crate::core::gc::Traceable;
use crate::core::value::{ArrayData, ArrayKey, Handle, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

/// Upper bound on `getIterator()` hops before giving up
const MAX_AGGREGATE_DEPTH: usize = 32;

#[derive(Debug)]
enum Source {
    Snapshot { array: Rc<ArrayData>, pos: usize },
    Live { slot: Handle, pos: usize, last_key: Option<ArrayKey> },
    Iterator { object: Handle },
    Properties { object: Handle, pos: usize },
}

#[derive(Debug)]
pub struct ForEachIterator {
    source: Source,
    arrow: bool,
    by_ref: bool,
}

impl Traceable for ForEachIterator {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        match &self.source {
            Source::Snapshot { array, .. } => array.trace_handles(tracer),
            Source::Live { slot, .. } => tracer(*slot),
            Source::Iterator { object } | Source::Properties { object, .. } => tracer(*object),
        }
    }
}

/// Value to bind and, for `$k => $v` loops, the key
type Produced = (Handle, Option<Handle>);

impl VM {
    pub(crate) fn exec_fe_init(&mut self, arrow: bool, by_ref: bool, empty: i32) -> Result<(), VmError> {
        let src = self.pop_operand_required()?;
        let mut iterator = self.start_foreach(src, arrow, by_ref)?;
        let produced = match iterator.as_mut() {
            Some(it) => self.advance_foreach(it, false)?,
            None => None,
        };
        self.current_frame_mut()?.fe_stack.push(iterator);
        match produced {
            Some(values) => {
                self.push_produced(values);
                Ok(())
            }
            None => self.branch(empty),
        }
    }

    pub(crate) fn exec_fe_next(&mut self, displacement: i32) -> Result<(), VmError> {
        let taken = self
            .current_frame_mut()?
            .fe_stack
            .last_mut()
            .ok_or_else(|| VmError::RuntimeError("FE_NEXT without an active foreach".into()))?
            .take();
        let Some(mut iterator) = taken else {
            return Ok(());
        };
        let result = self.advance_foreach(&mut iterator, true);
        if let Some(top) = self.current_frame_mut()?.fe_stack.last_mut() {
            *top = Some(iterator);
        }
        if let Some(values) = result? {
            self.push_produced(values);
            self.branch(displacement)?;
        }
        Ok(())
    }

    pub(crate) fn exec_fe_free(&mut self) -> Result<(), VmError> {
        self.current_frame_mut()?
            .fe_stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| VmError::RuntimeError("FE_FREE without an active foreach".into()))
    }

    fn push_produced(&mut self, (value, key): Produced) {
        self.operand_stack.push(value);
        if let Some(key) = key {
            self.operand_stack.push(key);
        }
    }

    fn start_foreach(&mut self, src: Handle, arrow: bool, by_ref: bool) -> Result<Option<ForEachIterator>, VmError> {
        let source = match self.arena.value(src) {
            Val::Array(array) => {
                let array = Rc::clone(array);
                let referable = self.arena.is_referenced(src) || self.arena.is_ref(src);
                if by_ref && !referable {
                    return Err(VmError::Fatal(
                        "Cannot create references to elements of a temporary array expression".into(),
                    ));
                }
                if by_ref || self.arena.is_ref(src) {
                    drop(array);
                    self.park_cursor(src, 0);
                    Source::Live {
                        slot: src,
                        pos: 0,
                        last_key: None,
                    }
                } else {
                    Source::Snapshot { array, pos: 0 }
                }
            }
            Val::Object(_) if self.instance_of(src, "Traversable") => {
                if by_ref {
                    return Err(VmError::Fatal(
                        "An iterator cannot be used with foreach by reference".into(),
                    ));
                }
                let object = self.resolve_iterator(src)?;
                Source::Iterator { object }
            }
            Val::Object(_) => Source::Properties {
                object: self.arena.copy_of(src),
                pos: 0,
            },
            _ => {
                self.warning("Invalid argument supplied for foreach()");
                return Ok(None);
            }
        };
        Ok(Some(ForEachIterator { source, arrow, by_ref }))
    }

    /// Follow `getIterator()` until an `Iterator` is reached
    fn resolve_iterator(&mut self, src: Handle) -> Result<Handle, VmError> {
        let mut object = self.arena.copy_of(src);
        for _ in 0..MAX_AGGREGATE_DEPTH {
            if self.instance_of(object, "Iterator") {
                return Ok(object);
            }
            let class = self.object_class(object).map(|c| c.to_string()).unwrap_or_default();
            if !self.instance_of(object, "IteratorAggregate") {
                return Err(VmError::Fatal(format!(
                    "Class {} must implement interface Traversable as part of either Iterator or IteratorAggregate",
                    class
                )));
            }
            let next = self.call_method_sync(object, "getIterator", &[])?;
            if !self.instance_of(next, "Traversable") {
                return Err(VmError::Fatal(format!(
                    "Objects returned by {}::getIterator() must be traversable or implement interface Iterator",
                    class
                )));
            }
            object = next;
        }
        Err(VmError::Fatal("Too many nested getIterator() calls in foreach".into()))
    }

    /// Produce the next element; `step` is false for the first one
    fn advance_foreach(&mut self, it: &mut ForEachIterator, step: bool) -> Result<Option<Produced>, VmError> {
        let arrow = it.arrow;
        let by_ref = it.by_ref;
        match &mut it.source {
            Source::Snapshot { array, pos } => {
                if step {
                    *pos += 1;
                }
                let Some((key, &elem)) = array.map.get_index(*pos) else {
                    return Ok(None);
                };
                let key = arrow.then(|| key.to_val());
                let value = self.arena.copy_of(elem);
                Ok(Some((value, key.map(|k| self.arena.alloc(k)))))
            }
            Source::Live { slot, pos, last_key } => {
                let slot = *slot;
                if !matches!(self.arena.value(slot), Val::Array(_)) {
                    self.warning("Invalid argument supplied for foreach()");
                    return Ok(None);
                }
                if step {
                    if let Some(index) = last_key.as_ref().and_then(|k| self.live_index_of(slot, k)) {
                        *pos = index + 1;
                    }
                }
                let (entry, len) = match self.arena.value(slot) {
                    Val::Array(arr) => (arr.map.get_index(*pos).map(|(k, &h)| (k.clone(), h)), arr.len()),
                    _ => (None, 0),
                };
                let Some((key, elem)) = entry else {
                    self.park_cursor(slot, len);
                    return Ok(None);
                };
                *last_key = Some(key.clone());
                let value = if by_ref {
                    // The element must live in this variable's own storage
                    let elem = self
                        .arena
                        .array_mut(slot)
                        .and_then(|arr| arr.get(&key))
                        .unwrap_or(elem);
                    self.arena.make_ref(elem);
                    elem
                } else {
                    self.arena.copy_of(elem)
                };
                // The pointer runs one element ahead of the loop variable
                self.park_cursor(slot, *pos + 1);
                let key = arrow.then(|| self.arena.alloc(key.to_val()));
                Ok(Some((value, key)))
            }
            Source::Iterator { object } => {
                let object = *object;
                let method = if step { "next" } else { "rewind" };
                self.call_method_sync(object, method, &[])?;
                let valid = self.call_method_sync(object, "valid", &[])?;
                if !self.value_to_bool(valid) {
                    return Ok(None);
                }
                let current = self.call_method_sync(object, "current", &[])?;
                let value = self.arena.clone_if_referenced(current);
                let key = if arrow {
                    Some(self.call_method_sync(object, "key", &[])?)
                } else {
                    None
                };
                Ok(Some((value, key)))
            }
            Source::Properties { object, pos } => {
                let object = *object;
                if step {
                    *pos += 1;
                }
                loop {
                    let entry = self.arena.object(object).and_then(|o| {
                        o.properties
                            .get_index(*pos)
                            .map(|(name, &h)| (o.class.clone(), name.clone(), h))
                    });
                    let Some((class, name, slot)) = entry else {
                        return Ok(None);
                    };
                    if self.property_accessible(&class, name.as_str()).is_err() {
                        *pos += 1;
                        continue;
                    }
                    let value = if by_ref {
                        self.arena.make_ref(slot);
                        slot
                    } else {
                        self.arena.copy_of(slot)
                    };
                    let key = arrow.then(|| self.arena.alloc(Val::string(name.as_bytes())));
                    return Ok(Some((value, key)));
                }
            }
        }
    }

    /// Move the internal pointer of the array in `slot`, leaving shared
    /// storage alone when it is already there
    fn park_cursor(&mut self, slot: Handle, position: usize) {
        let current = match self.arena.value(slot) {
            Val::Array(arr) => arr.cursor,
            _ => return,
        };
        if current == position {
            return;
        }
        if let Some(arr) = self.arena.array_mut(slot) {
            if position == 0 {
                arr.reset();
            } else {
                arr.cursor = position;
            }
        }
    }

    fn live_index_of(&self, slot: Handle, key: &ArrayKey) -> Option<usize> {
        match self.arena.value(slot) {
            Val::Array(arr) => arr.map.get_index_of(key),
            _ => None,
        }
    }
}
