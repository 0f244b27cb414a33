//! Array construction, index access and index assignment
//!
//! Write-type fetches (`W`, `RW`, `U`, `FE`) split copy-on-write storage
//! before handing out an element slot, so a write through that slot can only
//! reach the container it was fetched from. Objects implementing
//! `ArrayAccess` are routed to their `offset*` methods.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_fetch_dimension_address
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_ASSIGN_DIM, ZEND_ISSET_ISEMPTY_DIM_OBJ

use crate::core::value::{ArrayKey, Handle, Literal, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::{Intent, OpCode};
use std::rc::Rc;

/// Index operand: the raw value (for `ArrayAccess`) and its normalised key,
/// `None` for illegal offset types
#[derive(Debug, Clone)]
pub(crate) struct KeyOperand {
    pub handle: Handle,
    pub key: Option<ArrayKey>,
}

fn undefined_key_message(key: &ArrayKey) -> String {
    match key {
        ArrayKey::Int(i) => format!("Undefined offset: {}", i),
        ArrayKey::Str(s) => format!("Undefined index: {}", String::from_utf8_lossy(s)),
    }
}

impl VM {
    pub(crate) fn exec_array_op(&mut self, op: &OpCode) -> Result<(), VmError> {
        match op {
            OpCode::NewArray => self.push_value(Val::empty_array()),
            OpCode::ArrayInitCheck => {
                let slot = self.peek_operand()?;
                self.autovivify_array(slot);
            }
            OpCode::ArrayAppend { by_ref } => {
                let value = self.pop_operand_required()?;
                let array = self.peek_operand()?;
                self.append_element(array, value, *by_ref)?;
            }
            OpCode::ArrayInsert { by_ref } => {
                let value = self.pop_operand_required()?;
                let key = self.key_operand(&None)?;
                let array = self.peek_operand()?;
                if let Some(key) = key.key {
                    self.insert_element(array, key, value, *by_ref)?;
                }
            }
            OpCode::Index { key, intent } => {
                let key = self.key_operand(key)?;
                let container = self.pop_operand_required()?;
                let h = self.fetch_index(container, key, *intent)?;
                self.operand_stack.push(h);
            }
            OpCode::IndexAppend => {
                let container = self.pop_operand_required()?;
                let h = self.fetch_append(container)?;
                self.operand_stack.push(h);
            }
            OpCode::AssignIndex { key, keep } => {
                let key = self.key_operand(key)?;
                let container = self.pop_operand_required()?;
                let value = self.pop_operand_required()?;
                let result = self.assign_index(container, key, value)?;
                if *keep {
                    self.operand_stack.push(result);
                }
            }
            OpCode::AssignRefIndex { key, keep } => {
                let key = self.key_operand(key)?;
                let container = self.pop_operand_required()?;
                let slot = self.pop_operand_required()?;
                self.assign_ref_index(container, Some(key), slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }
            OpCode::AssignAppend { keep } => {
                let container = self.pop_operand_required()?;
                let value = self.pop_operand_required()?;
                self.assign_append(container, value)?;
                if *keep {
                    let kept = self.arena.clone_if_referenced(value);
                    self.operand_stack.push(kept);
                }
            }
            OpCode::AssignRefAppend { keep } => {
                let container = self.pop_operand_required()?;
                let slot = self.pop_operand_required()?;
                self.assign_ref_index(container, None, slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }
            OpCode::IssetIndex { key, empty } => {
                let key = self.key_operand(key)?;
                let container = self.pop_operand_required()?;
                let result = self.isset_index(container, key, *empty)?;
                self.push_value(Val::Bool(result));
            }
            OpCode::UnsetIndex(key) => {
                let key = self.key_operand(key)?;
                let container = self.pop_operand_required()?;
                self.unset_index(container, key)?;
            }
            _ => unreachable!("Not an array op"),
        }
        Ok(())
    }

    fn key_operand(&mut self, inline: &Option<Literal>) -> Result<KeyOperand, VmError> {
        let handle = match inline {
            Some(lit) => self.arena.alloc(lit.to_val()),
            None => self.pop_operand_required()?,
        };
        let key = ArrayKey::from_val(self.arena.value(handle));
        if key.is_none() {
            self.warning("Illegal offset type");
        }
        Ok(KeyOperand { handle, key })
    }

    /// `null`, `false` and `""` silently become an empty array on write
    pub(crate) fn autovivify_array(&mut self, slot: Handle) {
        if self.arena.value(slot).is_empty_for_autovivify() {
            self.arena.set_value(slot, Val::empty_array());
        }
    }

    fn is_array_access(&self, h: Handle) -> bool {
        self.instance_of(h, "ArrayAccess")
    }

    fn not_an_array_object(&self, h: Handle) -> VmError {
        let class = self
            .object_class(h)
            .map(|c| c.to_string())
            .unwrap_or_default();
        VmError::Fatal(format!("Cannot use object of type {} as array", class))
    }

    /// Element slot of `array`, created as null when missing
    fn element_for_write(&mut self, array: Handle, key: ArrayKey) -> Handle {
        let existing = self.arena.array_mut(array).and_then(|arr| arr.get(&key));
        if let Some(h) = existing {
            return h;
        }
        let slot = self.arena.alloc(Val::Null);
        self.arena.bind(slot);
        if let Some(arr) = self.arena.array_mut(array) {
            arr.insert(key, slot);
        }
        slot
    }

    fn array_get(&self, array: Handle, key: &ArrayKey) -> Option<Handle> {
        match self.arena.value(array) {
            Val::Array(arr) => arr.get(key),
            _ => None,
        }
    }

    fn fetch_index(&mut self, container: Handle, key: KeyOperand, intent: Intent) -> Result<Handle, VmError> {
        let writes = matches!(intent, Intent::W | Intent::RW);
        if writes {
            self.autovivify_array(container);
        }

        match self.arena.value(container) {
            Val::Array(_) => match key.key {
                Some(k) => Ok(self.fetch_element(container, k, intent)),
                None => Ok(self.arena.alloc(Val::Null)),
            },
            Val::String(s) => {
                if writes {
                    return Err(VmError::Fatal("Cannot use string offset as an array".into()));
                }
                let s = Rc::clone(s);
                let offset = self.string_offset(&key, intent == Intent::R)?;
                match offset.and_then(|i| s.get(i)) {
                    Some(&b) => Ok(self.arena.alloc(Val::String(Rc::new(vec![b])))),
                    None if intent == Intent::R => {
                        let index = self.arena.value(key.handle).to_int();
                        self.notice(&format!("Uninitialized string offset: {}", index));
                        Ok(self.arena.alloc(Val::string(b"")))
                    }
                    None => Ok(self.arena.alloc(Val::Null)),
                }
            }
            Val::Object(_) => {
                if !self.is_array_access(container) {
                    return Err(self.not_an_array_object(container));
                }
                if intent == Intent::I {
                    let exists = self.call_method_sync(container, "offsetExists", &[key.handle])?;
                    if !self.value_to_bool(exists) {
                        return Ok(self.arena.alloc(Val::Null));
                    }
                }
                self.call_method_sync(container, "offsetGet", &[key.handle])
            }
            Val::Null => Ok(self.arena.alloc(Val::Null)),
            _ => {
                if writes {
                    self.warning("Cannot use a scalar value as an array");
                }
                Ok(self.arena.alloc(Val::Null))
            }
        }
    }

    /// Element slot of the array in `container` for the given intent. Reads
    /// leave the storage shared; every other intent splits it first.
    fn fetch_element(&mut self, container: Handle, key: ArrayKey, intent: Intent) -> Handle {
        match intent {
            Intent::R | Intent::I => match self.array_get(container, &key) {
                Some(h) => h,
                None => {
                    if intent == Intent::R {
                        self.notice(&undefined_key_message(&key));
                    }
                    self.arena.alloc(Val::Null)
                }
            },
            Intent::W => self.element_for_write(container, key),
            Intent::RW => {
                if self.array_get(container, &key).is_none() {
                    self.notice(&undefined_key_message(&key));
                }
                self.element_for_write(container, key)
            }
            Intent::U | Intent::FE => {
                let existing = self.arena.array_mut(container).and_then(|a| a.get(&key));
                match existing {
                    Some(h) => h,
                    None => {
                        if intent == Intent::FE {
                            self.notice(&undefined_key_message(&key));
                        }
                        self.arena.alloc(Val::Null)
                    }
                }
            }
        }
    }

    /// Byte position addressed by a string offset; non-numeric keys warn and
    /// read as 0
    fn string_offset(&mut self, key: &KeyOperand, warn: bool) -> Result<Option<usize>, VmError> {
        let index = match &key.key {
            Some(ArrayKey::Int(i)) => *i,
            Some(ArrayKey::Str(s)) => {
                if warn {
                    self.warning(&format!("Illegal string offset '{}'", String::from_utf8_lossy(s)));
                }
                self.arena.value(key.handle).to_int()
            }
            None => return Ok(None),
        };
        Ok(usize::try_from(index).ok())
    }

    fn fetch_append(&mut self, container: Handle) -> Result<Handle, VmError> {
        self.autovivify_array(container);
        match self.arena.value(container) {
            Val::Array(_) => {
                let slot = self.arena.alloc(Val::Null);
                self.arena.bind(slot);
                let pushed = self.arena.array_mut(container).map(|arr| {
                    if arr.next_index() == i64::MAX {
                        false
                    } else {
                        arr.push(slot);
                        true
                    }
                });
                if pushed != Some(true) {
                    self.warning("Cannot add element to the array as the next element is already occupied");
                }
                Ok(slot)
            }
            Val::String(_) => Err(VmError::Fatal("[] operator not supported for strings".into())),
            Val::Object(_) => {
                if !self.is_array_access(container) {
                    return Err(self.not_an_array_object(container));
                }
                let null = self.arena.alloc(Val::Null);
                self.call_method_sync(container, "offsetGet", &[null])
            }
            _ => {
                self.warning("Cannot use a scalar value as an array");
                Ok(self.arena.alloc(Val::Null))
            }
        }
    }

    /// Add `value` to an array under construction
    fn append_element(&mut self, array: Handle, value: Handle, by_ref: bool) -> Result<(), VmError> {
        let slot = self.element_slot(value, by_ref);
        match self.arena.array_mut(array) {
            Some(arr) => {
                arr.push(slot);
                Ok(())
            }
            None => Err(VmError::RuntimeError("ARRAY_APPEND on a non-array".into())),
        }
    }

    fn insert_element(&mut self, array: Handle, key: ArrayKey, value: Handle, by_ref: bool) -> Result<(), VmError> {
        let slot = self.element_slot(value, by_ref);
        match self.arena.array_mut(array) {
            Some(arr) => {
                if let Some(old) = arr.insert(key, slot) {
                    self.arena.unbind(old);
                }
                Ok(())
            }
            None => Err(VmError::RuntimeError("ARRAY_INSERT on a non-array".into())),
        }
    }

    /// Bound slot to store in a container: the value's own slot made a
    /// reference, or a private copy
    fn element_slot(&mut self, value: Handle, by_ref: bool) -> Handle {
        let slot = if by_ref {
            self.arena.make_ref(value);
            value
        } else {
            self.arena.copy_of(value)
        };
        self.arena.bind(slot);
        slot
    }

    fn assign_index(&mut self, container: Handle, key: KeyOperand, value: Handle) -> Result<Handle, VmError> {
        self.autovivify_array(container);
        match self.arena.value(container) {
            Val::Array(_) => {
                if let Some(k) = key.key {
                    let slot = self.element_for_write(container, k);
                    let val = self.arena.value(value).clone();
                    self.arena.set_value(slot, val);
                }
                Ok(self.arena.clone_if_referenced(value))
            }
            Val::String(s) => {
                let current = Rc::clone(s);
                self.assign_string_offset(container, &current, &key, value)
            }
            Val::Object(_) => {
                if !self.is_array_access(container) {
                    return Err(self.not_an_array_object(container));
                }
                let copy = self.arena.copy_of(value);
                self.call_method_sync(container, "offsetSet", &[key.handle, copy])?;
                Ok(copy)
            }
            _ => {
                self.warning("Cannot use a scalar value as an array");
                Ok(self.arena.clone_if_referenced(value))
            }
        }
    }

    /// `$s[i] = 'x'`: replace one byte, padding with spaces past the end
    fn assign_string_offset(
        &mut self,
        container: Handle,
        current: &[u8],
        key: &KeyOperand,
        value: Handle,
    ) -> Result<Handle, VmError> {
        let index = match &key.key {
            Some(ArrayKey::Int(i)) if *i >= 0 => *i as usize,
            _ => {
                self.warning(&format!(
                    "Illegal string offset: {}",
                    self.arena.value(key.handle).to_int()
                ));
                return Ok(self.arena.alloc(Val::Null));
            }
        };
        let replacement = self.value_to_string_bytes(value)?;
        let Some(&byte) = replacement.first() else {
            self.warning("Cannot assign an empty string to a string offset");
            return Ok(self.arena.alloc(Val::Null));
        };
        let mut bytes = current.to_vec();
        if bytes.len() <= index {
            bytes.resize(index + 1, b' ');
        }
        bytes[index] = byte;
        self.arena.set_value(container, Val::String(Rc::new(bytes)));
        Ok(self.arena.alloc(Val::String(Rc::new(vec![byte]))))
    }

    fn assign_append(&mut self, container: Handle, value: Handle) -> Result<(), VmError> {
        self.autovivify_array(container);
        match self.arena.value(container) {
            Val::Array(_) => {
                let slot = self.arena.copy_of(value);
                self.arena.bind(slot);
                let pushed = self.arena.array_mut(container).map(|arr| {
                    if arr.next_index() == i64::MAX {
                        false
                    } else {
                        arr.push(slot);
                        true
                    }
                });
                if pushed != Some(true) {
                    self.arena.unbind(slot);
                    self.warning("Cannot add element to the array as the next element is already occupied");
                }
                Ok(())
            }
            Val::String(_) => Err(VmError::Fatal("[] operator not supported for strings".into())),
            Val::Object(_) => {
                if !self.is_array_access(container) {
                    return Err(self.not_an_array_object(container));
                }
                let null = self.arena.alloc(Val::Null);
                let copy = self.arena.copy_of(value);
                self.call_method_sync(container, "offsetSet", &[null, copy])?;
                Ok(())
            }
            _ => {
                self.warning("Cannot use a scalar value as an array");
                Ok(())
            }
        }
    }

    /// `$a[k] = &$x` / `$a[] = &$x`
    fn assign_ref_index(&mut self, container: Handle, key: Option<KeyOperand>, slot: Handle) -> Result<(), VmError> {
        self.autovivify_array(container);
        match self.arena.value(container) {
            Val::Array(_) => {}
            Val::Object(_) => {
                return Err(VmError::Fatal(
                    "Cannot assign by reference to an array dimension of an object".into(),
                ));
            }
            Val::String(_) => {
                return Err(VmError::Fatal(
                    "Cannot create references to/from string offsets".into(),
                ));
            }
            _ => {
                self.warning("Cannot use a scalar value as an array");
                return Ok(());
            }
        }
        self.arena.make_ref(slot);
        self.arena.bind(slot);
        let previous = match self.arena.array_mut(container) {
            Some(arr) => match key {
                Some(KeyOperand { key: Some(k), .. }) => arr.insert(k, slot),
                Some(KeyOperand { key: None, .. }) => None,
                None => {
                    arr.push(slot);
                    None
                }
            },
            None => None,
        };
        if let Some(old) = previous {
            if old != slot {
                self.arena.unbind(old);
            }
        }
        Ok(())
    }

    fn isset_index(&mut self, container: Handle, key: KeyOperand, empty: bool) -> Result<bool, VmError> {
        match self.arena.value(container).clone() {
            Val::Array(arr) => {
                let val = key.key.and_then(|k| arr.get(&k)).map(|h| self.arena.value(h));
                Ok(if empty {
                    !val.is_some_and(Val::to_bool)
                } else {
                    val.is_some_and(|v| !v.is_null())
                })
            }
            Val::String(s) => {
                let index = match &key.key {
                    Some(ArrayKey::Int(i)) => usize::try_from(*i).ok(),
                    _ => None,
                };
                let byte = index.and_then(|i| s.get(i));
                Ok(if empty {
                    byte.is_none_or(|b| *b == b'0')
                } else {
                    byte.is_some()
                })
            }
            Val::Object(_) if self.is_array_access(container) => {
                let exists = self.call_method_sync(container, "offsetExists", &[key.handle])?;
                let exists = self.value_to_bool(exists);
                if !empty {
                    return Ok(exists);
                }
                if !exists {
                    return Ok(true);
                }
                let value = self.call_method_sync(container, "offsetGet", &[key.handle])?;
                Ok(!self.value_to_bool(value))
            }
            _ => Ok(empty),
        }
    }

    fn unset_index(&mut self, container: Handle, key: KeyOperand) -> Result<(), VmError> {
        match self.arena.value(container) {
            Val::Array(_) => {
                if let Some(k) = key.key {
                    let removed = self.arena.array_mut(container).and_then(|arr| arr.remove(&k));
                    if let Some(old) = removed {
                        self.arena.unbind(old);
                    }
                }
                Ok(())
            }
            Val::String(_) => Err(VmError::Fatal("Cannot unset string offsets".into())),
            Val::Object(_) => {
                if !self.is_array_access(container) {
                    return Err(self.not_an_array_object(container));
                }
                self.call_method_sync(container, "offsetUnset", &[key.handle])?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
