//! PHP type juggling and conversion
//!
//! Scalar conversions live on [`Val`]; this module adds the conversions that
//! need the VM: objects with `__toString`, array/object casts that allocate
//! slots, and the `CAST` instruction.
//!
//! ### To String
//! - Integers/floats: standard representation
//! - true → "1", false → ""
//! - null → ""
//! - Arrays → "Array" (with notice)
//! - Objects → __toString() or a fatal error
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - conversion functions

use crate::core::value::{ArrayData, ArrayKey, Handle, Name, ObjectData, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::CastKind;
use indexmap::IndexMap;
use std::rc::Rc;

impl VM {
    #[inline]
    pub(crate) fn value_to_bool(&self, handle: Handle) -> bool {
        self.arena.value(handle).to_bool()
    }

    /// Convert value to string with full error handling
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - _zval_get_string_func
    pub(crate) fn value_to_string_bytes(&mut self, handle: Handle) -> Result<Vec<u8>, VmError> {
        match self.arena.value(handle) {
            Val::Array(_) => {
                self.notice("Array to string conversion");
                Ok(b"Array".to_vec())
            }
            Val::Object(_) => {
                let class = self.object_class(handle).unwrap_or_else(|| Name::new("stdClass"));
                if self.context.find_method(class.as_str(), "__toString").is_some() {
                    let result = self.call_method_sync(handle, "__toString", &[])?;
                    match self.arena.value(result) {
                        Val::String(s) => Ok(s.to_vec()),
                        _ => Err(VmError::Fatal(format!(
                            "Method {}::__toString() must return a string value",
                            class
                        ))),
                    }
                } else {
                    Err(VmError::Fatal(format!(
                        "Object of class {} could not be converted to string",
                        class
                    )))
                }
            }
            other => Ok(other.to_php_string_bytes()),
        }
    }

    pub(crate) fn new_string_handle(&mut self, bytes: Vec<u8>) -> Handle {
        self.arena.alloc(Val::String(Rc::new(bytes)))
    }

    /// `(array)` conversion
    pub(crate) fn to_array_val(&mut self, handle: Handle) -> Val {
        match self.arena.value(handle).clone() {
            Val::Array(arr) => Val::Array(arr),
            Val::Null => Val::empty_array(),
            Val::Object(payload) => {
                let props: Vec<(Name, Handle)> = self
                    .arena
                    .payload(payload)
                    .map(|o| o.properties.iter().map(|(k, v)| (k.clone(), *v)).collect())
                    .unwrap_or_default();
                let mut data = ArrayData::with_capacity(props.len());
                for (name, slot) in props {
                    let copy = self.arena.copy_of(slot);
                    self.arena.bind(copy);
                    data.insert(ArrayKey::from_bytes(name.as_bytes()), copy);
                }
                Val::Array(Rc::new(data))
            }
            scalar => {
                let slot = self.arena.alloc(scalar);
                self.arena.bind(slot);
                let mut data = ArrayData::new();
                data.push(slot);
                Val::Array(Rc::new(data))
            }
        }
    }

    /// `(object)` conversion; arrays become `stdClass` property bags and
    /// scalars land in a `scalar` property
    pub(crate) fn to_object_val(&mut self, handle: Handle) -> Val {
        let mut properties = IndexMap::new();
        match self.arena.value(handle).clone() {
            Val::Object(payload) => return Val::Object(payload),
            Val::Null => {}
            Val::Array(arr) => {
                for (key, &elem) in arr.map.iter() {
                    let copy = self.arena.copy_of(elem);
                    self.arena.bind(copy);
                    properties.insert(Name::new(&key.to_string()), copy);
                }
            }
            scalar => {
                let slot = self.arena.alloc(scalar);
                self.arena.bind(slot);
                properties.insert(Name::new("scalar"), slot);
            }
        }
        let payload = self.arena.alloc(Val::ObjPayload(ObjectData {
            class: Name::new("stdClass"),
            properties,
        }));
        self.arena.bind(payload);
        Val::Object(payload)
    }

    pub(crate) fn exec_cast(&mut self, kind: CastKind) -> Result<(), VmError> {
        let h = self.pop_operand_required()?;
        let val = match kind {
            CastKind::Int => Val::Int(self.arena.value(h).to_int()),
            CastKind::Float => Val::Float(self.arena.value(h).to_float()),
            CastKind::Bool => Val::Bool(self.value_to_bool(h)),
            CastKind::String => Val::String(Rc::new(self.value_to_string_bytes(h)?)),
            CastKind::Array => self.to_array_val(h),
            CastKind::Object => self.to_object_val(h),
            CastKind::Null => Val::Null,
        };
        self.push_value(val);
        Ok(())
    }
}
