//! Tracing support for arena collection
//!
//! Slots are reclaimed by mark-and-sweep: the VM hands
//! [`Arena::collect`](crate::core::heap::Arena::collect) every handle it holds
//! directly, and marking follows the handles stored inside values (array
//! elements, object payloads and properties).
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_gc.c

use crate::core::value::{ArrayData, Handle, Val, Zval};

/// Types that can enumerate the handles they hold
pub trait Traceable {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle));
}

impl Traceable for ArrayData {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        for &h in self.map.values() {
            tracer(h);
        }
    }
}

impl Traceable for Val {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        match self {
            Val::Object(payload) => tracer(*payload),
            Val::Array(arr) => arr.trace_handles(tracer),
            Val::ObjPayload(obj) => {
                for &h in obj.properties.values() {
                    tracer(h);
                }
            }
            Val::Null | Val::Bool(_) | Val::Int(_) | Val::Float(_) | Val::String(_) => {}
        }
    }
}

impl Traceable for Zval {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        self.value.trace_handles(tracer);
    }
}
