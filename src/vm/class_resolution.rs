//! Class resolution helpers
//!
//! Resolves `self`/`parent`/`static` against the running frame and answers
//! class questions about values.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute_API.c` - zend_fetch_class

use crate::core::value::{Handle, Name, Val};
use crate::runtime::context::ClassDef;
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

impl VM {
    /// Resolve `self`, `parent` and `static` relative to the running frame
    pub(crate) fn resolve_class_name(&self, name: &Name) -> Result<Name, VmError> {
        let frame = self.frames.last();
        if name.eq_ignore_case("self") {
            return frame
                .and_then(|f| f.class_scope.clone())
                .ok_or_else(|| VmError::Fatal("Cannot access self:: when no class scope is active".into()));
        }
        if name.eq_ignore_case("static") {
            return frame
                .and_then(|f| f.called_class.clone().or_else(|| f.class_scope.clone()))
                .ok_or_else(|| VmError::Fatal("Cannot access static:: when no class scope is active".into()));
        }
        if name.eq_ignore_case("parent") {
            let scope = frame
                .and_then(|f| f.class_scope.clone())
                .ok_or_else(|| VmError::Fatal("Cannot access parent:: when no class scope is active".into()))?;
            return self
                .context
                .find_class(scope.as_str())
                .and_then(|c| c.parent.clone())
                .ok_or_else(|| VmError::Fatal("Cannot access parent:: when current class scope has no parent".into()));
        }
        Ok(name.clone())
    }

    /// Look a class up by (possibly relative) name or fail with PHP's fatal
    pub(crate) fn require_class(&self, name: &Name) -> Result<Rc<ClassDef>, VmError> {
        let resolved = self.resolve_class_name(name)?;
        self.context
            .find_class(resolved.as_str())
            .ok_or_else(|| VmError::Fatal(format!("Class '{}' not found", resolved)))
    }

    /// Class of the object held in `h`
    pub(crate) fn object_class(&self, h: Handle) -> Option<Name> {
        self.arena.object(h).map(|o| o.class.clone())
    }

    pub(crate) fn instance_of(&self, h: Handle, class: &str) -> bool {
        match self.arena.object(h) {
            Some(obj) => self.context.is_subclass_of(obj.class.as_str(), class),
            None => false,
        }
    }

    /// Class named by a runtime operand: a string or an object's class
    pub(crate) fn class_name_operand(&mut self, h: Handle) -> Result<Name, VmError> {
        if let Val::Object(_) = self.arena.value(h) {
            return self
                .object_class(h)
                .ok_or_else(|| VmError::RuntimeError("Object without payload".into()));
        }
        let bytes = self.value_to_string_bytes(h)?;
        Ok(Name::from_bytes(&bytes))
    }
}
