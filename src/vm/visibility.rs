//! Visibility checking and access control
//!
//! - **Public**: Accessible from anywhere
//! - **Protected**: Accessible from the declaring class's hierarchy
//! - **Private**: Accessible only from the declaring class
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_object_handlers.c` - zend_check_private/protected

use crate::core::value::{Name, Visibility};
use crate::vm::engine::VM;

impl VM {
    /// Class scope of the running frame
    pub(crate) fn calling_scope(&self) -> Option<Name> {
        self.frames.last().and_then(|f| f.class_scope.clone())
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_compile.c - zend_check_visibility
    pub(crate) fn is_visible_from(
        &self,
        declaring_class: &Name,
        visibility: Visibility,
        scope: Option<&Name>,
    ) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Protected => scope.is_some_and(|s| {
                self.context.is_subclass_of(s.as_str(), declaring_class.as_str())
                    || self.context.is_subclass_of(declaring_class.as_str(), s.as_str())
            }),
            Visibility::Private => scope.is_some_and(|s| s.eq_ignore_case(declaring_class.as_str())),
        }
    }

    /// Visibility of a named property on an object of `class`, as seen from
    /// the running frame. Undeclared (dynamic) properties are public.
    pub(crate) fn property_accessible(&self, class: &Name, prop: &str) -> Result<(), (Name, Visibility)> {
        match self.context.find_property(class.as_str(), prop) {
            Some((declaring, def)) => {
                let scope = self.calling_scope();
                if self.is_visible_from(&declaring, def.visibility, scope.as_ref()) {
                    Ok(())
                } else {
                    Err((declaring, def.visibility))
                }
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Literal;
    use crate::runtime::context::{ClassDef, RuntimeContext};

    fn vm() -> VM {
        let mut ctx = RuntimeContext::new();
        ctx.register_class(ClassDef::new("A").property("p", Literal::Null, Visibility::Private));
        ctx.register_class(ClassDef::new("B").extends("A"));
        ctx.register_class(ClassDef::new("Other"));
        VM::new(ctx)
    }

    #[test]
    fn protected_is_visible_across_the_hierarchy() {
        let vm = vm();
        let a = Name::new("A");
        assert!(vm.is_visible_from(&a, Visibility::Protected, Some(&Name::new("B"))));
        assert!(!vm.is_visible_from(&a, Visibility::Protected, Some(&Name::new("Other"))));
        assert!(!vm.is_visible_from(&a, Visibility::Protected, None));
    }

    #[test]
    fn private_needs_the_declaring_class() {
        let vm = vm();
        let a = Name::new("A");
        assert!(vm.is_visible_from(&a, Visibility::Private, Some(&Name::new("a"))));
        assert!(!vm.is_visible_from(&a, Visibility::Private, Some(&Name::new("B"))));
        assert!(vm.property_accessible(&Name::new("B"), "p").is_err());
        assert!(vm.property_accessible(&Name::new("B"), "dynamic").is_ok());
    }
}
