//! Object operations: instantiation, cloning, property and static property
//! access
//!
//! Property lookups check visibility against the running frame's class
//! scope. Missing or inaccessible properties fall back to `__get`, `__set`,
//! `__isset` and `__unset` when the class defines them; a magic method that
//! touches the same property of the same object sees plain semantics.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_object_handlers.c` - zend_std_read_property, zend_std_write_property
//! - Zend: `$PHP_SRC_PATH/Zend/zend_objects.c` - zend_objects_clone_members

use crate::core::value::{Handle, Name, ObjectData, Val, Visibility};
use crate::vm::engine::{VM, VmError};
use crate::vm::invocation::{CallKind, InvocationEntry};
use crate::vm::opcode::{Intent, OpCode};
use indexmap::IndexMap;

/// Outcome of resolving a named property on an object
enum PropertyLookup {
    Found(Handle),
    Missing,
    Inaccessible(Name, Visibility),
}

impl VM {
    pub(crate) fn exec_object_op(&mut self, op: &OpCode) -> Result<(), VmError> {
        match op {
            OpCode::ClassNew { class, no_ctor } => self.exec_class_new(class, *no_ctor)?,
            OpCode::ObjectInitCheck => {
                let slot = self.peek_operand()?;
                self.autovivify_object(slot);
            }
            OpCode::Clone => {
                let h = self.pop_operand_required()?;
                let copy = self.clone_object(h)?;
                self.operand_stack.push(copy);
            }
            OpCode::InstanceOf(class) => {
                let class = match class {
                    Some(name) => self.resolve_class_name(name)?,
                    None => {
                        let h = self.pop_operand_required()?;
                        self.class_name_operand(h)?
                    }
                };
                let h = self.pop_operand_required()?;
                let result = self.instance_of(h, class.as_str());
                self.push_value(Val::Bool(result));
            }
            OpCode::Property { name, intent } => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                let h = self.fetch_property(obj, &name, *intent)?;
                self.operand_stack.push(h);
            }
            OpCode::AssignProperty { name, keep } => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                let value = self.pop_operand_required()?;
                let kept = self.assign_property(obj, &name, value)?;
                if *keep {
                    self.operand_stack.push(kept);
                }
            }
            OpCode::AssignRefProperty { name, keep } => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                let slot = self.pop_operand_required()?;
                self.assign_ref_property(obj, &name, slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }
            OpCode::IssetProperty { name, empty } => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                let result = self.isset_property(obj, &name, *empty)?;
                self.push_value(Val::Bool(result));
            }
            OpCode::UnsetProperty(name) => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                self.unset_property(obj, &name)?;
            }
            OpCode::StaticProperty { class, name } => {
                let name = self.name_operand(name)?;
                let slot = self.static_property_slot(class, &name)?;
                self.operand_stack.push(slot);
            }
            OpCode::AssignStaticProperty { class, name, keep } => {
                let name = self.name_operand(name)?;
                let value = self.pop_operand_required()?;
                let slot = self.static_property_slot(class, &name)?;
                let val = self.arena.value(value).clone();
                self.arena.set_value(slot, val);
                if *keep {
                    let kept = self.arena.clone_if_referenced(value);
                    self.operand_stack.push(kept);
                }
            }
            OpCode::AssignRefStaticProperty { class, name, keep } => {
                let name = self.name_operand(name)?;
                let slot = self.pop_operand_required()?;
                self.bind_static_property(class, &name, slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }
            OpCode::IssetStaticProperty { class, name, empty } => {
                let name = self.name_operand(name)?;
                let result = self.isset_static_property(class, &name, *empty)?;
                self.push_value(Val::Bool(result));
            }
            OpCode::UnsetStaticProperty { class, name } => {
                let name = self.name_operand(name)?;
                let def = self.require_class(class)?;
                return Err(VmError::Fatal(format!(
                    "Attempt to unset static property {}::${}",
                    def.name, name
                )));
            }
            _ => unreachable!("Not an object op"),
        }
        Ok(())
    }

    /// `new C(...)`: push the instance, then either queue its constructor
    /// for the following PREPARE_ARG / INVOKE sequence or skip over it
    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_NEW
    fn exec_class_new(&mut self, class: &Option<Name>, no_ctor: i32) -> Result<(), VmError> {
        let requested = match class {
            Some(name) => name.clone(),
            None => {
                let h = self.pop_operand_required()?;
                self.class_name_operand(h)?
            }
        };
        let def = self.require_class(&requested)?;
        if def.is_interface {
            return Err(VmError::Fatal(format!("Cannot instantiate interface {}", def.name)));
        }
        if def.is_abstract {
            return Err(VmError::Fatal(format!("Cannot instantiate abstract class {}", def.name)));
        }

        let obj = self.instantiate(&def.name);
        self.operand_stack.push(obj);

        let ctor = self
            .context
            .find_method(def.name.as_str(), "__construct")
            .or_else(|| self.context.find_method(def.name.as_str(), def.name.as_str()));
        let Some(ctor) = ctor else {
            return self.branch(no_ctor);
        };
        let scope = self.calling_scope();
        if !self.is_visible_from(&ctor.declaring_class, ctor.visibility, scope.as_ref()) {
            return Err(VmError::Fatal(format!(
                "Call to {} {}::{}() from invalid context",
                ctor.visibility, def.name, ctor.name
            )));
        }
        let receiver = self.arena.copy_of(obj);
        self.push_invocation(InvocationEntry {
            callable: ctor.callable,
            receiver: Some(receiver),
            name: ctor.name,
            kind: CallKind::Direct,
            class_scope: Some(ctor.declaring_class),
            called_class: Some(def.name.clone()),
        })
    }

    /// Fresh instance with its declared property defaults
    pub(crate) fn instantiate(&mut self, class: &Name) -> Handle {
        let defaults = self.context.default_properties(class.as_str());
        let mut properties = IndexMap::with_capacity(defaults.len());
        for (name, default) in defaults {
            let slot = self.arena.alloc(default.to_val());
            self.arena.bind(slot);
            properties.insert(name, slot);
        }
        let payload = self.arena.alloc(Val::ObjPayload(ObjectData {
            class: class.clone(),
            properties,
        }));
        self.arena.bind(payload);
        self.arena.alloc(Val::Object(payload))
    }

    /// `null`, `false` and `""` silently become a `stdClass` on property write
    fn autovivify_object(&mut self, slot: Handle) {
        if self.arena.value(slot).is_empty_for_autovivify() {
            self.strict("Creating default object from empty value");
            let obj = self.instantiate(&Name::new("stdClass"));
            let val = self.arena.value(obj).clone();
            self.arena.set_value(slot, val);
        }
    }

    fn payload_of(&self, h: Handle) -> Option<Handle> {
        match self.arena.value(h) {
            Val::Object(payload) => Some(*payload),
            _ => None,
        }
    }

    /// Shallow copy; reference properties stay shared, then `__clone` runs
    /// on the copy
    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_CLONE
    fn clone_object(&mut self, h: Handle) -> Result<Handle, VmError> {
        let Some(source) = self.arena.object(h).cloned() else {
            return Err(VmError::Fatal("__clone method called on non-object".into()));
        };
        if let Some(method) = self.context.find_method(source.class.as_str(), "__clone") {
            let scope = self.calling_scope();
            if !self.is_visible_from(&method.declaring_class, method.visibility, scope.as_ref()) {
                return Err(VmError::Fatal(format!(
                    "Call to {} {}::__clone() from context '{}'",
                    method.visibility,
                    source.class,
                    scope.map(|s| s.to_string()).unwrap_or_default()
                )));
            }
        }

        let mut properties = IndexMap::with_capacity(source.properties.len());
        for (name, slot) in source.properties {
            let copy = if self.arena.is_ref(slot) {
                slot
            } else {
                self.arena.copy_of(slot)
            };
            self.arena.bind(copy);
            properties.insert(name, copy);
        }
        let payload = self.arena.alloc(Val::ObjPayload(ObjectData {
            class: source.class,
            properties,
        }));
        self.arena.bind(payload);
        let copy = self.arena.alloc(Val::Object(payload));

        if self.has_method(copy, "__clone") {
            self.call_method_sync(copy, "__clone", &[])?;
        }
        Ok(copy)
    }

    fn lookup_property(&self, payload: Handle, name: &Name) -> PropertyLookup {
        let Some(obj) = self.arena.payload(payload) else {
            return PropertyLookup::Missing;
        };
        if let Err((_, visibility)) = self.property_accessible(&obj.class, name.as_str()) {
            return PropertyLookup::Inaccessible(obj.class.clone(), visibility);
        }
        match obj.properties.get(name) {
            Some(&slot) => PropertyLookup::Found(slot),
            None => PropertyLookup::Missing,
        }
    }

    fn inaccessible_property(class: &Name, visibility: Visibility, name: &Name) -> VmError {
        VmError::Fatal(format!(
            "Cannot access {} property {}::${}",
            visibility, class, name
        ))
    }

    /// Run a property magic method unless the same access is already in
    /// progress; `None` when the method is missing or guarded
    fn call_property_magic(
        &mut self,
        obj: Handle,
        payload: Handle,
        method: &'static str,
        name: &Name,
        value: Option<Handle>,
    ) -> Result<Option<Handle>, VmError> {
        if !self.has_method(obj, method) {
            return Ok(None);
        }
        let key = (payload, method, name.clone());
        if !self.magic_guards.insert(key.clone()) {
            return Ok(None);
        }
        let mut args = vec![self.arena.alloc(Val::string(name.as_bytes()))];
        args.extend(value);
        let result = self.call_method_sync(obj, method, &args);
        self.magic_guards.remove(&key);
        result.map(Some)
    }

    fn create_property(&mut self, payload: Handle, name: &Name, val: Val) -> Handle {
        let slot = self.arena.alloc(val);
        self.arena.bind(slot);
        let previous = self
            .arena
            .payload_mut(payload)
            .and_then(|o| o.properties.insert(name.clone(), slot));
        if let Some(old) = previous {
            self.arena.unbind(old);
        }
        slot
    }

    fn fetch_property(&mut self, obj: Handle, name: &Name, intent: Intent) -> Result<Handle, VmError> {
        if matches!(intent, Intent::W | Intent::RW) {
            self.autovivify_object(obj);
        }
        let Some(payload) = self.payload_of(obj) else {
            match intent {
                Intent::R | Intent::RW | Intent::FE => self.notice("Trying to get property of non-object"),
                Intent::W => self.warning("Attempt to modify property of non-object"),
                Intent::I | Intent::U => {}
            }
            return Ok(self.arena.alloc(Val::Null));
        };

        match self.lookup_property(payload, name) {
            PropertyLookup::Found(slot) => Ok(slot),
            PropertyLookup::Inaccessible(class, visibility) => {
                match self.call_property_magic(obj, payload, "__get", name, None)? {
                    Some(h) => Ok(h),
                    None => Err(Self::inaccessible_property(&class, visibility, name)),
                }
            }
            PropertyLookup::Missing => {
                if let Some(h) = self.call_property_magic(obj, payload, "__get", name, None)? {
                    return Ok(h);
                }
                let class = self.object_class(obj).unwrap_or_else(|| Name::new("stdClass"));
                match intent {
                    Intent::R | Intent::FE => {
                        self.notice(&format!("Undefined property: {}::${}", class, name));
                        Ok(self.arena.alloc(Val::Null))
                    }
                    Intent::W => Ok(self.create_property(payload, name, Val::Null)),
                    Intent::RW => {
                        self.notice(&format!("Undefined property: {}::${}", class, name));
                        Ok(self.create_property(payload, name, Val::Null))
                    }
                    Intent::I | Intent::U => Ok(self.arena.alloc(Val::Null)),
                }
            }
        }
    }

    fn assign_property(&mut self, obj: Handle, name: &Name, value: Handle) -> Result<Handle, VmError> {
        self.autovivify_object(obj);
        let Some(payload) = self.payload_of(obj) else {
            self.warning("Attempt to assign property of non-object");
            return Ok(self.arena.clone_if_referenced(value));
        };

        match self.lookup_property(payload, name) {
            PropertyLookup::Found(slot) => {
                if slot != value {
                    let val = self.arena.value(value).clone();
                    self.arena.set_value(slot, val);
                }
            }
            PropertyLookup::Inaccessible(class, visibility) => {
                let copy = self.arena.copy_of(value);
                if self
                    .call_property_magic(obj, payload, "__set", name, Some(copy))?
                    .is_none()
                {
                    return Err(Self::inaccessible_property(&class, visibility, name));
                }
            }
            PropertyLookup::Missing => {
                let copy = self.arena.copy_of(value);
                if self
                    .call_property_magic(obj, payload, "__set", name, Some(copy))?
                    .is_none()
                {
                    let val = self.arena.value(value).clone();
                    self.create_property(payload, name, val);
                }
            }
        }
        Ok(self.arena.clone_if_referenced(value))
    }

    fn assign_ref_property(&mut self, obj: Handle, name: &Name, slot: Handle) -> Result<(), VmError> {
        self.autovivify_object(obj);
        let Some(payload) = self.payload_of(obj) else {
            self.warning("Attempt to assign property of non-object");
            return Ok(());
        };
        if let PropertyLookup::Inaccessible(class, visibility) = self.lookup_property(payload, name) {
            return Err(Self::inaccessible_property(&class, visibility, name));
        }
        self.arena.make_ref(slot);
        self.arena.bind(slot);
        let previous = self
            .arena
            .payload_mut(payload)
            .and_then(|o| o.properties.insert(name.clone(), slot));
        if let Some(old) = previous {
            if old != slot {
                self.arena.unbind(old);
            }
        }
        Ok(())
    }

    fn isset_property(&mut self, obj: Handle, name: &Name, empty: bool) -> Result<bool, VmError> {
        let Some(payload) = self.payload_of(obj) else {
            return Ok(empty);
        };
        if let PropertyLookup::Found(slot) = self.lookup_property(payload, name) {
            let val = self.arena.value(slot);
            return Ok(if empty { !val.to_bool() } else { !val.is_null() });
        }

        let Some(isset) = self.call_property_magic(obj, payload, "__isset", name, None)? else {
            return Ok(empty);
        };
        let exists = self.value_to_bool(isset);
        if !empty {
            return Ok(exists);
        }
        if !exists {
            return Ok(true);
        }
        match self.call_property_magic(obj, payload, "__get", name, None)? {
            Some(value) => Ok(!self.value_to_bool(value)),
            None => Ok(true),
        }
    }

    fn unset_property(&mut self, obj: Handle, name: &Name) -> Result<(), VmError> {
        let Some(payload) = self.payload_of(obj) else {
            return Ok(());
        };
        match self.lookup_property(payload, name) {
            PropertyLookup::Found(_) => {
                let removed = self
                    .arena
                    .payload_mut(payload)
                    .and_then(|o| o.properties.shift_remove(name));
                if let Some(old) = removed {
                    self.arena.unbind(old);
                }
            }
            PropertyLookup::Inaccessible(class, visibility) => {
                if self
                    .call_property_magic(obj, payload, "__unset", name, None)?
                    .is_none()
                {
                    return Err(Self::inaccessible_property(&class, visibility, name));
                }
            }
            PropertyLookup::Missing => {
                self.call_property_magic(obj, payload, "__unset", name, None)?;
            }
        }
        Ok(())
    }

    /// Slot of `C::$name`, initialised from its declared default on first use
    /// Reference: $PHP_SRC_PATH/Zend/zend_std_get_static_property
    fn static_property_slot(&mut self, class: &Name, name: &Name) -> Result<Handle, VmError> {
        let def = self.require_class(class)?;
        let (declaring, prop) = self
            .context
            .find_static_property(def.name.as_str(), name.as_str())
            .ok_or_else(|| {
                VmError::Fatal(format!(
                    "Access to undeclared static property: {}::${}",
                    def.name, name
                ))
            })?;
        let scope = self.calling_scope();
        if !self.is_visible_from(&declaring, prop.visibility, scope.as_ref()) {
            return Err(Self::inaccessible_property(&def.name, prop.visibility, name));
        }

        let key = declaring.lower();
        let existing = self
            .static_properties
            .get(&key)
            .and_then(|table| table.get(name))
            .copied();
        if let Some(slot) = existing {
            return Ok(slot);
        }
        let slot = self.arena.alloc(prop.default.to_val());
        self.arena.bind(slot);
        self.static_properties
            .entry(key)
            .or_default()
            .insert(name.clone(), slot);
        Ok(slot)
    }

    fn bind_static_property(&mut self, class: &Name, name: &Name, slot: Handle) -> Result<(), VmError> {
        let current = self.static_property_slot(class, name)?;
        let def = self.require_class(class)?;
        let Some((declaring, _)) = self
            .context
            .find_static_property(def.name.as_str(), name.as_str())
        else {
            return Ok(());
        };
        self.arena.make_ref(slot);
        self.arena.bind(slot);
        if let Some(table) = self.static_properties.get_mut(&declaring.lower()) {
            table.insert(name.clone(), slot);
        }
        if current != slot {
            self.arena.unbind(current);
        }
        Ok(())
    }

    fn isset_static_property(&mut self, class: &Name, name: &Name, empty: bool) -> Result<bool, VmError> {
        let def = self.require_class(class)?;
        let Some((declaring, prop)) = self
            .context
            .find_static_property(def.name.as_str(), name.as_str())
        else {
            return Ok(empty);
        };
        let scope = self.calling_scope();
        if !self.is_visible_from(&declaring, prop.visibility, scope.as_ref()) {
            return Ok(empty);
        }
        let slot = self.static_property_slot(class, name)?;
        let val = self.arena.value(slot);
        Ok(if empty { !val.to_bool() } else { !val.is_null() })
    }

    /// Store into a property without visibility checks or magic methods,
    /// creating it when missing
    pub(crate) fn write_property_raw(&mut self, obj: Handle, name: &str, val: Val) {
        let Some(payload) = self.payload_of(obj) else {
            return;
        };
        let name = Name::new(name);
        let existing = self
            .arena
            .payload(payload)
            .and_then(|o| o.properties.get(&name).copied());
        match existing {
            Some(slot) => self.arena.set_value(slot, val),
            None => {
                self.create_property(payload, &name, val);
            }
        }
    }

    /// Property value without visibility checks or magic methods
    pub(crate) fn read_property_raw(&self, obj: Handle, name: &str) -> Option<Val> {
        let object = self.arena.object(obj)?;
        let slot = object.properties.get(&Name::new(name))?;
        Some(self.arena.value(*slot).clone())
    }
}
