//! Variable, static, global and constant access
//!
//! Variables live in the frame's scope as bound slots. A fetch pushes the
//! slot itself, so a following write-type instruction updates the variable
//! in place; assignment copies the value into the slot (arrays share storage
//! until one side is written).
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_fetch_var, zend_assign_to_variable

use crate::core::value::{Handle, Literal, Name, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::{Intent, OpCode};

const GLOBAL_SCOPE: usize = 0;

impl VM {
    pub(crate) fn exec_variable_op(&mut self, op: &OpCode) -> Result<(), VmError> {
        let scope = self.current_scope();
        match op {
            OpCode::Local { name, intent } => {
                let h = self.fetch_variable(scope, name, *intent)?;
                self.operand_stack.push(h);
            }
            OpCode::Indirect { intent } => {
                let name = self.name_operand(&None)?;
                let h = self.fetch_variable(scope, &name, *intent)?;
                self.operand_stack.push(h);
            }
            OpCode::IssetLocal { name, empty } => {
                let name = self.name_operand(name)?;
                let result = self.isset_variable(scope, &name, *empty);
                self.push_value(Val::Bool(result));
            }
            OpCode::UnsetLocal(name) => {
                let name = self.name_operand(name)?;
                self.unset_variable(scope, &name);
            }
            OpCode::AssignLocal { name, keep } => {
                let name = self.name_operand(name)?;
                let value = self.pop_operand_required()?;
                self.assign_variable(scope, &name, value)?;
                if *keep {
                    let kept = self.arena.clone_if_referenced(value);
                    self.operand_stack.push(kept);
                }
            }
            OpCode::AssignRefLocal { name, keep } => {
                let name = self.name_operand(name)?;
                let slot = self.pop_operand_required()?;
                self.assign_ref_variable(scope, &name, slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }
            OpCode::LoadStatic { name, init } => self.load_static(scope, name, init)?,
            OpCode::MakeGlobal(name) => {
                let name = self.name_operand(name)?;
                if scope != GLOBAL_SCOPE {
                    let slot = self.fetch_variable(GLOBAL_SCOPE, &name, Intent::W)?;
                    self.assign_ref_variable(scope, &name, slot)?;
                }
            }

            OpCode::Global { name, intent } => {
                let h = self.fetch_variable(GLOBAL_SCOPE, name, *intent)?;
                self.operand_stack.push(h);
            }
            OpCode::IssetGlobal { name, empty } => {
                let result = self.isset_variable(GLOBAL_SCOPE, name, *empty);
                self.push_value(Val::Bool(result));
            }
            OpCode::UnsetGlobal(name) => self.unset_variable(GLOBAL_SCOPE, name),
            OpCode::AssignGlobal { name, keep } => {
                let value = self.pop_operand_required()?;
                self.assign_variable(GLOBAL_SCOPE, name, value)?;
                if *keep {
                    let kept = self.arena.clone_if_referenced(value);
                    self.operand_stack.push(kept);
                }
            }
            OpCode::AssignRefGlobal { name, keep } => {
                let slot = self.pop_operand_required()?;
                self.assign_ref_variable(GLOBAL_SCOPE, name, slot)?;
                if *keep {
                    self.operand_stack.push(slot);
                }
            }

            OpCode::Constant(name) => {
                let val = self.constant_value(name);
                self.push_value(val);
            }
            OpCode::ClassConstant { class, name } => {
                let def = self.require_class(class)?;
                let value = self
                    .context
                    .find_class_constant(def.name.as_str(), name.as_str())
                    .ok_or_else(|| VmError::Fatal(format!("Undefined class constant '{}'", name)))?;
                self.push_value(value.to_val());
            }
            _ => unreachable!("Not a variable op"),
        }
        Ok(())
    }

    fn is_this(&self, name: &Name) -> Option<Handle> {
        if name.as_str() == "this" {
            self.frames.last().and_then(|f| f.this)
        } else {
            None
        }
    }

    /// Slot of a variable, created or defaulted according to `intent`
    pub(crate) fn fetch_variable(&mut self, scope: usize, name: &Name, intent: Intent) -> Result<Handle, VmError> {
        if let Some(this) = self.is_this(name) {
            return Ok(this);
        }
        if let Some(&h) = self.scopes[scope].get(name) {
            return Ok(h);
        }
        match intent {
            Intent::R | Intent::FE => {
                self.notice(&format!("Undefined variable: {}", name));
                Ok(self.arena.alloc(Val::Null))
            }
            Intent::W => Ok(self.create_variable(scope, name)),
            Intent::RW => {
                self.notice(&format!("Undefined variable: {}", name));
                Ok(self.create_variable(scope, name))
            }
            Intent::I | Intent::U => Ok(self.arena.alloc(Val::Null)),
        }
    }

    fn create_variable(&mut self, scope: usize, name: &Name) -> Handle {
        let h = self.arena.alloc(Val::Null);
        self.arena.bind(h);
        self.scopes[scope].insert(name.clone(), h);
        h
    }

    fn isset_variable(&self, scope: usize, name: &Name, empty: bool) -> bool {
        let slot = self.is_this(name).or_else(|| self.scopes[scope].get(name).copied());
        let val = slot.map(|h| self.arena.value(h));
        if empty {
            !val.is_some_and(Val::to_bool)
        } else {
            val.is_some_and(|v| !v.is_null())
        }
    }

    fn unset_variable(&mut self, scope: usize, name: &Name) {
        if let Some(h) = self.scopes[scope].shift_remove(name) {
            self.arena.unbind(h);
        }
    }

    /// By-value assignment into a (possibly new) variable slot
    pub(crate) fn assign_variable(&mut self, scope: usize, name: &Name, value: Handle) -> Result<Handle, VmError> {
        if self.is_this(name).is_some() {
            return Err(VmError::Fatal("Cannot re-assign $this".into()));
        }
        let slot = self.fetch_variable(scope, name, Intent::W)?;
        if slot != value {
            let val = self.arena.value(value).clone();
            self.arena.set_value(slot, val);
        }
        Ok(slot)
    }

    /// Bind `slot` under `name`, turning it into a reference
    pub(crate) fn assign_ref_variable(&mut self, scope: usize, name: &Name, slot: Handle) -> Result<(), VmError> {
        if self.is_this(name).is_some() {
            return Err(VmError::Fatal("Cannot re-assign $this".into()));
        }
        self.arena.make_ref(slot);
        self.arena.bind(slot);
        if let Some(old) = self.scopes[scope].insert(name.clone(), slot) {
            self.arena.unbind(old);
        }
        Ok(())
    }

    /// `static $name = init;` binds the local to the function's persistent slot
    fn load_static(&mut self, scope: usize, name: &Name, init: &Literal) -> Result<(), VmError> {
        let key = self
            .frames
            .last()
            .and_then(|f| f.function.as_ref().map(|func| func.statics_key.clone()))
            .unwrap_or_else(|| "{main}".to_string());
        let existing = self
            .function_statics
            .get(&key)
            .and_then(|table| table.get(name))
            .copied();
        let slot = match existing {
            Some(h) => h,
            None => {
                let h = self.arena.alloc(init.to_val());
                self.arena.bind(h);
                self.function_statics
                    .entry(key)
                    .or_default()
                    .insert(name.clone(), h);
                h
            }
        };
        self.assign_ref_variable(scope, name, slot)
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_constants.c - zend_get_constant_ex
    fn constant_value(&mut self, name: &Name) -> Val {
        if let Some(value) = self.context.constants.get(name) {
            return value.to_val();
        }
        match name.lower().as_str() {
            "true" => return Val::Bool(true),
            "false" => return Val::Bool(false),
            "null" => return Val::Null,
            _ => {}
        }
        self.notice(&format!(
            "Use of undefined constant {} - assumed '{}'",
            name, name
        ));
        Val::string(name.as_bytes())
    }
}
