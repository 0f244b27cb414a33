//! Call protocol: FIND_* resolves a callee onto the frame's invocation
//! stack, PREPARE_ARG / ARG_CONTEXT consult that entry for per-parameter
//! pass semantics, INVOKE pops it together with the arguments.
//!
//! User functions get a new frame on [`VM::frames`] and run in the same
//! interpreter loop as their caller. Native code that needs to call back into
//! user code (`__toString`, `offsetGet`, iterator methods, tick functions)
//! goes through [`VM::call_sync`], which runs a nested loop bounded to the
//! new frame.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_INIT_FCALL_BY_NAME, ZEND_SEND_*, ZEND_DO_FCALL
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute_API.c` - zend_call_function

use crate::core::value::{Handle, Name, Val};
use crate::runtime::context::{Callable, MethodDef, PassMode, UserFunc};
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::{Frame, Scope};
use crate::vm::invocation::{CallKind, InvocationEntry};
use crate::vm::opcode::{ArgPassing, OpCode};
use std::rc::Rc;
use std::sync::Arc;

fn method_entry(
    method: MethodDef,
    receiver: Option<Handle>,
    requested: &Name,
    kind: CallKind,
    called_class: Name,
) -> InvocationEntry {
    InvocationEntry {
        callable: method.callable,
        receiver,
        name: requested.clone(),
        kind,
        class_scope: Some(method.declaring_class),
        called_class: Some(called_class),
    }
}

impl VM {
    pub(crate) fn exec_call_op(&mut self, op: &OpCode) -> Result<(), VmError> {
        match op {
            OpCode::FindFunction(name) => {
                let name = self.name_operand(name)?;
                let callable = self
                    .context
                    .find_function(name.as_str())
                    .cloned()
                    .ok_or_else(|| VmError::Fatal(format!("Call to undefined function {}()", name)))?;
                self.push_invocation(InvocationEntry::function(callable))
            }
            OpCode::FindMethod(name) => {
                let name = self.name_operand(name)?;
                let obj = self.pop_operand_required()?;
                let entry = self.find_method_entry(obj, &name)?;
                self.push_invocation(entry)
            }
            OpCode::FindStaticMethod { class, method } => {
                let method = self.name_operand(method)?;
                let entry = self.find_static_method_entry(class, &method)?;
                self.push_invocation(entry)
            }
            OpCode::PrepareArg(passing) => self.prepare_arg(*passing),
            OpCode::ArgContext { index, by_value, by_ref } => {
                match self.pending_call()?.param_pass(*index as usize) {
                    PassMode::ByValue => self.branch(*by_value),
                    PassMode::ByReference | PassMode::PreferReference => self.branch(*by_ref),
                }
            }
            OpCode::Invoke { argc, discard } => {
                let entry = self
                    .current_frame_mut()?
                    .invocations
                    .pop()
                    .ok_or_else(|| VmError::RuntimeError("INVOKE without a resolved callable".into()))?;
                let args = self.pop_n_operands(*argc as usize)?;
                self.invoke(entry, args, *discard)
            }
            _ => unreachable!("Not a call op"),
        }
    }

    pub(crate) fn push_invocation(&mut self, entry: InvocationEntry) -> Result<(), VmError> {
        self.current_frame_mut()?.invocations.push(entry);
        Ok(())
    }

    fn pending_call(&self) -> Result<&InvocationEntry, VmError> {
        self.current_frame()?
            .invocations
            .peek()
            .ok_or_else(|| VmError::RuntimeError("Argument prepared without a resolved callable".into()))
    }

    /// `$obj->name(...)`
    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_INIT_METHOD_CALL
    fn find_method_entry(&mut self, obj: Handle, name: &Name) -> Result<InvocationEntry, VmError> {
        let Some(class) = self.object_class(obj) else {
            return Err(VmError::Fatal(format!(
                "Call to a member function {}() on a non-object",
                name
            )));
        };
        if name.eq_ignore_case("__clone") {
            return Err(VmError::Fatal(
                "Cannot call __clone() method on objects - use 'clone $obj' instead".into(),
            ));
        }

        // Later writes to the variable must not retarget the pending call
        let receiver = self.arena.copy_of(obj);
        let scope = self.calling_scope();
        let found = self.context.find_method(class.as_str(), name.as_str());
        if let Some(method) = &found {
            if self.is_visible_from(&method.declaring_class, method.visibility, scope.as_ref()) {
                let receiver = (!method.is_static).then_some(receiver);
                let method = method.clone();
                return Ok(method_entry(method, receiver, name, CallKind::Direct, class));
            }
        }

        if let Some(magic) = self.context.find_method(class.as_str(), "__call") {
            return Ok(method_entry(magic, Some(receiver), name, CallKind::MagicCall, class));
        }
        Err(match found {
            Some(method) => VmError::Fatal(format!(
                "Call to {} method {}::{}() from context '{}'",
                method.visibility,
                class,
                method.name,
                scope.map(|s| s.to_string()).unwrap_or_default()
            )),
            None => VmError::Fatal(format!("Call to undefined method {}::{}()", class, name)),
        })
    }

    /// `C::name(...)`, `self::`, `parent::` and `static::` included.
    ///
    /// A non-static method reached through a class name keeps the caller's
    /// `$this` when it is an instance of that class (`parent::__construct()`);
    /// otherwise it runs without one after a strict notice.
    fn find_static_method_entry(&mut self, class: &Name, name: &Name) -> Result<InvocationEntry, VmError> {
        let def = self.require_class(class)?;
        let frame = self.frames.last();
        let this = frame.and_then(|f| f.this);
        let forwarding = ["self", "parent", "static"]
            .iter()
            .any(|n| class.eq_ignore_case(n));
        let called_class = if forwarding {
            frame
                .and_then(|f| f.called_class.clone().or_else(|| f.class_scope.clone()))
                .unwrap_or_else(|| def.name.clone())
        } else {
            def.name.clone()
        };
        let compatible_this = this.filter(|&t| self.instance_of(t, def.name.as_str()));

        let scope = self.calling_scope();
        let found = self.context.find_method(def.name.as_str(), name.as_str());
        if let Some(method) = &found {
            if self.is_visible_from(&method.declaring_class, method.visibility, scope.as_ref()) {
                let method = method.clone();
                if method.is_static {
                    return Ok(method_entry(method, None, name, CallKind::Direct, called_class));
                }
                if let Some(t) = compatible_this {
                    let object_class = self.object_class(t).unwrap_or(called_class);
                    return Ok(method_entry(method, Some(t), name, CallKind::Direct, object_class));
                }
                self.strict(&format!(
                    "Non-static method {}::{}() should not be called statically",
                    def.name, method.name
                ));
                return Ok(method_entry(method, None, name, CallKind::Direct, called_class));
            }
        }

        if let Some(t) = compatible_this {
            if let Some(magic) = self.context.find_method(def.name.as_str(), "__call") {
                return Ok(method_entry(magic, Some(t), name, CallKind::MagicCall, called_class));
            }
        }
        if let Some(magic) = self.context.find_method(def.name.as_str(), "__callStatic") {
            return Ok(method_entry(magic, None, name, CallKind::MagicCallStatic, called_class));
        }
        Err(match found {
            Some(method) => VmError::Fatal(format!(
                "Call to {} method {}::{}() from context '{}'",
                method.visibility,
                def.name,
                method.name,
                scope.map(|s| s.to_string()).unwrap_or_default()
            )),
            None => VmError::Fatal(format!("Call to undefined method {}::{}()", def.name, name)),
        })
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_SEND_VAL, ZEND_SEND_REF, ZEND_SEND_VAR_NO_REF
    fn prepare_arg(&mut self, passing: ArgPassing) -> Result<(), VmError> {
        let mode = match passing {
            ArgPassing::ByValue => PassMode::ByValue,
            ArgPassing::ByReference => PassMode::ByReference,
            ArgPassing::PreferReference => PassMode::PreferReference,
            ArgPassing::Dynamic(index) => self.pending_call()?.param_pass(index as usize),
            ArgPassing::DynamicNotReferable(index) => {
                let mode = self.pending_call()?.param_pass(index as usize);
                if mode == PassMode::ByReference {
                    return Err(VmError::Fatal(format!(
                        "Cannot pass parameter {} by reference",
                        index + 1
                    )));
                }
                mode
            }
        };

        let h = self.pop_operand_required()?;
        let referable = self.arena.is_referenced(h) || self.arena.is_ref(h);
        let prepared = match mode {
            PassMode::ByValue => self.arena.clone_if_referenced(h),
            PassMode::ByReference if !referable => {
                self.strict("Only variables should be passed by reference");
                h
            }
            PassMode::ByReference | PassMode::PreferReference => {
                if referable {
                    self.arena.make_ref(h);
                }
                h
            }
        };
        self.operand_stack.push(prepared);
        Ok(())
    }

    /// Magic calls receive `(requested_name, [args...])`
    fn magic_arguments(&mut self, entry: &InvocationEntry, args: &[Handle]) -> Vec<Handle> {
        let values: Vec<Val> = args.iter().map(|&h| self.arena.value(h).clone()).collect();
        let name = self.arena.alloc(Val::string(entry.name.as_bytes()));
        let packed = self.arena.alloc_array(values);
        vec![name, packed]
    }

    fn invoke(&mut self, entry: InvocationEntry, args: Vec<Handle>, discard: bool) -> Result<(), VmError> {
        let args = match entry.kind {
            CallKind::Direct => args,
            CallKind::MagicCall | CallKind::MagicCallStatic => self.magic_arguments(&entry, &args),
        };
        match &entry.callable {
            Callable::Native(func) => {
                let func = Rc::clone(func);
                self.function_calls += 1;
                let result = (func.handler)(self, entry.receiver, &args)?;
                if !discard {
                    self.operand_stack.push(result);
                }
                Ok(())
            }
            Callable::User(func) => {
                let func = Rc::clone(func);
                self.push_user_frame(func, entry, &args, discard)
            }
        }
    }

    /// Enter a user function: new scope with bound parameters, new frame.
    /// Reference: $PHP_SRC_PATH/Zend/zend_vm_def.h - ZEND_RECV, ZEND_RECV_INIT
    pub(crate) fn push_user_frame(
        &mut self,
        func: Rc<UserFunc>,
        entry: InvocationEntry,
        args: &[Handle],
        discard: bool,
    ) -> Result<(), VmError> {
        if self.frames.len() >= self.max_call_depth {
            return Err(VmError::Fatal(format!(
                "Maximum function nesting level of '{}' reached, aborting!",
                self.max_call_depth
            )));
        }

        let display = match &entry.class_scope {
            Some(class) => format!("{}::{}", class, func.name),
            None => func.name.to_string(),
        };
        let mut scope = Scope::new();
        for (i, param) in func.params.iter().enumerate() {
            let slot = match args.get(i) {
                Some(&h) => match param.pass {
                    PassMode::ByReference | PassMode::PreferReference if self.arena.is_ref(h) => h,
                    _ => self.arena.clone_if_referenced(h),
                },
                None => match &param.default {
                    Some(default) => self.arena.alloc(default.to_val()),
                    None => {
                        self.warning(&format!("Missing argument {} for {}()", i + 1, display));
                        self.arena.alloc(Val::Null)
                    }
                },
            };
            self.arena.bind(slot);
            if let Some(old) = scope.insert(param.name.clone(), slot) {
                self.arena.unbind(old);
            }
        }

        self.scopes.push(scope);
        let mut frame = Frame::new(
            Arc::clone(&func.code),
            self.scopes.len() - 1,
            self.operand_stack.len(),
        );
        frame.owns_scope = true;
        frame.function = Some(func);
        frame.this = entry.receiver;
        frame.class_scope = entry.class_scope;
        frame.called_class = entry.called_class;
        frame.discard_result = discard;
        frame.args = args.iter().copied().collect();
        self.frames.push(frame);
        self.function_calls += 1;
        Ok(())
    }

    /// Run `entry` to completion and return its result
    fn call_entry_sync(&mut self, entry: InvocationEntry, args: &[Handle]) -> Result<Handle, VmError> {
        match &entry.callable {
            Callable::Native(func) => {
                let func = Rc::clone(func);
                self.function_calls += 1;
                (func.handler)(self, entry.receiver, args)
            }
            Callable::User(func) => {
                let func = Rc::clone(func);
                let depth = self.frames.len();
                self.push_user_frame(func, entry, args, false)?;
                self.nested_loops += 1;
                let outcome = self.run_loop(depth);
                self.nested_loops -= 1;
                outcome?;
                self.pop_operand_required()
            }
        }
    }

    /// Call a function from native code, running a nested interpreter loop
    pub fn call_sync(
        &mut self,
        callable: &Callable,
        receiver: Option<Handle>,
        args: &[Handle],
    ) -> Result<Handle, VmError> {
        let mut entry = InvocationEntry::function(callable.clone());
        entry.receiver = receiver;
        self.call_entry_sync(entry, args)
    }

    /// Call a method by name on `obj`, regardless of its visibility
    pub fn call_method_sync(&mut self, obj: Handle, name: &str, args: &[Handle]) -> Result<Handle, VmError> {
        let class = self.object_class(obj).ok_or_else(|| {
            VmError::Fatal(format!("Call to a member function {}() on a non-object", name))
        })?;
        let method = self
            .context
            .find_method(class.as_str(), name)
            .ok_or_else(|| VmError::Fatal(format!("Call to undefined method {}::{}()", class, name)))?;
        let receiver = self.arena.copy_of(obj);
        let requested = method.name.clone();
        let entry = method_entry(method, Some(receiver), &requested, CallKind::Direct, class);
        self.call_entry_sync(entry, args)
    }

    pub(crate) fn has_method(&self, obj: Handle, name: &str) -> bool {
        self.object_class(obj)
            .is_some_and(|class| self.context.find_method(class.as_str(), name).is_some())
    }
}
