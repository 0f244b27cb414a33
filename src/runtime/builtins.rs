//! Classes and functions every interpreter starts with
//!
//! - `stdClass`, the target of implicit object creation and `(object)` casts
//! - `Traversable`, `Iterator`, `IteratorAggregate`: consulted by `foreach`
//! - `ArrayAccess`: routes index operations to `offset*` methods
//! - `Exception`: the base of everything `throw` accepts
//! - `current()`, `key()`, `next()`, `reset()`: the array internal pointer
//!   that by-reference `foreach` drives
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_exceptions.c, $PHP_SRC_PATH/Zend/zend_interfaces.c

use crate::core::value::{Handle, Literal, Name, Val, Visibility};
use crate::runtime::context::{ClassDef, PassMode, RuntimeContext};
use crate::vm::engine::{VM, VmError};

pub fn install(ctx: &mut RuntimeContext) {
    ctx.register_class(ClassDef::new("stdClass"));
    ctx.register_class(ClassDef::interface("Traversable"));
    ctx.register_class(ClassDef::interface("Iterator").implements("Traversable"));
    ctx.register_class(ClassDef::interface("IteratorAggregate").implements("Traversable"));
    ctx.register_class(ClassDef::interface("ArrayAccess"));
    ctx.register_class(
        ClassDef::new("Exception")
            .property("message", Literal::String(String::new()), Visibility::Protected)
            .property("code", Literal::Int(0), Visibility::Protected)
            .native_method("__construct", php_exception_construct, Visibility::Public)
            .native_method("getMessage", php_exception_get_message, Visibility::Public)
            .native_method("getCode", php_exception_get_code, Visibility::Public),
    );

    ctx.register_native("func_get_args", Vec::new(), php_func_get_args);
    ctx.register_native("func_num_args", Vec::new(), php_func_num_args);
    ctx.register_native("register_tick_function", Vec::new(), php_register_tick_function);
    ctx.register_native("unregister_tick_function", Vec::new(), php_unregister_tick_function);

    ctx.register_native("current", vec![PassMode::ByReference], php_current);
    ctx.register_native("key", vec![PassMode::ByReference], php_key);
    ctx.register_native("next", vec![PassMode::ByReference], php_next);
    ctx.register_native("reset", vec![PassMode::ByReference], php_reset);
}

fn require_this(this: Option<Handle>, method: &str) -> Result<Handle, VmError> {
    this.ok_or_else(|| VmError::Fatal(format!("Non-static method Exception::{}() cannot be called statically", method)))
}

/// Exception::__construct($message = "", $code = 0)
pub fn php_exception_construct(vm: &mut VM, this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    let this = require_this(this, "__construct")?;
    if let Some(&message) = args.first() {
        let bytes = vm.value_to_string_bytes(message)?;
        vm.write_property_raw(this, "message", Val::string(&bytes));
    }
    if let Some(&code) = args.get(1) {
        let code = vm.arena.value(code).to_int();
        vm.write_property_raw(this, "code", Val::Int(code));
    }
    Ok(vm.arena.alloc(Val::Null))
}

/// Exception::getMessage()
pub fn php_exception_get_message(vm: &mut VM, this: Option<Handle>, _args: &[Handle]) -> Result<Handle, VmError> {
    let this = require_this(this, "getMessage")?;
    let message = vm.read_property_raw(this, "message").unwrap_or(Val::string(b""));
    Ok(vm.arena.alloc(message))
}

/// Exception::getCode()
pub fn php_exception_get_code(vm: &mut VM, this: Option<Handle>, _args: &[Handle]) -> Result<Handle, VmError> {
    let this = require_this(this, "getCode")?;
    let code = vm.read_property_raw(this, "code").unwrap_or(Val::Int(0));
    Ok(vm.arena.alloc(code))
}

/// Arguments the running user function actually received
fn caller_args(vm: &mut VM, function: &str) -> Option<Vec<Handle>> {
    match vm.frames.last() {
        Some(frame) if frame.function.is_some() => Some(frame.args.to_vec()),
        _ => {
            vm.warning(&format!(
                "{}():  Called from the global scope - no function context",
                function
            ));
            None
        }
    }
}

/// func_get_args()
pub fn php_func_get_args(vm: &mut VM, _this: Option<Handle>, _args: &[Handle]) -> Result<Handle, VmError> {
    let Some(args) = caller_args(vm, "func_get_args") else {
        return Ok(vm.arena.alloc(Val::Bool(false)));
    };
    let values: Vec<Val> = args.iter().map(|&h| vm.arena.value(h).clone()).collect();
    Ok(vm.arena.alloc_array(values))
}

/// func_num_args()
pub fn php_func_num_args(vm: &mut VM, _this: Option<Handle>, _args: &[Handle]) -> Result<Handle, VmError> {
    let count = match caller_args(vm, "func_num_args") {
        Some(args) => args.len() as i64,
        None => -1,
    };
    Ok(vm.arena.alloc(Val::Int(count)))
}

/// register_tick_function($name)
pub fn php_register_tick_function(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    let Some(&name) = args.first() else {
        vm.warning("register_tick_function() expects at least 1 parameter, 0 given");
        return Ok(vm.arena.alloc(Val::Bool(false)));
    };
    let name = Name::from_bytes(&vm.value_to_string_bytes(name)?);
    if vm.context.find_function(name.as_str()).is_none() {
        vm.warning(&format!("Unable to call {}() - function does not exist", name));
        return Ok(vm.arena.alloc(Val::Bool(false)));
    }
    vm.tick_functions.push(name);
    Ok(vm.arena.alloc(Val::Bool(true)))
}

/// unregister_tick_function($name)
pub fn php_unregister_tick_function(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    if let Some(&name) = args.first() {
        let name = vm.value_to_string_bytes(name)?;
        let name = String::from_utf8_lossy(&name).into_owned();
        vm.tick_functions.retain(|f| !f.eq_ignore_case(&name));
    }
    Ok(vm.arena.alloc(Val::Null))
}

/// The array argument of a pointer function, warning when there is none
fn pointer_target(vm: &mut VM, args: &[Handle], function: &str) -> Option<Handle> {
    let Some(&h) = args.first() else {
        vm.warning(&format!("{}() expects exactly 1 parameter, 0 given", function));
        return None;
    };
    match vm.arena.value(h) {
        Val::Array(_) => Some(h),
        other => {
            let message = format!("{}() expects parameter 1 to be array, {} given", function, other.type_name());
            vm.warning(&message);
            None
        }
    }
}

/// Value under the pointer, or false past the end
fn pointer_value(vm: &mut VM, array: Handle) -> Handle {
    let current = match vm.arena.value(array) {
        Val::Array(arr) => arr.current().map(|(_, h)| h),
        _ => None,
    };
    match current {
        Some(elem) => vm.arena.copy_of(elem),
        None => vm.arena.alloc(Val::Bool(false)),
    }
}

/// current(&$array)
pub fn php_current(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    match pointer_target(vm, args, "current") {
        Some(array) => Ok(pointer_value(vm, array)),
        None => Ok(vm.arena.alloc(Val::Null)),
    }
}

/// key(&$array)
pub fn php_key(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    let key = pointer_target(vm, args, "key").and_then(|array| match vm.arena.value(array) {
        Val::Array(arr) => arr.current().map(|(k, _)| k.to_val()),
        _ => None,
    });
    Ok(vm.arena.alloc(key.unwrap_or(Val::Null)))
}

/// next(&$array)
pub fn php_next(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    let Some(array) = pointer_target(vm, args, "next") else {
        return Ok(vm.arena.alloc(Val::Null));
    };
    if let Some(arr) = vm.arena.array_mut(array) {
        arr.advance();
    }
    Ok(pointer_value(vm, array))
}

/// reset(&$array)
pub fn php_reset(vm: &mut VM, _this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError> {
    let Some(array) = pointer_target(vm, args, "reset") else {
        return Ok(vm.arena.alloc(Val::Null));
    };
    if let Some(arr) = vm.arena.array_mut(array) {
        arr.reset();
    }
    Ok(pointer_value(vm, array))
}
