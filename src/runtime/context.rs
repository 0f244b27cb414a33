use crate::compiler::block::CodeBlock;
use crate::core::value::{Handle, Literal, Name, Visibility};
use crate::vm::engine::{VM, VmError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Native function or method body. `this` is the receiver for methods.
pub type NativeHandler = fn(&mut VM, this: Option<Handle>, args: &[Handle]) -> Result<Handle, VmError>;

/// Declared pass semantics of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    #[default]
    ByValue,
    ByReference,
    /// Accepts a reference when one is available (e.g. `array_multisort`)
    PreferReference,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Name,
    pub pass: PassMode,
    pub default: Option<Literal>,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            pass: PassMode::ByValue,
            default: None,
        }
    }

    pub fn by_ref(name: &str) -> Self {
        Self {
            pass: PassMode::ByReference,
            ..Self::new(name)
        }
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug)]
pub struct UserFunc {
    pub name: Name,
    pub params: Vec<Param>,
    pub code: Arc<CodeBlock>,
    pub returns_ref: bool,
    /// Key of the function's static-variable table
    pub statics_key: String,
}

impl UserFunc {
    pub fn new(name: &str, params: Vec<Param>, code: CodeBlock) -> Self {
        Self {
            name: Name::new(name),
            params,
            code: Arc::new(code),
            returns_ref: false,
            statics_key: name.to_ascii_lowercase(),
        }
    }
}

#[derive(Clone)]
pub struct NativeFunc {
    pub name: Name,
    pub handler: NativeHandler,
    pub params: Vec<PassMode>,
}

impl fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunc({})", self.name)
    }
}

/// A resolved unit of code ready to receive arguments
#[derive(Debug, Clone)]
pub enum Callable {
    User(Rc<UserFunc>),
    Native(Rc<NativeFunc>),
}

impl Callable {
    pub fn name(&self) -> &Name {
        match self {
            Callable::User(f) => &f.name,
            Callable::Native(f) => &f.name,
        }
    }

    /// Pass semantics the callee declares for parameter `index`;
    /// undeclared positions are by value
    pub fn param_pass(&self, index: usize) -> PassMode {
        match self {
            Callable::User(f) => f.params.get(index).map(|p| p.pass).unwrap_or_default(),
            Callable::Native(f) => f.params.get(index).copied().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub default: Literal,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: Name,
    pub callable: Callable,
    pub visibility: Visibility,
    pub is_static: bool,
    pub declaring_class: Name,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Name,
    pub parent: Option<Name>,
    pub interfaces: Vec<Name>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub constants: IndexMap<Name, Literal>,
    pub properties: IndexMap<Name, PropertyDef>,
    pub static_properties: IndexMap<Name, PropertyDef>,
    /// Keyed by lowercase method name
    pub methods: HashMap<String, MethodDef>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            parent: None,
            interfaces: Vec::new(),
            is_interface: false,
            is_abstract: false,
            constants: IndexMap::new(),
            properties: IndexMap::new(),
            static_properties: IndexMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        Self {
            is_interface: true,
            ..Self::new(name)
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(Name::new(parent));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(Name::new(interface));
        self
    }

    pub fn constant(mut self, name: &str, value: Literal) -> Self {
        self.constants.insert(Name::new(name), value);
        self
    }

    pub fn property(mut self, name: &str, default: Literal, visibility: Visibility) -> Self {
        self.properties
            .insert(Name::new(name), PropertyDef { default, visibility });
        self
    }

    pub fn static_property(mut self, name: &str, default: Literal, visibility: Visibility) -> Self {
        self.static_properties
            .insert(Name::new(name), PropertyDef { default, visibility });
        self
    }

    /// Add a method implemented by a code block
    pub fn method(mut self, name: &str, params: Vec<Param>, code: CodeBlock, visibility: Visibility) -> Self {
        self.add_user_method(name, params, code, visibility, false);
        self
    }

    pub fn static_method(mut self, name: &str, params: Vec<Param>, code: CodeBlock, visibility: Visibility) -> Self {
        self.add_user_method(name, params, code, visibility, true);
        self
    }

    pub fn native_method(mut self, name: &str, handler: NativeHandler, visibility: Visibility) -> Self {
        let callable = Callable::Native(Rc::new(NativeFunc {
            name: Name::new(name),
            handler,
            params: Vec::new(),
        }));
        self.methods.insert(
            name.to_ascii_lowercase(),
            MethodDef {
                name: Name::new(name),
                callable,
                visibility,
                is_static: false,
                declaring_class: self.name.clone(),
            },
        );
        self
    }

    pub fn add_user_method(
        &mut self,
        name: &str,
        params: Vec<Param>,
        code: CodeBlock,
        visibility: Visibility,
        is_static: bool,
    ) {
        let mut func = UserFunc::new(name, params, code);
        func.statics_key = format!("{}::{}", self.name.lower(), name.to_ascii_lowercase());
        self.methods.insert(
            name.to_ascii_lowercase(),
            MethodDef {
                name: Name::new(name),
                callable: Callable::User(Rc::new(func)),
                visibility,
                is_static,
                declaring_class: self.name.clone(),
            },
        );
    }
}

/// Function, class and constant tables of one interpreter.
///
/// Function and class names are case-insensitive; constants are not.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub functions: HashMap<String, Callable>,
    pub classes: HashMap<String, Rc<ClassDef>>,
    pub constants: HashMap<Name, Literal>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        let mut ctx = Self::default();
        crate::runtime::builtins::install(&mut ctx);
        ctx
    }

    pub fn register_function(&mut self, func: UserFunc) {
        self.functions
            .insert(func.name.lower(), Callable::User(Rc::new(func)));
    }

    pub fn register_native(&mut self, name: &str, params: Vec<PassMode>, handler: NativeHandler) {
        let func = NativeFunc {
            name: Name::new(name),
            handler,
            params,
        };
        self.functions
            .insert(name.to_ascii_lowercase(), Callable::Native(Rc::new(func)));
    }

    pub fn register_class(&mut self, class: ClassDef) {
        self.classes.insert(class.name.lower(), Rc::new(class));
    }

    pub fn define_constant(&mut self, name: &str, value: Literal) {
        self.constants.insert(Name::new(name), value);
    }

    pub fn find_function(&self, name: &str) -> Option<&Callable> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn find_class(&self, name: &str) -> Option<Rc<ClassDef>> {
        self.classes.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Class followed by its ancestors, nearest first
    pub fn lineage(&self, name: &str) -> Vec<Rc<ClassDef>> {
        let mut chain = Vec::new();
        let mut next = self.find_class(name);
        while let Some(class) = next {
            if chain.iter().any(|c: &Rc<ClassDef>| Rc::ptr_eq(c, &class)) {
                break;
            }
            next = class.parent.as_ref().and_then(|p| self.find_class(p.as_str()));
            chain.push(class);
        }
        chain
    }

    /// instanceof over parents and (transitively) interfaces
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let mut pending = vec![class.to_string()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if current.eq_ignore_ascii_case(ancestor) {
                return true;
            }
            let lower = current.to_ascii_lowercase();
            if seen.contains(&lower) {
                continue;
            }
            seen.push(lower);
            if let Some(def) = self.find_class(&current) {
                if let Some(parent) = &def.parent {
                    pending.push(parent.to_string());
                }
                pending.extend(def.interfaces.iter().map(Name::to_string));
            }
        }
        false
    }

    pub fn find_method(&self, class: &str, method: &str) -> Option<MethodDef> {
        let key = method.to_ascii_lowercase();
        self.lineage(class)
            .into_iter()
            .find_map(|c| c.methods.get(&key).cloned())
    }

    pub fn find_class_constant(&self, class: &str, name: &str) -> Option<Literal> {
        self.lineage(class).into_iter().find_map(|c| {
            c.constants
                .iter()
                .find(|(n, _)| n.as_str() == name)
                .map(|(_, v)| v.clone())
        })
    }

    /// Declaring class and definition of a static property
    pub fn find_static_property(&self, class: &str, name: &str) -> Option<(Name, PropertyDef)> {
        self.lineage(class).into_iter().find_map(|c| {
            c.static_properties
                .iter()
                .find(|(n, _)| n.as_str() == name)
                .map(|(_, def)| (c.name.clone(), def.clone()))
        })
    }

    /// Declared instance property, searched from the most derived class
    pub fn find_property(&self, class: &str, name: &str) -> Option<(Name, PropertyDef)> {
        self.lineage(class).into_iter().find_map(|c| {
            c.properties
                .iter()
                .find(|(n, _)| n.as_str() == name)
                .map(|(_, def)| (c.name.clone(), def.clone()))
        })
    }

    /// Default instance properties, ancestors first so overrides win
    pub fn default_properties(&self, class: &str) -> IndexMap<Name, Literal> {
        let mut props = IndexMap::new();
        for def in self.lineage(class).into_iter().rev() {
            for (name, prop) in &def.properties {
                props.insert(name.clone(), prop.default.clone());
            }
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RuntimeContext {
        let mut ctx = RuntimeContext::new();
        ctx.register_class(
            ClassDef::new("Base")
                .property("a", Literal::Int(1), Visibility::Public)
                .constant("K", Literal::Int(7)),
        );
        ctx.register_class(
            ClassDef::new("Child")
                .extends("Base")
                .implements("Countable")
                .property("a", Literal::Int(2), Visibility::Protected)
                .property("b", Literal::Null, Visibility::Private),
        );
        ctx.register_class(ClassDef::interface("Countable"));
        ctx
    }

    #[test]
    fn lineage_and_subclassing() {
        let ctx = ctx();
        let names: Vec<_> = ctx.lineage("child").iter().map(|c| c.name.to_string()).collect();
        assert_eq!(names, vec!["Child", "Base"]);
        assert!(ctx.is_subclass_of("Child", "base"));
        assert!(ctx.is_subclass_of("Child", "Countable"));
        assert!(!ctx.is_subclass_of("Base", "Child"));
    }

    #[test]
    fn inherited_lookups() {
        let ctx = ctx();
        assert_eq!(ctx.find_class_constant("Child", "K"), Some(Literal::Int(7)));
        let props = ctx.default_properties("Child");
        assert_eq!(props.get(&Name::new("a")), Some(&Literal::Int(2)));
        assert_eq!(props.len(), 2);
        let (declaring, def) = ctx.find_property("Child", "a").unwrap();
        assert_eq!(declaring.as_str(), "Child");
        assert_eq!(def.visibility, Visibility::Protected);
    }

    #[test]
    fn exception_is_preinstalled() {
        let ctx = ctx();
        assert!(ctx.find_class("exception").is_some());
        assert!(ctx.find_method("Exception", "getMessage").is_some());
    }
}
