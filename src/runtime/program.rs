//! Serialized program format
//!
//! A program file is JSON: the main block, the user functions and classes it
//! declares, and global constants. Blocks are stored as their instruction
//! lists, so anything a front end can build in memory round-trips here.

use crate::compiler::block::CodeBlock;
use crate::core::value::{Literal, Visibility};
use crate::runtime::context::{ClassDef, Param, PassMode, RuntimeContext, UserFunc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Cannot redeclare {0}()")]
    DuplicateFunction(String),
    #[error("Cannot redeclare class {0}")]
    DuplicateClass(String),
    #[error("Class {class} extends unknown class {parent}")]
    UnknownParent { class: String, parent: String },
    #[error("invalid program file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub pass: PassMode,
    #[serde(default)]
    pub default: Option<Literal>,
}

impl ParamDecl {
    fn to_param(&self) -> Param {
        let mut param = match self.pass {
            PassMode::ByValue => Param::new(&self.name),
            _ => Param::by_ref(&self.name),
        };
        param.pass = self.pass;
        if let Some(default) = &self.default {
            param = param.with_default(default.clone());
        }
        param
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub returns_ref: bool,
    pub code: CodeBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    pub code: CodeBlock,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    #[serde(default = "null_literal")]
    pub default: Literal,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
}

fn null_literal() -> Literal {
    Literal::Null
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub constants: BTreeMap<String, Literal>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

impl ClassDecl {
    fn to_class_def(&self) -> ClassDef {
        let mut class = if self.is_interface {
            ClassDef::interface(&self.name)
        } else {
            ClassDef::new(&self.name)
        };
        class.is_abstract = self.is_abstract;
        if let Some(parent) = &self.parent {
            class = class.extends(parent);
        }
        for interface in &self.interfaces {
            class = class.implements(interface);
        }
        for (name, value) in &self.constants {
            class = class.constant(name, value.clone());
        }
        for prop in &self.properties {
            class = if prop.is_static {
                class.static_property(&prop.name, prop.default.clone(), prop.visibility)
            } else {
                class.property(&prop.name, prop.default.clone(), prop.visibility)
            };
        }
        for method in &self.methods {
            let params = method.params.iter().map(ParamDecl::to_param).collect();
            class.add_user_method(
                &method.name,
                params,
                method.code.clone(),
                method.visibility,
                method.is_static,
            );
        }
        class
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub main: CodeBlock,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub constants: BTreeMap<String, Literal>,
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Declare the program's functions, classes and constants.
    ///
    /// Classes are declared in file order, so a parent must precede its
    /// children.
    pub fn install(&self, ctx: &mut RuntimeContext) -> Result<(), ProgramError> {
        for decl in &self.functions {
            if ctx.find_function(&decl.name).is_some() {
                return Err(ProgramError::DuplicateFunction(decl.name.clone()));
            }
            let params = decl.params.iter().map(ParamDecl::to_param).collect();
            let mut func = UserFunc::new(&decl.name, params, decl.code.clone());
            func.returns_ref = decl.returns_ref;
            ctx.register_function(func);
        }
        for decl in &self.classes {
            if ctx.find_class(&decl.name).is_some() {
                return Err(ProgramError::DuplicateClass(decl.name.clone()));
            }
            if let Some(parent) = &decl.parent
                && ctx.find_class(parent).is_none()
            {
                return Err(ProgramError::UnknownParent {
                    class: decl.name.clone(),
                    parent: parent.clone(),
                });
            }
            ctx.register_class(decl.to_class_def());
        }
        for (name, value) in &self.constants {
            ctx.define_constant(name, value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_program_parses() {
        let program = Program::from_json(r#"{ "main": [] }"#).unwrap();
        assert!(program.main.is_empty());
        assert!(program.functions.is_empty());
    }

    #[test]
    fn redeclared_function_is_rejected() {
        let program = Program::from_json(
            r#"{ "main": [], "functions": [ { "name": "func_get_args", "code": [] } ] }"#,
        )
        .unwrap();
        let mut ctx = RuntimeContext::new();
        let err = program.install(&mut ctx).unwrap_err();
        assert!(matches!(err, ProgramError::DuplicateFunction(_)));
    }

    #[test]
    fn classes_install_with_members() {
        let program = Program::from_json(
            r#"{
                "main": [],
                "classes": [ {
                    "name": "Counter",
                    "constants": { "START": 1 },
                    "properties": [
                        { "name": "n", "default": 0, "visibility": "private" },
                        { "name": "instances", "is_static": true }
                    ],
                    "methods": [ { "name": "bump", "code": [] } ]
                } ]
            }"#,
        )
        .unwrap();
        let mut ctx = RuntimeContext::new();
        program.install(&mut ctx).unwrap();
        let class = ctx.find_class("counter").unwrap();
        assert!(class.methods.contains_key("bump"));
        assert_eq!(ctx.find_class_constant("Counter", "START"), Some(Literal::Int(1)));
        assert!(ctx.find_static_property("Counter", "instances").is_some());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let program = Program::from_json(
            r#"{ "main": [], "classes": [ { "name": "B", "parent": "A" } ] }"#,
        )
        .unwrap();
        let err = program.install(&mut RuntimeContext::new()).unwrap_err();
        assert!(matches!(err, ProgramError::UnknownParent { .. }));
    }
}
