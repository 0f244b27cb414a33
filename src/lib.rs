//! Bytecode virtual machine for the PHP 5 execution model.
//!
//! - [`compiler`]: code blocks, typed composition and the stack-shape verifier
//! - [`core`]: values, arrays and the handle arena
//! - [`runtime`]: function/class tables, built-ins and the program file format
//! - [`vm`]: the instruction set and the interpreter

pub mod compiler;
pub mod core;
pub mod runtime;
pub mod vm;
