pub mod calls;
pub mod cancel;
mod class_resolution;
pub mod engine;
pub mod executor;
pub mod foreach;
pub mod frame;
pub mod invocation;
pub mod list;
mod memory;
pub mod opcode;
mod opcodes;
pub mod stack;
mod stack_helpers;
mod type_conversion;
mod visibility;
