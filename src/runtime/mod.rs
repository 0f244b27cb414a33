pub mod builtins;
pub mod context;
pub mod program;
