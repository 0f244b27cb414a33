use crate::compiler::block::CodeBlock;
use crate::core::gc::Traceable;
use crate::core::value::{Handle, Name};
use crate::runtime::context::UserFunc;
use crate::vm::foreach::ForEachIterator;
use crate::vm::invocation::InvocationStack;
use crate::vm::list::ListIterator;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::rc::Rc;
use std::sync::Arc;

pub const INLINE_ARG_CAPACITY: usize = 8;
pub type ArgList = SmallVec<[Handle; INLINE_ARG_CAPACITY]>;

/// Variable table: name to bound slot
pub type Scope = IndexMap<Name, Handle>;

/// State restored when an exception is routed to a try region's handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchEntry {
    pub handler_pc: usize,
    pub stack_height: usize,
    pub fe_depth: usize,
    pub list_depth: usize,
    pub invocation_depth: usize,
    pub silence: u32,
}

#[derive(Debug)]
pub struct Frame {
    pub code: Arc<CodeBlock>,
    pub pc: usize,
    /// Operand-stack height when the frame was entered
    pub entry_height: usize,
    /// Index into `VM::scopes`
    pub scope: usize,
    /// The scope is popped when the frame finishes
    pub owns_scope: bool,
    pub function: Option<Rc<UserFunc>>,
    pub this: Option<Handle>,
    pub class_scope: Option<Name>,
    pub called_class: Option<Name>,
    pub discard_result: bool,
    pub args: ArgList,
    pub catch_stack: Vec<CatchEntry>,
    /// `None` marks a loop whose source could not be iterated
    pub fe_stack: Vec<Option<ForEachIterator>>,
    pub list_stack: Vec<ListIterator>,
    pub invocations: InvocationStack,
}

impl Frame {
    pub fn new(code: Arc<CodeBlock>, scope: usize, entry_height: usize) -> Self {
        Self {
            code,
            pc: 0,
            entry_height,
            scope,
            owns_scope: false,
            function: None,
            this: None,
            class_scope: None,
            called_class: None,
            discard_result: false,
            args: ArgList::new(),
            catch_stack: Vec::new(),
            fe_stack: Vec::new(),
            list_stack: Vec::new(),
            invocations: InvocationStack::default(),
        }
    }

    /// Name used in diagnostics: `f`, `C::m` or `{main}`
    pub fn display_name(&self) -> String {
        match (&self.function, &self.class_scope) {
            (Some(f), Some(class)) => format!("{}::{}", class, f.name),
            (Some(f), None) => f.name.to_string(),
            (None, _) => "{main}".to_string(),
        }
    }

    /// Snapshot of the stack depths a try region restores to
    pub fn catch_entry(&self, handler_pc: usize, stack_height: usize, silence: u32) -> CatchEntry {
        CatchEntry {
            handler_pc,
            stack_height,
            fe_depth: self.fe_stack.len(),
            list_depth: self.list_stack.len(),
            invocation_depth: self.invocations.len(),
            silence,
        }
    }
}

impl Traceable for Frame {
    fn trace_handles(&self, tracer: &mut dyn FnMut(Handle)) {
        if let Some(h) = self.this {
            tracer(h);
        }
        for &h in self.args.iter() {
            tracer(h);
        }
        for it in self.fe_stack.iter().flatten() {
            it.trace_handles(tracer);
        }
        for it in &self.list_stack {
            it.trace_handles(tracer);
        }
        self.invocations.trace_handles(tracer);
    }
}
