//! Arena collection driven by the interpreter
//!
//! The roots are every handle the VM holds outside the arena: the operand
//! stack, variable tables, statics, and each frame's receiver, arguments and
//! iterators. Collection runs from the interpreter loop's poll point, and
//! only while no native callback is running a nested loop, since a native
//! function may keep handles in its own locals.

use crate::core::gc::Traceable;
use crate::core::value::Handle;
use crate::vm::engine::VM;

impl VM {
    fn gc_roots(&self) -> Vec<Handle> {
        let mut roots: Vec<Handle> = self.operand_stack.iter().collect();
        for scope in &self.scopes {
            roots.extend(scope.values().copied());
        }
        for table in self.function_statics.values().chain(self.static_properties.values()) {
            roots.extend(table.values().copied());
        }
        roots.extend(self.magic_guards.iter().map(|(h, _, _)| *h));
        for frame in &self.frames {
            frame.trace_handles(&mut |h| roots.push(h));
        }
        roots
    }

    /// Reclaim every slot the running program can no longer reach.
    ///
    /// Values the host copied out of earlier runs are not roots: handles
    /// inside a returned array are only valid until the next collection.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self.gc_roots();
        self.arena.collect(&roots)
    }

    /// Collect when enough has been allocated and no native code holds
    /// handles of its own
    pub(crate) fn maybe_collect(&mut self) {
        if self.nested_loops == 0 && self.arena.should_collect() {
            self.collect_garbage();
        }
    }
}
