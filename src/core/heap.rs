use crate::core::gc::Traceable;
use crate::core::value::{ArrayData, Handle, ObjectData, Val, Zval};
use std::rc::Rc;

/// Allocations between collections before the first one is considered
const INITIAL_GC_THRESHOLD: usize = 1024;
const MIN_GC_THRESHOLD: usize = 256;
const MAX_GC_THRESHOLD: usize = 65536;

/// Slot storage for every value the VM touches.
///
/// Operand stacks, variable tables, array elements and object properties all
/// hold [`Handle`]s into this arena. A slot that is bound into one of those
/// containers has a non-zero `refcount`; everything else is a temporary.
/// Unreachable slots are reclaimed by [`Arena::collect`] and reused by later
/// allocations.
#[derive(Debug)]
pub struct Arena {
    storage: Vec<Zval>,
    free_slots: Vec<usize>,
    marks: Vec<bool>,
    /// Allocations since the last collection
    alloc_debt: usize,
    gc_threshold: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self {
            storage: Vec::with_capacity(1024),
            free_slots: Vec::new(),
            marks: Vec::new(),
            alloc_debt: 0,
            gc_threshold: INITIAL_GC_THRESHOLD,
        }
    }

    pub fn alloc(&mut self, val: Val) -> Handle {
        let zval = Zval {
            value: val,
            is_ref: false,
            refcount: 0,
        };
        self.alloc_debt += 1;

        if let Some(idx) = self.free_slots.pop() {
            self.storage[idx] = zval;
            return Handle(idx as u32);
        }

        let idx = self.storage.len();
        self.storage.push(zval);
        Handle(idx as u32)
    }

    pub fn get(&self, h: Handle) -> &Zval {
        &self.storage[h.0 as usize]
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut Zval {
        &mut self.storage[h.0 as usize]
    }

    #[inline]
    pub fn value(&self, h: Handle) -> &Val {
        &self.storage[h.0 as usize].value
    }

    pub fn set_value(&mut self, h: Handle, val: Val) {
        self.storage[h.0 as usize].value = val;
    }

    /// Live (not reclaimed) slots
    pub fn len(&self) -> usize {
        self.storage.len() - self.free_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots ever allocated, live or free
    pub fn slot_count(&self) -> usize {
        self.storage.len()
    }

    pub fn should_collect(&self) -> bool {
        self.alloc_debt >= self.gc_threshold
    }

    /// Mark everything reachable from `roots` and free the rest.
    ///
    /// Freed slots are cleared (dropping their array and string storage) and
    /// handed out again by [`Arena::alloc`]. Returns the number of slots
    /// reclaimed.
    pub fn collect(&mut self, roots: &[Handle]) -> usize {
        self.marks.clear();
        self.marks.resize(self.storage.len(), false);

        let mut worklist: Vec<Handle> = roots.to_vec();
        while let Some(h) = worklist.pop() {
            let idx = h.0 as usize;
            if idx >= self.marks.len() || self.marks[idx] {
                continue;
            }
            self.marks[idx] = true;
            let marks = &self.marks;
            self.storage[idx].trace_handles(&mut |child| {
                if marks.get(child.0 as usize) == Some(&false) {
                    worklist.push(child);
                }
            });
        }

        for slot in self.free_slots.iter() {
            self.marks[*slot] = true;
        }
        let mut collected = 0;
        for (idx, marked) in self.marks.iter().enumerate() {
            if !*marked {
                self.storage[idx] = Zval {
                    value: Val::Null,
                    is_ref: false,
                    refcount: 0,
                };
                self.free_slots.push(idx);
                collected += 1;
            }
        }

        self.alloc_debt = 0;
        if collected < self.gc_threshold / 4 {
            self.gc_threshold = (self.gc_threshold * 2).min(MAX_GC_THRESHOLD);
        } else if collected > self.gc_threshold / 2 {
            self.gc_threshold = (self.gc_threshold / 2).max(MIN_GC_THRESHOLD);
        }
        collected
    }

    /// A container (variable table, array, object) now holds `h`
    pub fn bind(&mut self, h: Handle) {
        let z = self.get_mut(h);
        z.refcount = z.refcount.saturating_add(1);
    }

    /// A container dropped its hold on `h`; the last unbind of a reference
    /// turns it back into a plain value
    pub fn unbind(&mut self, h: Handle) {
        let z = self.get_mut(h);
        z.refcount = z.refcount.saturating_sub(1);
        if z.refcount <= 1 {
            z.is_ref = false;
        }
    }

    pub fn is_referenced(&self, h: Handle) -> bool {
        self.get(h).refcount > 0
    }

    pub fn is_ref(&self, h: Handle) -> bool {
        self.get(h).is_ref
    }

    pub fn make_ref(&mut self, h: Handle) {
        self.get_mut(h).is_ref = true;
    }

    /// Fresh temporary holding a copy of `h`'s value (arrays share storage
    /// until written)
    pub fn copy_of(&mut self, h: Handle) -> Handle {
        let val = self.value(h).clone();
        self.alloc(val)
    }

    /// Copy `h` only if some container can still observe it
    pub fn clone_if_referenced(&mut self, h: Handle) -> Handle {
        if self.is_referenced(h) || self.is_ref(h) {
            self.copy_of(h)
        } else {
            h
        }
    }

    /// Copy-on-write split of the array held in `h`.
    ///
    /// When the storage is shared, the slot receives a private copy whose
    /// non-reference element slots are re-allocated, so writes through
    /// element handles cannot leak into the other owners. Reference elements
    /// stay shared, as PHP does.
    pub fn separate(&mut self, h: Handle) {
        let shared = match &self.get(h).value {
            Val::Array(rc) if Rc::strong_count(rc) > 1 => Rc::clone(rc),
            _ => return,
        };
        let copy = self.duplicate_array(&shared);
        drop(shared);
        self.set_value(h, Val::Array(Rc::new(copy)));
    }

    /// Array storage with its own element slots (reference elements shared)
    pub fn duplicate_array(&mut self, source: &ArrayData) -> ArrayData {
        let mut copy = ArrayData::with_capacity(source.len());
        copy.next_free = source.next_free;
        copy.cursor = source.cursor;
        for (key, &elem) in source.map.iter() {
            let slot = if self.is_ref(elem) {
                elem
            } else {
                self.copy_of(elem)
            };
            self.bind(slot);
            copy.map.insert(key.clone(), slot);
        }
        copy
    }

    /// Mutable access to the array in `h`, splitting shared storage first
    pub fn array_mut(&mut self, h: Handle) -> Option<&mut ArrayData> {
        self.separate(h);
        match &mut self.get_mut(h).value {
            Val::Array(rc) => Some(Rc::make_mut(rc)),
            _ => None,
        }
    }

    /// Build an array value from plain values
    pub fn alloc_array<I>(&mut self, values: I) -> Handle
    where
        I: IntoIterator<Item = Val>,
    {
        let mut data = ArrayData::new();
        for v in values {
            let slot = self.alloc(v);
            self.bind(slot);
            data.push(slot);
        }
        self.alloc(Val::Array(Rc::new(data)))
    }

    pub fn object(&self, obj: Handle) -> Option<&ObjectData> {
        match self.value(obj) {
            Val::Object(payload) => match self.value(*payload) {
                Val::ObjPayload(data) => Some(data),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn payload_mut(&mut self, payload: Handle) -> Option<&mut ObjectData> {
        match &mut self.get_mut(payload).value {
            Val::ObjPayload(data) => Some(data),
            _ => None,
        }
    }

    pub fn payload(&self, payload: Handle) -> Option<&ObjectData> {
        match self.value(payload) {
            Val::ObjPayload(data) => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::ArrayKey;

    #[test]
    fn separate_unshares_non_reference_elements() {
        let mut arena = Arena::new();
        let a = arena.alloc_array([Val::Int(1), Val::Int(2)]);
        let b = arena.copy_of(a);

        arena.separate(a);
        let elem = match arena.value(a) {
            Val::Array(arr) => arr.get(&ArrayKey::Int(0)).unwrap(),
            _ => panic!("expected array"),
        };
        arena.set_value(elem, Val::Int(99));

        match arena.value(b) {
            Val::Array(arr) => {
                let h = arr.get(&ArrayKey::Int(0)).unwrap();
                assert_eq!(arena.value(h), &Val::Int(1));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn separate_keeps_reference_elements_shared() {
        let mut arena = Arena::new();
        let a = arena.alloc_array([Val::Int(1)]);
        let elem = match arena.value(a) {
            Val::Array(arr) => arr.get(&ArrayKey::Int(0)).unwrap(),
            _ => unreachable!(),
        };
        arena.make_ref(elem);
        let b = arena.copy_of(a);
        arena.separate(a);
        arena.set_value(elem, Val::Int(5));
        match arena.value(b) {
            Val::Array(arr) => {
                let h = arr.get(&ArrayKey::Int(0)).unwrap();
                assert_eq!(arena.value(h), &Val::Int(5));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn temporaries_are_unreferenced_until_bound() {
        let mut arena = Arena::new();
        let h = arena.alloc(Val::Int(1));
        assert!(!arena.is_referenced(h));
        assert_eq!(arena.clone_if_referenced(h), h);
        arena.bind(h);
        assert!(arena.is_referenced(h));
        assert_ne!(arena.clone_if_referenced(h), h);
    }

    #[test]
    fn collect_frees_unreachable_slots_for_reuse() {
        let mut arena = Arena::new();
        let root = arena.alloc(Val::Int(1));
        let garbage = arena.alloc(Val::Int(2));
        assert_eq!(arena.collect(&[root]), 1);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.value(root), &Val::Int(1));

        let reused = arena.alloc(Val::Int(3));
        assert_eq!(reused, garbage);
        assert_eq!(arena.slot_count(), 2);
    }

    #[test]
    fn collect_traces_array_elements() {
        let mut arena = Arena::new();
        let array = arena.alloc_array([Val::Int(7), Val::Int(8)]);
        assert_eq!(arena.collect(&[array]), 0);
        match arena.value(array) {
            Val::Array(arr) => {
                let h = arr.get(&ArrayKey::Int(1)).unwrap();
                assert_eq!(arena.value(h), &Val::Int(8));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn collect_handles_object_cycles() {
        let mut arena = Arena::new();
        let payload = arena.alloc(Val::Null);
        let obj = arena.alloc(Val::Object(payload));
        let mut data = ObjectData {
            class: crate::core::value::Name::new("Node"),
            properties: Default::default(),
        };
        data.properties.insert(crate::core::value::Name::new("self"), obj);
        arena.set_value(payload, Val::ObjPayload(data));

        assert_eq!(arena.collect(&[obj]), 0);
        assert_eq!(arena.collect(&[]), 2);
        assert!(arena.is_empty());
    }
}
