// lark-vm - Garbage-collected object heap
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The garbage-collected object heap.
//!
//! Objects live in a slot vector and are addressed by index handles; freed
//! slots go on a free list for reuse, so handles to live objects are stable
//! forever. Collection is tricolor mark–sweep: the caller supplies the
//! roots, a gray worklist is drained to mark everything reachable, the
//! intern set drops entries whose key did not survive marking, and the
//! sweep frees whatever is left unmarked.
//!
//! The heap never collects on its own. Allocation bumps `bytes_allocated`;
//! the VM checks [`Heap::should_gc`] at its allocation points, where it can
//! enumerate the roots, and calls [`Heap::collect`].

use crate::object::{Obj, ObjStr};
use crate::table::{StringKey, Table, hash_str};
use crate::value::{ObjRef, Value};

/// Heap growth factor: the next collection triggers when the live size has
/// doubled.
const HEAP_GROW_FACTOR: usize = 2;

/// First-collection threshold.
const FIRST_GC_AT: usize = 1024 * 1024;

struct HeapSlot {
    obj: Obj,
    marked: bool,
}

/// The object heap, including the string intern set.
pub struct Heap {
    slots: Vec<Option<HeapSlot>>,
    free: Vec<u32>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Intern set: interned string -> Nil. Weak — see [`Heap::collect`].
    strings: Table,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            bytes_allocated: 0,
            next_gc: FIRST_GC_AT,
            strings: Table::new(),
        }
    }

    /// Allocate an object and return its handle. Never collects.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += obj.size_bytes();
        let slot = HeapSlot { obj, marked: false };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                ObjRef(index)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(slot));
                ObjRef(index)
            }
        }
    }

    /// Intern a string: return the existing object for these characters or
    /// allocate a new one and add it to the intern set.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_str(chars);
        let slots = &self.slots;
        let found = self.strings.find_string(chars, hash, |r| {
            match &slots[r.0 as usize].as_ref().expect("interned string swept").obj {
                Obj::Str(s) => &*s.chars,
                _ => unreachable!("non-string key in intern set"),
            }
        });
        if let Some(existing) = found {
            return existing;
        }

        let obj = self.alloc(Obj::Str(ObjStr {
            chars: chars.into(),
            hash,
        }));
        self.strings.set(StringKey { obj, hash }, Value::Nil);
        obj
    }

    /// The key for an interned string, with its cached hash.
    pub fn key(&self, name: ObjRef) -> StringKey {
        StringKey {
            obj: name,
            hash: self.string(name).hash,
        }
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.slots[r.0 as usize]
            .as_ref()
            .expect("dangling object handle")
            .obj
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.slots[r.0 as usize]
            .as_mut()
            .expect("dangling object handle")
            .obj
    }

    pub fn string(&self, r: ObjRef) -> &crate::object::ObjStr {
        match self.get(r) {
            Obj::Str(s) => s,
            _ => unreachable!("expected string object"),
        }
    }

    pub fn function(&self, r: ObjRef) -> &crate::object::ObjFunction {
        match self.get(r) {
            Obj::Function(f) => f,
            _ => unreachable!("expected function object"),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &crate::object::ObjClosure {
        match self.get(r) {
            Obj::Closure(c) => c,
            _ => unreachable!("expected closure object"),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjClosure {
        match self.get_mut(r) {
            Obj::Closure(c) => c,
            _ => unreachable!("expected closure object"),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &crate::object::ObjUpvalue {
        match self.get(r) {
            Obj::Upvalue(u) => u,
            _ => unreachable!("expected upvalue object"),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjUpvalue {
        match self.get_mut(r) {
            Obj::Upvalue(u) => u,
            _ => unreachable!("expected upvalue object"),
        }
    }

    pub fn class(&self, r: ObjRef) -> &crate::object::ObjClass {
        match self.get(r) {
            Obj::Class(c) => c,
            _ => unreachable!("expected class object"),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjClass {
        match self.get_mut(r) {
            Obj::Class(c) => c,
            _ => unreachable!("expected class object"),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &crate::object::ObjInstance {
        match self.get(r) {
            Obj::Instance(i) => i,
            _ => unreachable!("expected instance object"),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjInstance {
        match self.get_mut(r) {
            Obj::Instance(i) => i,
            _ => unreachable!("expected instance object"),
        }
    }

    /// Current allocation footprint in bytes.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// True once allocation has crossed the collection threshold.
    pub fn should_gc(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    /// Number of live objects, mainly for tests.
    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Run a full mark–sweep collection from the given roots.
    ///
    /// Returns the number of bytes freed.
    pub fn collect(&mut self, roots: Vec<ObjRef>) -> usize {
        let before = self.bytes_allocated;

        // Mark: drain the gray worklist, blackening objects and queueing
        // their children.
        let mut gray = roots;
        while let Some(r) = gray.pop() {
            let slot = self.slots[r.0 as usize]
                .as_mut()
                .expect("traced a dangling handle");
            if slot.marked {
                continue;
            }
            slot.marked = true;
            slot.obj.trace(&mut gray);
        }

        // The intern set is weak: drop entries whose key is about to be
        // swept, so interning does not keep dead strings alive.
        let slots = &self.slots;
        self.strings
            .retain_keys(|r| slots[r.0 as usize].as_ref().is_some_and(|s| s.marked));

        // Sweep: free unmarked slots, clear marks on survivors, and rebuild
        // the byte count from the live set.
        self.bytes_allocated = 0;
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if let Some(slot) = entry {
                if slot.marked {
                    slot.marked = false;
                    self.bytes_allocated += slot.obj.size_bytes();
                } else {
                    *entry = None;
                    self.free.push(index as u32);
                }
            }
        }

        self.next_gc = self.bytes_allocated * HEAP_GROW_FACTOR;
        before.saturating_sub(self.bytes_allocated)
    }

    /// Render a value for `print` and the REPL.
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(r) => self.format_object(r),
        }
    }

    fn format_object(&self, r: ObjRef) -> String {
        match self.get(r) {
            Obj::Str(s) => s.chars.to_string(),
            Obj::Function(f) => self.format_function(f.name),
            Obj::Native(_) => "<native fn>".to_string(),
            Obj::Closure(c) => self.format_function(self.function(c.function).name),
            Obj::Upvalue(_) => "upvalue".to_string(),
            Obj::Class(c) => self.string(c.name).chars.to_string(),
            Obj::Instance(i) => {
                format!("{} instance", self.string(self.class(i.class).name).chars)
            }
            Obj::BoundMethod(b) => {
                let closure = self.closure(b.method);
                self.format_function(self.function(closure.function).name)
            }
        }
    }

    fn format_function(&self, name: Option<ObjRef>) -> String {
        match name {
            Some(name) => format!("<fn {}>", self.string(name).chars),
            None => "<script>".to_string(),
        }
    }

    /// The value's type, as shown in diagnostics.
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Obj(r) => self.get(r).kind_name(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer-valued numbers print without a decimal point.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn collect_frees_unreachable() {
        let mut heap = Heap::new();
        let keep = heap.intern("keep");
        let _drop = heap.intern("drop");
        assert_eq!(heap.object_count(), 2);

        let freed = heap.collect(vec![keep]);
        assert!(freed > 0);
        assert_eq!(heap.object_count(), 1);
        assert_eq!(&*heap.string(keep).chars, "keep");
    }

    #[test]
    fn weak_intern_allows_reintern_after_collect() {
        let mut heap = Heap::new();
        let first = heap.intern("transient");
        heap.collect(vec![]);
        // The slot was reclaimed; a fresh intern must not resolve to the
        // swept object.
        let second = heap.intern("transient");
        assert_eq!(&*heap.string(second).chars, "transient");
        let _ = first;
    }

    #[test]
    fn collect_is_idempotent_without_allocation() {
        let mut heap = Heap::new();
        let live = heap.intern("live");
        heap.collect(vec![live]);
        let freed = heap.collect(vec![live]);
        assert_eq!(freed, 0);
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.0), "0");
    }
}
