//! The collector: mark from the VM's roots, sweep the heap.
//!
//! A collection is a full stop-the-world cycle inside one allocation
//! point:
//!
//! 1. mark the roots (every value-stack slot, every frame's closure,
//!    every open upvalue, every globals key and value, and the cached
//!    `init` string), pushing newly marked objects onto the gray stack;
//! 2. blacken gray objects until the worklist drains, marking whatever
//!    each one references;
//! 3. drop unmarked keys from the intern set (weak semantics: the set
//!    alone keeps no string alive);
//! 4. sweep the heap's object list, freeing every unmarked object and
//!    clearing survivors' marks;
//! 5. rearm the trigger at `surviving bytes x growth factor`.
//!
//! The compiler never collects; only the VM's runtime allocation points
//! call [`Vm::collect_if_needed`], and each of them keeps every
//! half-constructed object reachable from a root first.

use crate::vm::Vm;
use log::debug;
use vlox_core::Value;

impl Vm {
    /// Collects when the allocation budget is spent (or always, in
    /// stress mode). Call before allocating at any runtime point.
    #[inline]
    pub(crate) fn collect_if_needed(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Runs one full mark-sweep cycle.
    pub fn collect_garbage(&mut self) {
        let before = self.heap.bytes_allocated();
        debug!("-- gc begin ({before} bytes allocated)");

        self.mark_roots();
        self.trace_references();
        // Weak intern set: unmarked strings leave the set now so the
        // sweep can free them.
        self.strings.remove_unmarked(&self.heap);
        let freed = self.heap.sweep();
        self.heap.rearm_gc_trigger();

        debug!(
            "-- gc end: freed {freed} objects, {before} -> {} bytes",
            self.heap.bytes_allocated()
        );
    }

    fn mark_roots(&mut self) {
        let mut gray = std::mem::take(&mut self.gray);
        gray.clear();

        for index in 0..self.stack.len() {
            if let Value::Obj(r) = self.stack[index] {
                if self.heap.mark(r) {
                    gray.push(r);
                }
            }
        }

        for index in 0..self.frames.len() {
            let closure = self.frames[index].closure;
            if self.heap.mark(closure) {
                gray.push(closure);
            }
        }

        let mut open = self.open_upvalues;
        while let Some(r) = open {
            if self.heap.mark(r) {
                gray.push(r);
            }
            open = self.heap.upvalue(r).next_open;
        }

        for (key, value) in self.globals.iter() {
            if self.heap.mark(key.obj) {
                gray.push(key.obj);
            }
            if let Value::Obj(r) = value {
                if self.heap.mark(r) {
                    gray.push(r);
                }
            }
        }

        if self.heap.mark(self.init_string) {
            gray.push(self.init_string);
        }

        self.gray = gray;
    }

    /// Drains the gray stack, blackening each object by marking its
    /// children.
    fn trace_references(&mut self) {
        let mut gray = std::mem::take(&mut self.gray);
        let mut children = Vec::new();

        while let Some(r) = gray.pop() {
            children.clear();
            self.heap.push_children(r, &mut children);
            for &child in &children {
                if self.heap.mark(child) {
                    gray.push(child);
                }
            }
        }

        self.gray = gray;
    }
}
