//! The object heap: an arena that owns every runtime object.
//!
//! Objects live in a slot vector with a free list, so an [`ObjRef`] is a
//! stable index for the whole life of its object. All objects are
//! additionally threaded onto one intrusive list (`Obj::next`) rooted at
//! the heap head; the sweep phase walks that list, unlinks whatever the
//! mark phase did not reach, and returns the slots to the free list.
//!
//! The heap also keeps the allocation budget driving collection: every
//! allocation charges a fixed per-object cost against `bytes_allocated`,
//! and once the `next_gc` threshold is crossed the owner is expected to
//! run a collection before allocating again. The marking and root
//! walking themselves live with the VM, which knows where the roots are.

use crate::object::{Obj, ObjKind, ObjRef, UpvalueState};
use crate::table::StringKey;
use crate::value::{format_number, Value};
use crate::StringObj;
use log::trace;

/// Tuning knobs for the collector.
///
/// # Example
///
/// ```
/// use vlox_core::GcConfig;
///
/// // Collect before every allocation, for shaking out missing roots.
/// let config = GcConfig {
///     stress: true,
///     ..GcConfig::default()
/// };
/// assert_eq!(config.growth_factor, 2);
/// ```
#[derive(Clone, Debug)]
pub struct GcConfig {
    /// Allocation budget before the first collection, in bytes.
    pub first_threshold: usize,
    /// After a collection the next threshold is the surviving byte count
    /// times this factor.
    pub growth_factor: usize,
    /// Force a collection before every allocation. Slow; test-only.
    pub stress: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            first_threshold: 1024 * 1024,
            growth_factor: 2,
            stress: false,
        }
    }
}

/// Per-object cost charged against the allocation budget.
const OBJ_SIZE: usize = std::mem::size_of::<Obj>();

/// The arena owning every heap object.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Option<Obj>>,
    free: Vec<u32>,
    /// Head of the intrusive all-objects list.
    head: Option<ObjRef>,
    bytes_allocated: usize,
    next_gc: usize,
    config: GcConfig,
}

impl Heap {
    /// Creates an empty heap with the given collector configuration.
    pub fn new(config: GcConfig) -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            next_gc: config.first_threshold,
            bytes_allocated: 0,
            config,
        }
    }

    /// Allocates a new object and links it onto the all-objects list.
    ///
    /// Does not collect; callers at runtime allocation points check
    /// [`Heap::should_collect`] first, while the partially built object
    /// graph is still rooted.
    pub fn allocate(&mut self, kind: ObjKind) -> ObjRef {
        let obj = Obj {
            marked: false,
            next: self.head,
            kind,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(obj);
                index
            }
            None => {
                self.slots.push(Some(obj));
                (self.slots.len() - 1) as u32
            }
        };

        let r = ObjRef(index);
        self.head = Some(r);
        self.bytes_allocated += OBJ_SIZE;
        trace!(
            "allocate {:?} ({}), {} bytes live",
            r,
            self.obj(r).kind.name(),
            self.bytes_allocated
        );
        r
    }

    /// True when the allocation budget is spent (or stress mode is on)
    /// and a collection should run before the next allocation.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.config.stress || self.bytes_allocated > self.next_gc
    }

    /// Rearms the trigger after a collection: the next threshold is the
    /// surviving volume times the growth factor.
    pub fn rearm_gc_trigger(&mut self) {
        self.next_gc = self.bytes_allocated * self.config.growth_factor;
    }

    /// Bytes currently charged against the budget.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// The object behind `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r` names a freed slot; references reachable from the
    /// roots are never freed, so this indicates a collector bug.
    #[inline]
    pub fn obj(&self, r: ObjRef) -> &Obj {
        match &self.slots[r.0 as usize] {
            Some(obj) => obj,
            None => panic!("use of freed object {r:?}"),
        }
    }

    /// Mutable access to the object behind `r`.
    #[inline]
    pub fn obj_mut(&mut self, r: ObjRef) -> &mut Obj {
        match &mut self.slots[r.0 as usize] {
            Some(obj) => obj,
            None => panic!("use of freed object {r:?}"),
        }
    }

    /// The string payload of `r`. Panics on kind confusion, which the
    /// compiler's emission rules rule out for well-formed bytecode.
    pub fn string(&self, r: ObjRef) -> &crate::object::StringObj {
        match &self.obj(r).kind {
            ObjKind::String(s) => s,
            other => panic!("expected string, found {}", other.name()),
        }
    }

    /// The string contents of `r`.
    pub fn string_text(&self, r: ObjRef) -> &str {
        &self.string(r).text
    }

    /// The table key for an interned string: reference plus hash.
    pub fn string_key(&self, r: ObjRef) -> StringKey {
        StringKey {
            obj: r,
            hash: self.string(r).hash,
        }
    }

    pub fn function(&self, r: ObjRef) -> &crate::object::FunctionObj {
        match &self.obj(r).kind {
            ObjKind::Function(f) => f,
            other => panic!("expected function, found {}", other.name()),
        }
    }

    pub fn function_mut(&mut self, r: ObjRef) -> &mut crate::object::FunctionObj {
        match &mut self.obj_mut(r).kind {
            ObjKind::Function(f) => f,
            other => panic!("expected function, found {}", other.name()),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &crate::object::ClosureObj {
        match &self.obj(r).kind {
            ObjKind::Closure(c) => c,
            other => panic!("expected closure, found {}", other.name()),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut crate::object::ClosureObj {
        match &mut self.obj_mut(r).kind {
            ObjKind::Closure(c) => c,
            other => panic!("expected closure, found {}", other.name()),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &crate::object::UpvalueObj {
        match &self.obj(r).kind {
            ObjKind::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.name()),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut crate::object::UpvalueObj {
        match &mut self.obj_mut(r).kind {
            ObjKind::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.name()),
        }
    }

    pub fn class(&self, r: ObjRef) -> &crate::object::ClassObj {
        match &self.obj(r).kind {
            ObjKind::Class(c) => c,
            other => panic!("expected class, found {}", other.name()),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut crate::object::ClassObj {
        match &mut self.obj_mut(r).kind {
            ObjKind::Class(c) => c,
            other => panic!("expected class, found {}", other.name()),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &crate::object::InstanceObj {
        match &self.obj(r).kind {
            ObjKind::Instance(i) => i,
            other => panic!("expected instance, found {}", other.name()),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut crate::object::InstanceObj {
        match &mut self.obj_mut(r).kind {
            ObjKind::Instance(i) => i,
            other => panic!("expected instance, found {}", other.name()),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &crate::object::BoundMethodObj {
        match &self.obj(r).kind {
            ObjKind::BoundMethod(b) => b,
            other => panic!("expected bound method, found {}", other.name()),
        }
    }

    /// Interns `text` directly against a [`crate::Strings`] set owned by
    /// the caller; exposed through [`crate::Strings::intern`].
    pub(crate) fn allocate_string(&mut self, text: String, hash: u32) -> ObjRef {
        self.allocate(ObjKind::String(StringObj { text, hash }))
    }

    // ------------------------------------------------------------------
    // Marking support
    // ------------------------------------------------------------------

    /// Marks `r` if it was unmarked; returns true if this call marked
    /// it (the caller then queues it for blackening).
    pub fn mark(&mut self, r: ObjRef) -> bool {
        let obj = self.obj_mut(r);
        if obj.marked {
            return false;
        }
        obj.marked = true;
        true
    }

    /// Whether `r` is currently marked.
    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.obj(r).marked
    }

    /// Appends every object directly referenced by `r` to `out`: the
    /// blacken step of the mark phase.
    ///
    /// Open upvalues contribute nothing here; the stack slot they watch
    /// is already a root.
    pub fn push_children(&self, r: ObjRef, out: &mut Vec<ObjRef>) {
        fn push_value(out: &mut Vec<ObjRef>, value: Value) {
            if let Value::Obj(r) = value {
                out.push(r);
            }
        }

        match &self.obj(r).kind {
            ObjKind::String(_) | ObjKind::Native(_) => {}
            ObjKind::Upvalue(upvalue) => {
                if let UpvalueState::Closed(value) = upvalue.state {
                    push_value(out, value);
                }
            }
            ObjKind::Function(function) => {
                if let Some(name) = function.name {
                    out.push(name);
                }
                for &constant in function.chunk.constants() {
                    push_value(out, constant);
                }
            }
            ObjKind::Closure(closure) => {
                out.push(closure.function);
                out.extend_from_slice(&closure.upvalues);
            }
            ObjKind::Class(class) => {
                out.push(class.name);
                for (key, value) in class.methods.iter() {
                    out.push(key.obj);
                    push_value(out, value);
                }
            }
            ObjKind::Instance(instance) => {
                out.push(instance.class);
                for (key, value) in instance.fields.iter() {
                    out.push(key.obj);
                    push_value(out, value);
                }
            }
            ObjKind::BoundMethod(bound) => {
                push_value(out, bound.receiver);
                out.push(bound.method);
            }
        }
    }

    /// Sweeps the all-objects list: frees every unmarked object, clears
    /// the mark on every survivor. Returns the number of objects freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0usize;
        let mut previous: Option<ObjRef> = None;
        let mut current = self.head;

        while let Some(r) = current {
            if self.obj(r).marked {
                self.obj_mut(r).marked = false;
                previous = Some(r);
                current = self.obj(r).next;
            } else {
                let next = self.obj(r).next;
                match previous {
                    Some(p) => self.obj_mut(p).next = next,
                    None => self.head = next,
                }
                self.release(r);
                freed += 1;
                current = next;
            }
        }
        freed
    }

    fn release(&mut self, r: ObjRef) {
        let index = r.0 as usize;
        if let Some(obj) = self.slots[index].take() {
            trace!("free {:?} ({})", r, obj.kind.name());
            self.bytes_allocated = self.bytes_allocated.saturating_sub(OBJ_SIZE);
            self.free.push(r.0);
        }
    }

    // ------------------------------------------------------------------
    // Printing
    // ------------------------------------------------------------------

    /// The printed form of a value, exactly as `print` shows it.
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(r) => self.format_object(r),
        }
    }

    fn format_object(&self, r: ObjRef) -> String {
        match &self.obj(r).kind {
            ObjKind::String(s) => s.text.clone(),
            ObjKind::Function(f) => self.format_function(f.name),
            ObjKind::Closure(c) => self.format_function(self.function(c.function).name),
            ObjKind::Upvalue(_) => "upvalue".to_string(),
            ObjKind::Class(c) => self.string_text(c.name).to_string(),
            ObjKind::Instance(i) => {
                format!("{} instance", self.string_text(self.class(i.class).name))
            }
            ObjKind::BoundMethod(b) => {
                self.format_function(self.function(self.closure(b.method).function).name)
            }
            ObjKind::Native(_) => "<native fn>".to_string(),
        }
    }

    fn format_function(&self, name: Option<ObjRef>) -> String {
        match name {
            Some(name) => format!("<fn {}>", self.string_text(name)),
            None => "<script>".to_string(),
        }
    }
}
