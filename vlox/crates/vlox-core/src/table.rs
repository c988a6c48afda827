//! Open-addressing hash table keyed by interned-string identity.
//!
//! Used for globals, instance fields, class method tables, and the
//! string intern set. Keys are interned strings, so a probe compares
//! object identity only; the byte-comparing lookup
//! [`Table::find_string`] exists solely for interning, where the string
//! being looked up does not have an object yet.
//!
//! The backing array length is always a power of two (8 on first
//! growth), kept at or below a 0.75 load factor. Deleted slots become
//! tombstones (`key = None, value = false`) so probe chains stay intact;
//! an empty slot (`key = None, value = nil`) terminates a probe.

use crate::heap::Heap;
use crate::object::ObjRef;
use crate::value::Value;

/// A table key: an interned string's reference plus its precomputed
/// hash, carried together so the table never needs heap access.
#[derive(Clone, Copy, Debug)]
pub struct StringKey {
    pub obj: ObjRef,
    pub hash: u32,
}

/// One slot of the backing array.
#[derive(Clone, Copy, Debug)]
struct Entry {
    key: Option<StringKey>,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        value: Value::Nil,
    };

    #[inline]
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && self.value == Value::Bool(false)
    }
}

/// The open-addressing hash table.
///
/// # Example
///
/// ```
/// use vlox_core::{GcConfig, Heap, Strings, Table, Value};
///
/// let mut heap = Heap::new(GcConfig::default());
/// let mut strings = Strings::new();
/// let name = strings.intern(&mut heap, "answer");
/// let key = heap.string_key(name);
///
/// let mut table = Table::new();
/// assert!(table.set(key, Value::Number(42.0)));
/// assert_eq!(table.get(key), Some(Value::Number(42.0)));
/// assert!(table.delete(key));
/// assert_eq!(table.get(key), None);
/// ```
#[derive(Debug)]
pub struct Table {
    /// Live entries plus tombstones. Governs the load factor so probe
    /// chains cannot fill the array.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    /// Creates an empty table. No backing array is allocated until the
    /// first insert.
    pub fn new() -> Self {
        Table {
            count: 0,
            entries: Vec::new(),
        }
    }

    /// Inserts or updates a binding. Returns true if the key was not
    /// present before.
    pub fn set(&mut self, key: StringKey, value: Value) -> bool {
        if (self.count + 1) * 4 > self.entries.len() * 3 {
            let capacity = grow_capacity(self.entries.len());
            self.adjust_capacity(capacity);
        }

        let index = find_slot(&self.entries, key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none() && entry.value == Value::Nil;
        if is_new {
            self.count += 1;
        }

        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Looks up a binding by key identity.
    pub fn get(&self, key: StringKey) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }

        let entry = &self.entries[find_slot(&self.entries, key)];
        entry.key.map(|_| entry.value)
    }

    /// Removes a binding, leaving a tombstone. Returns true if a key was
    /// actually removed.
    pub fn delete(&mut self, key: StringKey) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        let index = find_slot(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }

        entry.key = None;
        entry.value = Value::Bool(false);
        true
    }

    /// Copies every live binding from `other` into `self`.
    pub fn add_all(&mut self, other: &Table) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// Walks the probe chain for a string that may not be interned yet,
    /// comparing hash and then bytes. Only the intern set uses this.
    pub fn find_string(&self, heap: &Heap, text: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }

        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    // A truly empty slot ends the chain; tombstones are
                    // skipped.
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    if key.hash == hash && heap.string(key.obj).text == text {
                        return Some(key.obj);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Iterates the live bindings.
    pub fn iter(&self) -> impl Iterator<Item = (StringKey, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.map(|key| (key, entry.value)))
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True if no live bindings exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tombstones every binding whose key fails `is_marked`. Runs during
    /// the GC pause, before the sweep, so the intern set cannot keep
    /// dead strings alive.
    pub fn remove_unmarked(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for index in 0..self.entries.len() {
            if let Some(key) = self.entries[index].key {
                if !is_marked(key.obj) {
                    self.entries[index].key = None;
                    self.entries[index].value = Value::Bool(false);
                }
            }
        }
    }

    /// Rebuilds the backing array at `capacity`, re-inserting live
    /// entries and dropping tombstones.
    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; capacity]);
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = find_slot(&self.entries, key);
                self.entries[index] = entry;
                self.count += 1;
            }
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 {
        8
    } else {
        capacity * 2
    }
}

/// Linear probe from `hash & (len - 1)`. Returns the slot holding `key`,
/// or the first reusable slot: the first tombstone seen if any, else the
/// terminating empty slot. `entries` must be non-empty.
fn find_slot(entries: &[Entry], key: StringKey) -> usize {
    let mask = entries.len() - 1;
    let mut index = key.hash as usize & mask;
    let mut tombstone: Option<usize> = None;

    loop {
        let entry = &entries[index];
        match entry.key {
            None => {
                if entry.is_tombstone() {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                } else {
                    return tombstone.unwrap_or(index);
                }
            }
            Some(existing) => {
                if existing.obj == key.obj {
                    return index;
                }
            }
        }
        index = (index + 1) & mask;
    }
}
