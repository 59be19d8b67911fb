//! Tagged Stack Implementation
//!
//! An in-memory interpreter stack implementing [`InterpreterStack`]. Used as
//! the host VM stand-in by tests and tools, and as the reference for what a
//! real VM binding must do.
//!
//! ## Stack Layout
//!
//! ```text
//! Stack: contiguous array of StackSlot entries
//! ┌──────────┬──────────┬──────────┬──────────┬─────────┬──────────┐
//! │   s0     │   s1     │   s2     │   s3     │  ...    │ reserved │
//! └──────────┴──────────┴──────────┴──────────┴─────────┴──────────┘
//!                                              ↑ depth   ↑ reserved
//!
//! - Grows upward, index 0 is the bottom
//! - Pushing requires depth < reserved
//! - ensure_capacity(n) raises reserved to depth + n, up to the limit
//! ```
//!
//! ## Tables
//!
//! Native tables are `Rc<RefCell<HostTable>>`: shared, mutable, and compared
//! by identity, like tables in a scripting VM. Entries keep insertion order;
//! storing nil under a key removes it, and a nil or NaN key is ignored.

use crate::stack::{InterpreterStack, StackType};
use crate::value::RefId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Hard limit on slots when none is given
pub const DEFAULT_STACK_CAPACITY: usize = 4096;

/// Slots reserved for a fresh stack before any `ensure_capacity`
pub const MIN_RESERVED_SLOTS: usize = 20;

/// Shared handle to a native table
pub type TableHandle = Rc<RefCell<HostTable>>;

/// One stack slot
#[derive(Clone)]
pub enum StackSlot {
    Nil,
    Bool(bool),
    Number(f64),
    String(Vec<u8>),
    ExternalRef(RefId),
    Table(TableHandle),
    /// Stand-ins for native types with no value representation
    Function(usize),
    Thread(usize),
    Userdata(usize),
}

impl StackSlot {
    pub fn type_of(&self) -> StackType {
        match self {
            StackSlot::Nil => StackType::Nil,
            StackSlot::Bool(_) => StackType::Bool,
            StackSlot::Number(_) => StackType::Number,
            StackSlot::String(_) => StackType::String,
            StackSlot::ExternalRef(_) => StackType::ExternalRef,
            StackSlot::Table(_) => StackType::Table,
            StackSlot::Function(_) => StackType::Function,
            StackSlot::Thread(_) => StackType::Thread,
            StackSlot::Userdata(_) => StackType::Userdata,
        }
    }

    /// Wrap a fresh table
    pub fn table(table: HostTable) -> Self {
        StackSlot::Table(Rc::new(RefCell::new(table)))
    }

    pub fn as_table(&self) -> Option<&TableHandle> {
        match self {
            StackSlot::Table(handle) => Some(handle),
            _ => None,
        }
    }

    fn is_valid_key(&self) -> bool {
        match self {
            StackSlot::Nil => false,
            StackSlot::Number(n) => !n.is_nan(),
            _ => true,
        }
    }
}

/// Raw equality: tables and opaque natives by identity
impl PartialEq for StackSlot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackSlot::Nil, StackSlot::Nil) => true,
            (StackSlot::Bool(a), StackSlot::Bool(b)) => a == b,
            (StackSlot::Number(a), StackSlot::Number(b)) => a == b,
            (StackSlot::String(a), StackSlot::String(b)) => a == b,
            (StackSlot::ExternalRef(a), StackSlot::ExternalRef(b)) => a == b,
            (StackSlot::Table(a), StackSlot::Table(b)) => Rc::ptr_eq(a, b),
            (StackSlot::Function(a), StackSlot::Function(b)) => a == b,
            (StackSlot::Thread(a), StackSlot::Thread(b)) => a == b,
            (StackSlot::Userdata(a), StackSlot::Userdata(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for StackSlot {
    fn from(b: bool) -> Self {
        StackSlot::Bool(b)
    }
}

impl From<f64> for StackSlot {
    fn from(n: f64) -> Self {
        StackSlot::Number(n)
    }
}

impl From<&str> for StackSlot {
    fn from(s: &str) -> Self {
        StackSlot::String(s.as_bytes().to_vec())
    }
}

// Tables print as addresses; a table may contain itself.
impl fmt::Debug for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackSlot::Nil => write!(f, "Nil"),
            StackSlot::Bool(b) => write!(f, "Bool({})", b),
            StackSlot::Number(n) => write!(f, "Number({})", n),
            StackSlot::String(s) => write!(f, "String({:?})", String::from_utf8_lossy(s)),
            StackSlot::ExternalRef(id) => write!(f, "ExternalRef({})", id),
            StackSlot::Table(handle) => write!(f, "Table({:p})", Rc::as_ptr(handle)),
            StackSlot::Function(id) => write!(f, "Function({})", id),
            StackSlot::Thread(id) => write!(f, "Thread({})", id),
            StackSlot::Userdata(id) => write!(f, "Userdata({})", id),
        }
    }
}

/// A native table: ordered key/value entries with unique keys
#[derive(Debug, Default, Clone)]
pub struct HostTable {
    entries: Vec<(StackSlot, StackSlot)>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HostTable {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Store `value` under `key`; nil removes the entry
    pub fn set(&mut self, key: StackSlot, value: StackSlot) {
        if !key.is_valid_key() {
            return;
        }
        let existing = self.position(&key);
        match (existing, value) {
            (Some(i), StackSlot::Nil) => {
                self.entries.remove(i);
            }
            (Some(i), value) => self.entries[i].1 = value,
            (None, StackSlot::Nil) => {}
            (None, value) => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &StackSlot) -> Option<&StackSlot> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(StackSlot, StackSlot)] {
        &self.entries
    }

    fn position(&self, key: &StackSlot) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Entry following `key` in iteration order; nil starts from the front
    fn entry_after(&self, key: &StackSlot) -> Option<&(StackSlot, StackSlot)> {
        let start = match key {
            StackSlot::Nil => 0,
            key => self.position(key)? + 1,
        };
        self.entries.get(start)
    }
}

/// In-memory interpreter stack
pub struct TaggedStack {
    slots: Vec<StackSlot>,
    /// Slots that may be occupied without another `ensure_capacity`
    reserved: usize,
    /// Most slots `ensure_capacity` will ever grant
    limit: usize,
}

impl TaggedStack {
    /// Create a stack with the default limit
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_STACK_CAPACITY)
    }

    /// Create a stack that refuses to grow beyond `limit` slots
    pub fn with_limit(limit: usize) -> Self {
        let reserved = MIN_RESERVED_SLOTS.min(limit);
        TaggedStack {
            slots: Vec::with_capacity(reserved),
            reserved,
            limit,
        }
    }

    /// Check if the stack has room for `n` more values without reserving
    #[inline]
    pub fn has_capacity(&self, n: usize) -> bool {
        self.slots.len() + n <= self.reserved
    }

    /// Grow the reservation to at least `min_reserved` slots
    ///
    /// Returns `false`, leaving the reservation unchanged, past the limit.
    pub fn grow(&mut self, min_reserved: usize) -> bool {
        if min_reserved > self.limit {
            return false;
        }
        if min_reserved > self.reserved {
            self.slots.reserve(min_reserved - self.slots.len());
            self.reserved = min_reserved;
        }
        true
    }

    /// Push a slot
    ///
    /// Panics if the space was not reserved.
    pub fn push(&mut self, slot: StackSlot) {
        assert!(
            self.has_capacity(1),
            "push: no reserved stack space (depth {}, reserved {})",
            self.slots.len(),
            self.reserved
        );
        self.slots.push(slot);
    }

    /// Pop the top slot
    ///
    /// Panics if the stack is empty.
    pub fn pop_slot(&mut self) -> StackSlot {
        match self.slots.pop() {
            Some(slot) => slot,
            None => panic!("pop: stack is empty"),
        }
    }

    pub fn slot(&self, index: usize) -> Option<&StackSlot> {
        self.slots.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots currently reserved
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    fn table_at(&self, index: usize) -> &TableHandle {
        match self.slots.get(index) {
            Some(StackSlot::Table(handle)) => handle,
            other => panic!("expected table at slot {}, found {:?}", index, other),
        }
    }
}

impl Default for TaggedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaggedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedStack")
            .field("slots", &self.slots)
            .field("reserved", &self.reserved)
            .field("limit", &self.limit)
            .finish()
    }
}

impl InterpreterStack for TaggedStack {
    type Table = TableHandle;

    fn depth(&self) -> usize {
        self.slots.len()
    }

    fn type_of(&self, index: usize) -> StackType {
        self.slots
            .get(index)
            .map(StackSlot::type_of)
            .unwrap_or(StackType::None)
    }

    fn get_bool(&self, index: usize) -> Option<bool> {
        match self.slots.get(index)? {
            StackSlot::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn get_number(&self, index: usize) -> Option<f64> {
        match self.slots.get(index)? {
            StackSlot::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn get_string(&self, index: usize) -> Option<&[u8]> {
        match self.slots.get(index)? {
            StackSlot::String(s) => Some(s),
            _ => None,
        }
    }

    fn get_external_ref(&self, index: usize) -> Option<RefId> {
        match self.slots.get(index)? {
            StackSlot::ExternalRef(id) => Some(*id),
            _ => None,
        }
    }

    fn table_id(&self, index: usize) -> Option<usize> {
        self.slots
            .get(index)?
            .as_table()
            .map(|handle| Rc::as_ptr(handle) as usize)
    }

    fn table_handle(&self, index: usize) -> Option<TableHandle> {
        self.slots.get(index)?.as_table().cloned()
    }

    fn table_size_hint(&self, index: usize) -> usize {
        self.slots
            .get(index)
            .and_then(StackSlot::as_table)
            .map(|handle| handle.borrow().len())
            .unwrap_or(0)
    }

    fn ensure_capacity(&mut self, n: usize) -> bool {
        self.grow(self.slots.len() + n)
    }

    fn push_nil(&mut self) {
        self.push(StackSlot::Nil);
    }

    fn push_bool(&mut self, value: bool) {
        self.push(StackSlot::Bool(value));
    }

    fn push_number(&mut self, value: f64) {
        self.push(StackSlot::Number(value));
    }

    fn push_string(&mut self, value: &[u8]) {
        self.push(StackSlot::String(value.to_vec()));
    }

    fn push_external_ref(&mut self, id: RefId) {
        self.push(StackSlot::ExternalRef(id));
    }

    fn new_table(&mut self, size_hint: usize) {
        self.push(StackSlot::table(HostTable::with_capacity(size_hint)));
    }

    fn push_table(&mut self, table: &TableHandle) {
        self.push(StackSlot::Table(Rc::clone(table)));
    }

    fn set_table(&mut self, index: usize) {
        let value = self.pop_slot();
        let key = self.pop_slot();
        self.table_at(index).borrow_mut().set(key, value);
    }

    fn next(&mut self, index: usize) -> bool {
        let key = self.pop_slot();
        let entry = self.table_at(index).borrow().entry_after(&key).cloned();
        match entry {
            Some((key, value)) => {
                self.push(key);
                self.push(value);
                true
            }
            None => false,
        }
    }

    fn pop(&mut self, n: usize) {
        assert!(
            n <= self.slots.len(),
            "pop: {} slots requested, depth {}",
            n,
            self.slots.len()
        );
        let depth = self.slots.len() - n;
        self.slots.truncate(depth);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_basic_operations() {
        let mut stack = TaggedStack::new();

        assert!(stack.is_empty());
        assert_eq!(stack.depth(), 0);

        stack.push_number(10.0);
        stack.push_bool(true);
        stack.push_string(b"thirty");

        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.type_of(0), StackType::Number);
        assert_eq!(stack.get_number(0), Some(10.0));
        assert_eq!(stack.get_bool(1), Some(true));
        assert_eq!(stack.get_string(2), Some(&b"thirty"[..]));
        assert_eq!(stack.get_number(2), None);
        assert_eq!(stack.type_of(3), StackType::None);

        stack.pop(3);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_reservation() {
        let mut stack = TaggedStack::with_limit(30);
        assert_eq!(stack.reserved(), MIN_RESERVED_SLOTS);
        for _ in 0..MIN_RESERVED_SLOTS {
            stack.push_nil();
        }
        assert!(!stack.has_capacity(1));
        assert!(stack.ensure_capacity(10));
        assert!(stack.has_capacity(10));
        assert!(!stack.ensure_capacity(11));
        assert_eq!(stack.reserved(), 30);
    }

    #[test]
    #[should_panic(expected = "no reserved stack space")]
    fn test_push_without_reservation_panics() {
        let mut stack = TaggedStack::with_limit(1);
        stack.push_nil();
        stack.push_nil();
    }

    #[test]
    fn test_set_table_replaces_and_removes() {
        let mut stack = TaggedStack::new();
        stack.new_table(2);

        for (k, v) in [("a", 1.0), ("b", 2.0), ("a", 3.0)] {
            stack.push_string(k.as_bytes());
            stack.push_number(v);
            stack.set_table(0);
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.table_size_hint(0), 2);

        let handle = stack.table_handle(0).unwrap();
        assert_eq!(handle.borrow().get(&"a".into()), Some(&StackSlot::Number(3.0)));

        stack.push_string(b"a");
        stack.push_nil();
        stack.set_table(0);
        assert_eq!(handle.borrow().len(), 1);
        assert_eq!(handle.borrow().entries()[0].0, StackSlot::from("b"));
    }

    #[test]
    fn test_nil_and_nan_keys_ignored() {
        let mut table = HostTable::new();
        table.set(StackSlot::Nil, StackSlot::Number(1.0));
        table.set(StackSlot::Number(f64::NAN), StackSlot::Number(1.0));
        assert!(table.is_empty());
    }

    #[test]
    fn test_next_iterates_in_order() {
        let mut table = HostTable::new();
        table.set(1.0.into(), "one".into());
        table.set("k".into(), true.into());

        let mut stack = TaggedStack::new();
        stack.push(StackSlot::table(table));
        stack.push_nil();

        let mut seen = Vec::new();
        while stack.next(0) {
            seen.push((stack.slot(1).cloned().unwrap(), stack.slot(2).cloned().unwrap()));
            stack.pop(1);
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(
            seen,
            vec![
                (StackSlot::Number(1.0), StackSlot::from("one")),
                (StackSlot::from("k"), StackSlot::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_table_identity() {
        let mut stack = TaggedStack::new();
        stack.new_table(0);
        let handle = stack.table_handle(0).unwrap();
        stack.push_table(&handle);
        stack.new_table(0);

        assert_eq!(stack.table_id(0), stack.table_id(1));
        assert_ne!(stack.table_id(0), stack.table_id(2));
        assert_eq!(stack.slot(0), stack.slot(1));
    }

    #[test]
    fn test_self_containing_table_debug() {
        let mut stack = TaggedStack::new();
        stack.new_table(1);
        let handle = stack.table_handle(0).unwrap();
        stack.push_string(b"me");
        stack.push_table(&handle);
        stack.set_table(0);

        let rendered = format!("{:?}", stack);
        assert!(rendered.contains("Table(0x"));
    }

    #[test]
    fn test_opaque_types() {
        let mut stack = TaggedStack::new();
        stack.push(StackSlot::Function(1));
        stack.push(StackSlot::Thread(2));
        stack.push(StackSlot::Userdata(3));
        assert_eq!(stack.type_of(0), StackType::Function);
        assert_eq!(stack.type_of(1), StackType::Thread);
        assert_eq!(stack.type_of(2).name(), "userdata");
    }
}
