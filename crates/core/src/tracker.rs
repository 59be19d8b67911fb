//! ReferenceTracker: per-pass identity map
//!
//! Every read, write and copy pass owns exactly one tracker. It remembers
//! which tables the pass has already produced or emitted so that an aliased
//! table is handled once and referenced afterwards.
//!
//! | Pass | Key | Value |
//! |---|---|---|
//! | stack read | native table id | built `TableGraph` |
//! | stack write | `TableId` | native table handle |
//! | wire/JSON write | `TableId` | slot |
//! | wire/JSON read | slot | built `TableGraph` |
//! | deep copy | source `TableId` | copied `TableGraph` |
//!
//! Slots are handed out sequentially starting at the tracker's base.

use crate::table::{TableGraph, TableId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Identity map for one pass
#[derive(Debug)]
pub struct ReferenceTracker<K, V> {
    seen: HashMap<K, V>,
    base: u32,
    next_slot: u32,
}

/// Write side: table identity to assigned slot
pub type SlotTracker = ReferenceTracker<TableId, u32>;

/// Read side: slot to the graph built for it
pub type GraphTracker = ReferenceTracker<u32, Arc<TableGraph>>;

impl<K: Eq + Hash, V> ReferenceTracker<K, V> {
    /// Tracker whose first slot is 0
    pub fn new() -> Self {
        Self::with_base(0)
    }

    /// Tracker whose first slot is `base`
    pub fn with_base(base: u32) -> Self {
        ReferenceTracker {
            seen: HashMap::new(),
            base,
            next_slot: base,
        }
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.seen.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains_key(key)
    }

    /// Record `value` for `key`, returning any previous entry
    pub fn remember(&mut self, key: K, value: V) -> Option<V> {
        self.seen.insert(key, value)
    }

    /// Number of identities seen in this pass
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// First slot this tracker hands out
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Reserve the next slot number
    pub fn next_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }
}

impl<K: Eq + Hash> ReferenceTracker<K, u32> {
    /// Give `key` the next slot and return it
    pub fn assign_slot(&mut self, key: K) -> u32 {
        let slot = self.next_slot();
        self.seen.insert(key, slot);
        slot
    }
}

impl<V> ReferenceTracker<u32, V> {
    /// Store `value` under the next slot and return the slot
    pub fn register(&mut self, value: V) -> u32 {
        let slot = self.next_slot();
        self.seen.insert(slot, value);
        slot
    }
}

impl<K: Eq + Hash, V> Default for ReferenceTracker<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
