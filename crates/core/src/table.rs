//! TableGraph: the backing store of a table-typed ValueCell
//!
//! A table is an ordered sequence of `(key, value)` pairs. Insertion order is
//! kept because the stack and wire codecs replay it; the JSON codec only
//! cares about it for arrays.
//!
//! # Lifecycle
//!
//! ```text
//! TableBuilder::with_capacity(n)   graph allocated, empty, not sealed
//!        │  graph() / downgrade()  identity handed to trackers and back-refs
//!        │  push(k, v) × n         pairs collected off to the side
//!        ▼
//! TableBuilder::finish()           pairs published, graph immutable
//! ```
//!
//! The graph `Arc` exists before its pairs do so that a child can hold a
//! `TableRef` back to its parent while the parent is still being populated.
//! Once sealed, the pairs are never touched again and the graph can be read
//! from any thread.

use crate::value::ValueCell;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// One `(key, value)` entry of a table
pub type TablePair = (ValueCell, ValueCell);

/// Ordered key/value pairs of one scripting table
#[derive(Default)]
pub struct TableGraph {
    pairs: OnceLock<Box<[TablePair]>>,
}

impl TableGraph {
    /// Build a sealed graph from already-collected pairs
    pub fn from_pairs(pairs: Vec<TablePair>) -> Arc<TableGraph> {
        let graph = TableGraph::default();
        let _ = graph.pairs.set(pairs.into_boxed_slice());
        Arc::new(graph)
    }

    /// All pairs in insertion order (empty while the graph is being populated)
    pub fn pairs(&self) -> &[TablePair] {
        self.pairs.get().map(|p| &p[..]).unwrap_or(&[])
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }

    /// Whether population has finished
    pub fn is_sealed(&self) -> bool {
        self.pairs.get().is_some()
    }

    /// Look up the value stored under `key` (flat key equality)
    pub fn get(&self, key: &ValueCell) -> Option<&ValueCell> {
        self.pairs()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Iterate over the pairs
    pub fn iter(&self) -> impl Iterator<Item = &TablePair> {
        self.pairs().iter()
    }
}

impl fmt::Debug for TableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_sealed() {
            return write!(f, "TableGraph(<populating>)");
        }
        f.debug_map()
            .entries(self.pairs().iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// Identity of a table for the duration of one pass
///
/// Two ValueCells hold the same table exactly when their `TableId`s match.
/// The id is the address of the shared allocation, which stays reserved for
/// as long as any strong or weak handle to it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(usize);

impl TableId {
    pub fn of(graph: &Arc<TableGraph>) -> Self {
        TableId(Arc::as_ptr(graph) as usize)
    }

    pub fn of_weak(graph: &Weak<TableGraph>) -> Self {
        TableId(graph.as_ptr() as usize)
    }
}

/// Incremental population of a new TableGraph
///
/// The pair count is announced up front; pushing more pairs than reserved is
/// a logic error in the caller. Children that point back at the table under
/// construction must use [`TableBuilder::downgrade`], never a clone of
/// [`TableBuilder::graph`], or the graph would own itself.
pub struct TableBuilder {
    graph: Arc<TableGraph>,
    pairs: Vec<TablePair>,
    reserved: usize,
}

impl TableBuilder {
    /// Allocate a new, unsealed graph with room for `capacity` pairs
    pub fn with_capacity(capacity: usize) -> Self {
        TableBuilder {
            graph: Arc::new(TableGraph::default()),
            pairs: Vec::with_capacity(capacity),
            reserved: capacity,
        }
    }

    /// The graph being built; register it with a tracker before pushing children
    pub fn graph(&self) -> &Arc<TableGraph> {
        &self.graph
    }

    /// Back-reference to the graph being built
    pub fn downgrade(&self) -> Weak<TableGraph> {
        Arc::downgrade(&self.graph)
    }

    pub fn push(&mut self, key: ValueCell, value: ValueCell) {
        debug_assert!(
            self.pairs.len() < self.reserved,
            "TableBuilder: pushed past the reserved pair count ({})",
            self.reserved
        );
        self.pairs.push((key, value));
    }

    /// Pairs pushed so far
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Seal the graph and return it
    pub fn finish(self) -> Arc<TableGraph> {
        let sealed = self.graph.pairs.set(self.pairs.into_boxed_slice()).is_ok();
        debug_assert!(sealed, "TableBuilder: graph sealed twice");
        self.graph
    }
}
