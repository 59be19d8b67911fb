//! ValueCell: one dynamically-typed scripting value
//!
//! A closed tagged union over everything the scripting language can hand to
//! the interchange engine. Leaf values are stored inline; tables live behind
//! an `Arc` so that one logical table referenced from several places is one
//! allocation.
//!
//! # Tables and back-references
//!
//! `Table` owns (shares) its graph. `TableRef` is a `Weak` handle used for
//! every encounter of a table after the first one within a single read pass,
//! which is also how a table refers to itself without creating an `Arc`
//! cycle.
//!
//! ```text
//! list: [ Table(t) , TableRef(t) ]
//!            │            ┆
//!            ▼            ┆ weak
//!        TableGraph t ◄┄┄┄┘
//! ```

use crate::table::{TableBuilder, TableGraph, TableId, TablePair};
use std::fmt;
use std::sync::{Arc, Weak};

/// Opaque id of an object owned by the external registry
pub type RefId = u64;

/// One scripting value
#[derive(Debug, Clone, Default)]
pub enum ValueCell {
    #[default]
    Nil,

    Bool(bool),

    /// The scripting language's single numeric type
    Number(f64),

    /// Raw bytes; not required to be UTF-8
    String(Vec<u8>),

    /// Id resolved by an external registry (entities, resources, timers)
    ExternalRef(RefId),

    /// A table, shared by every cell that holds the same `Arc`
    Table(Arc<TableGraph>),

    /// Back-reference to a table owned elsewhere in the same value tree
    TableRef(Weak<TableGraph>),
}

impl ValueCell {
    /// Build a string cell from anything byte-like
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        ValueCell::String(bytes.into())
    }

    /// Build a table from pairs in insertion order
    pub fn table(pairs: Vec<TablePair>) -> Self {
        ValueCell::Table(TableGraph::from_pairs(pairs))
    }

    /// Build a sequence table keyed `1..=n`
    pub fn array(values: Vec<ValueCell>) -> Self {
        let mut builder = TableBuilder::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            builder.push(ValueCell::Number((i + 1) as f64), value);
        }
        ValueCell::Table(builder.finish())
    }

    /// Weak back-reference to `graph`
    pub fn back_ref(graph: &Arc<TableGraph>) -> Self {
        ValueCell::TableRef(Arc::downgrade(graph))
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueCell::Nil => "nil",
            ValueCell::Bool(_) => "boolean",
            ValueCell::Number(_) => "number",
            ValueCell::String(_) => "string",
            ValueCell::ExternalRef(_) => "reference",
            ValueCell::Table(_) => "table",
            ValueCell::TableRef(_) => "table reference",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ValueCell::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ValueCell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ValueCell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ValueCell::String(s) => Some(s),
            _ => None,
        }
    }

    /// String contents when they are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_external_ref(&self) -> Option<RefId> {
        match self {
            ValueCell::ExternalRef(id) => Some(*id),
            _ => None,
        }
    }

    /// The table behind a `Table` or a live `TableRef`
    pub fn as_table(&self) -> Option<Arc<TableGraph>> {
        match self {
            ValueCell::Table(graph) => Some(Arc::clone(graph)),
            ValueCell::TableRef(graph) => graph.upgrade(),
            _ => None,
        }
    }

    /// Identity of the referenced table, live or not
    pub fn table_id(&self) -> Option<TableId> {
        match self {
            ValueCell::Table(graph) => Some(TableId::of(graph)),
            ValueCell::TableRef(graph) => Some(TableId::of_weak(graph)),
            _ => None,
        }
    }
}

impl From<bool> for ValueCell {
    fn from(b: bool) -> Self {
        ValueCell::Bool(b)
    }
}

impl From<f64> for ValueCell {
    fn from(n: f64) -> Self {
        ValueCell::Number(n)
    }
}

impl From<i32> for ValueCell {
    fn from(n: i32) -> Self {
        ValueCell::Number(n as f64)
    }
}

impl From<&str> for ValueCell {
    fn from(s: &str) -> Self {
        ValueCell::String(s.as_bytes().to_vec())
    }
}

impl From<String> for ValueCell {
    fn from(s: String) -> Self {
        ValueCell::String(s.into_bytes())
    }
}

impl From<Arc<TableGraph>> for ValueCell {
    fn from(graph: Arc<TableGraph>) -> Self {
        ValueCell::Table(graph)
    }
}

impl fmt::Display for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueCell::Nil => write!(f, "nil"),
            ValueCell::Bool(b) => write!(f, "{}", b),
            ValueCell::Number(n) => write!(f, "{}", n),
            ValueCell::String(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            ValueCell::ExternalRef(id) => write!(f, "ref:{}", id),
            ValueCell::Table(graph) => {
                if graph.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{")?;
                for (i, (k, v)) in graph.pairs().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {} = {}", k, v)?;
                }
                write!(f, " }}")
            }
            ValueCell::TableRef(_) => write!(f, "<table>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_keys_start_at_one() {
        let cell = ValueCell::array(vec![ValueCell::from("a"), ValueCell::from("b")]);
        let graph = cell.as_table().unwrap();
        assert_eq!(graph.pairs()[0].0, ValueCell::Number(1.0));
        assert_eq!(graph.pairs()[1].0, ValueCell::Number(2.0));
    }

    #[test]
    fn test_as_table_follows_live_back_reference() {
        let cell = ValueCell::array(vec![]);
        let graph = cell.as_table().unwrap();
        let back = ValueCell::back_ref(&graph);
        assert!(Arc::ptr_eq(&back.as_table().unwrap(), &graph));
        assert_eq!(back.table_id(), cell.table_id());
    }

    #[test]
    fn test_dangling_back_reference() {
        let back = {
            let graph = TableGraph::from_pairs(vec![]);
            ValueCell::back_ref(&graph)
        };
        assert!(back.as_table().is_none());
        assert!(back.table_id().is_some());
    }

    #[test]
    fn test_string_accessors() {
        let utf8 = ValueCell::from("héllo");
        assert_eq!(utf8.as_str(), Some("héllo"));

        let raw = ValueCell::string(vec![0xff, 0x00, 0x41]);
        assert_eq!(raw.as_bytes(), Some(&[0xff, 0x00, 0x41][..]));
        assert_eq!(raw.as_str(), None);
    }

    #[test]
    fn test_scalar_accessors() {
        assert_eq!(ValueCell::Bool(false).as_bool(), Some(false));
        assert_eq!(ValueCell::Nil.as_bool(), None);
        assert_eq!(ValueCell::ExternalRef(17).as_external_ref(), Some(17));
        assert_eq!(ValueCell::Number(17.0).as_external_ref(), None);
    }

    #[test]
    fn test_display() {
        let cell = ValueCell::table(vec![
            (ValueCell::from("x"), ValueCell::Number(1.5)),
            (ValueCell::Number(2.0), ValueCell::ExternalRef(7)),
        ]);
        assert_eq!(cell.to_string(), "{ \"x\" = 1.5, 2 = ref:7 }");
        assert_eq!(ValueCell::Nil.to_string(), "nil");
        assert_eq!(ValueCell::array(vec![]).to_string(), "{}");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ValueCell::Nil.type_name(), "nil");
        assert_eq!(ValueCell::ExternalRef(1).type_name(), "reference");
        assert_eq!(ValueCell::array(vec![]).type_name(), "table");
    }
}
