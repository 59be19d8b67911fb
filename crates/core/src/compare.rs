//! Equality, structural equivalence and deep copy of ValueCells
//!
//! Three different notions of "the same value" are needed:
//!
//! - `==` is flat. Leaves compare by value (IEEE754 for numbers, so
//!   `NaN != NaN`), tables compare by identity only. Two distinct tables are
//!   never equal, whatever they contain.
//! - [`ValueCell::equivalent`] walks tables pair by pair and requires the
//!   aliasing structure to match: wherever the left side reuses a table, the
//!   right side must reuse its counterpart. This is what a codec round trip
//!   is expected to preserve.
//! - [`ValueCell::deep_copy`] produces fresh tables with the same aliasing
//!   structure as the source.

use crate::list::ValueList;
use crate::table::{TableBuilder, TableGraph, TableId};
use crate::tracker::ReferenceTracker;
use crate::value::ValueCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

impl PartialEq for ValueCell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueCell::Nil, ValueCell::Nil) => true,
            (ValueCell::Bool(a), ValueCell::Bool(b)) => a == b,
            (ValueCell::Number(a), ValueCell::Number(b)) => a == b,
            (ValueCell::String(a), ValueCell::String(b)) => a == b,
            (ValueCell::ExternalRef(a), ValueCell::ExternalRef(b)) => a == b,
            (ValueCell::Table(a), ValueCell::Table(b)) => Arc::ptr_eq(a, b),
            // Tables only ever match by identity, so a back-reference matches
            // exactly when it points at the same graph.
            (ValueCell::TableRef(a), ValueCell::TableRef(b)) => Weak::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Left/right table correspondence recorded during one equivalence check
#[derive(Default)]
struct Correspondence {
    left_to_right: HashMap<TableId, TableId>,
    right_to_left: HashMap<TableId, TableId>,
}

impl Correspondence {
    fn cells(&mut self, left: &ValueCell, right: &ValueCell) -> bool {
        match (left, right) {
            (
                ValueCell::Table(_) | ValueCell::TableRef(_),
                ValueCell::Table(_) | ValueCell::TableRef(_),
            ) => match (left.as_table(), right.as_table()) {
                (Some(l), Some(r)) => self.tables(&l, &r),
                _ => false,
            },
            _ => left == right,
        }
    }

    fn tables(&mut self, left: &Arc<TableGraph>, right: &Arc<TableGraph>) -> bool {
        let (l, r) = (TableId::of(left), TableId::of(right));
        match (self.left_to_right.get(&l), self.right_to_left.get(&r)) {
            (Some(&seen_r), Some(&seen_l)) => seen_r == r && seen_l == l,
            (None, None) => {
                self.left_to_right.insert(l, r);
                self.right_to_left.insert(r, l);
                left.len() == right.len()
                    && left
                        .pairs()
                        .iter()
                        .zip(right.pairs())
                        .all(|((lk, lv), (rk, rv))| self.cells(lk, rk) && self.cells(lv, rv))
            }
            // One side has seen its table before, the other has not: the
            // aliasing structure differs.
            _ => false,
        }
    }
}

/// Copy-time map from source table to its copy
type CopyTracker = ReferenceTracker<TableId, Arc<TableGraph>>;

fn copy_cell(cell: &ValueCell, tracker: &mut CopyTracker) -> ValueCell {
    match cell {
        ValueCell::Table(graph) => copy_table(graph, tracker),
        ValueCell::TableRef(weak) => match weak.upgrade() {
            Some(graph) => copy_table(&graph, tracker),
            None => ValueCell::Nil,
        },
        leaf => leaf.clone(),
    }
}

fn copy_table(source: &Arc<TableGraph>, tracker: &mut CopyTracker) -> ValueCell {
    let id = TableId::of(source);
    if let Some(copy) = tracker.lookup(&id) {
        return ValueCell::back_ref(copy);
    }

    let mut builder = TableBuilder::with_capacity(source.len());
    tracker.remember(id, Arc::clone(builder.graph()));
    for (key, value) in source.pairs() {
        let key = copy_cell(key, tracker);
        let value = copy_cell(value, tracker);
        builder.push(key, value);
    }
    ValueCell::Table(builder.finish())
}

impl ValueCell {
    /// Structural comparison that also requires matching aliasing
    pub fn equivalent(&self, other: &ValueCell) -> bool {
        Correspondence::default().cells(self, other)
    }

    /// Copy with fresh tables, preserving which positions share a table
    ///
    /// A back-reference to a table that the copy has not produced yet is
    /// copied as the table itself; a dangling back-reference becomes `Nil`.
    pub fn deep_copy(&self) -> ValueCell {
        copy_cell(self, &mut CopyTracker::new())
    }
}

impl ValueList {
    /// Element-wise [`ValueCell::equivalent`] sharing one correspondence
    pub fn equivalent(&self, other: &ValueList) -> bool {
        let mut correspondence = Correspondence::default();
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(l, r)| correspondence.cells(l, r))
    }

    /// Element-wise [`ValueCell::deep_copy`] sharing one copy pass
    pub fn deep_copy(&self) -> ValueList {
        let mut tracker = CopyTracker::new();
        self.iter().map(|cell| copy_cell(cell, &mut tracker)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> ValueCell {
        ValueCell::table(vec![
            (ValueCell::from("x"), ValueCell::Number(x)),
            (ValueCell::from("y"), ValueCell::Number(y)),
        ])
    }

    #[test]
    fn test_leaf_equality() {
        assert_eq!(ValueCell::Nil, ValueCell::Nil);
        assert_eq!(ValueCell::Number(1.0), ValueCell::Number(1.0));
        assert_ne!(ValueCell::Number(f64::NAN), ValueCell::Number(f64::NAN));
        assert_eq!(ValueCell::from("a"), ValueCell::string(b"a".to_vec()));
        assert_ne!(ValueCell::ExternalRef(1), ValueCell::ExternalRef(2));
        assert_ne!(ValueCell::Number(0.0), ValueCell::Bool(false));
    }

    #[test]
    fn test_tables_compare_by_identity() {
        let a = point(1.0, 2.0);
        let b = point(1.0, 2.0);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_back_references_compare_by_target() {
        let t = point(1.0, 2.0);
        let graph = t.as_table().unwrap();
        assert_eq!(ValueCell::back_ref(&graph), ValueCell::back_ref(&graph));

        let other = point(1.0, 2.0).as_table().unwrap();
        assert_ne!(ValueCell::back_ref(&graph), ValueCell::back_ref(&other));
        assert_ne!(t, ValueCell::back_ref(&graph));
    }

    #[test]
    fn test_equivalent_ignores_identity() {
        assert!(point(1.0, 2.0).equivalent(&point(1.0, 2.0)));
        assert!(!point(1.0, 2.0).equivalent(&point(1.0, 3.0)));
    }

    #[test]
    fn test_equivalent_requires_same_aliasing() {
        let shared = point(0.0, 0.0);
        let aliased: ValueList = vec![shared.clone(), shared.clone()].into();
        let distinct: ValueList = vec![point(0.0, 0.0), point(0.0, 0.0)].into();

        assert!(aliased.equivalent(&aliased.deep_copy()));
        assert!(!aliased.equivalent(&distinct));
        assert!(!distinct.equivalent(&aliased));
    }

    #[test]
    fn test_equivalent_treats_table_and_back_ref_alike() {
        let shared = point(3.0, 4.0);
        let graph = shared.as_table().unwrap();
        let with_ref: ValueList = vec![shared.clone(), ValueCell::back_ref(&graph)].into();
        let with_tables: ValueList = vec![shared.clone(), shared].into();
        assert!(with_ref.equivalent(&with_tables));
    }

    #[test]
    fn test_deep_copy_preserves_aliasing() {
        let shared = point(1.0, 1.0);
        let outer = ValueCell::table(vec![
            (ValueCell::from("a"), shared.clone()),
            (ValueCell::from("b"), shared.clone()),
        ]);

        let copy = outer.deep_copy();
        assert_ne!(copy, outer);
        assert!(copy.equivalent(&outer));

        let graph = copy.as_table().unwrap();
        let a = graph.get(&ValueCell::from("a")).unwrap().as_table().unwrap();
        let b = graph.get(&ValueCell::from("b")).unwrap().as_table().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &shared.as_table().unwrap()));
    }

    #[test]
    fn test_deep_copy_self_reference() {
        let mut builder = TableBuilder::with_capacity(1);
        let back = builder.downgrade();
        builder.push(ValueCell::from("me"), ValueCell::TableRef(back));
        let original = ValueCell::Table(builder.finish());

        let copy = original.deep_copy();
        let graph = copy.as_table().unwrap();
        let inner = graph.get(&ValueCell::from("me")).unwrap().as_table().unwrap();
        assert!(Arc::ptr_eq(&inner, &graph));
        assert!(copy.equivalent(&original));
    }

    #[test]
    fn test_deep_copy_dangling_ref_is_nil() {
        let dangling = {
            let graph = TableGraph::from_pairs(vec![]);
            ValueCell::back_ref(&graph)
        };
        assert!(dangling.deep_copy().is_nil());
    }
}
