//! ValueList: ordered list of ValueCells
//!
//! Argument lists, return lists and top-level wire/JSON messages. A list has
//! no identity of its own; codecs give each list operation one tracker so
//! that aliasing between elements is preserved.

use crate::value::ValueCell;
use std::fmt;
use std::ops::Index;

#[derive(Debug, Clone, Default)]
pub struct ValueList(Vec<ValueCell>);

impl ValueList {
    pub fn new() -> Self {
        ValueList(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ValueList(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, cell: ValueCell) {
        self.0.push(cell);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ValueCell> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValueCell> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<ValueCell> {
        self.0
    }
}

/// Flat element-wise equality (see [`ValueCell`]'s `PartialEq`)
impl PartialEq for ValueList {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<Vec<ValueCell>> for ValueList {
    fn from(cells: Vec<ValueCell>) -> Self {
        ValueList(cells)
    }
}

impl FromIterator<ValueCell> for ValueList {
    fn from_iter<I: IntoIterator<Item = ValueCell>>(iter: I) -> Self {
        ValueList(iter.into_iter().collect())
    }
}

impl IntoIterator for ValueList {
    type Item = ValueCell;
    type IntoIter = std::vec::IntoIter<ValueCell>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a ValueCell;
    type IntoIter = std::slice::Iter<'a, ValueCell>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Extend<ValueCell> for ValueList {
    fn extend<I: IntoIterator<Item = ValueCell>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl Index<usize> for ValueList {
    type Output = ValueCell;

    fn index(&self, index: usize) -> &ValueCell {
        &self.0[index]
    }
}

impl fmt::Display for ValueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, cell) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", cell)?;
        }
        write!(f, "]")
    }
}
