//! Stack codec: ValueCell ⇄ interpreter stack
//!
//! Reading walks native tables with `next` and builds a `TableGraph` per
//! native table identity; a native table reached a second time becomes a
//! `TableRef` to the graph already built for it. Writing goes the other way
//! and reuses one native table for every occurrence of an aliased graph.
//!
//! ## Stack discipline
//!
//! - reads leave the stack at the depth they found it
//! - `write_one` adds exactly one slot, `to_stack` exactly `len()` slots
//! - every push is preceded by a capacity reservation
//! - on error the stack is popped back to the depth it had on entry
//!
//! Native types with no value representation (functions, threads, foreign
//! userdata) read as nil.

use crate::error::StackError;
use scriptval_core::{
    InterpreterStack, ReferenceTracker, StackConfig, StackType, TableBuilder, TableGraph, TableId,
    ValueCell, ValueList,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Read side: native table id to the graph built for it
pub type NativeTracker = ReferenceTracker<usize, Arc<TableGraph>>;

/// Write side: graph identity to the native table written for it
pub type HandleTracker<H> = ReferenceTracker<TableId, H>;

struct StackReader<'a, T: InterpreterStack + ?Sized> {
    stack: &'a mut T,
    tracker: &'a mut NativeTracker,
    max_depth: usize,
    depth: usize,
}

impl<T: InterpreterStack + ?Sized> StackReader<'_, T> {
    fn read(&mut self, index: usize) -> Result<ValueCell, StackError> {
        let stack = &*self.stack;
        Ok(match stack.type_of(index) {
            StackType::None | StackType::Nil => ValueCell::Nil,
            StackType::Bool => stack.get_bool(index).map_or(ValueCell::Nil, ValueCell::Bool),
            StackType::Number => stack
                .get_number(index)
                .map_or(ValueCell::Nil, ValueCell::Number),
            StackType::String => stack
                .get_string(index)
                .map_or(ValueCell::Nil, |s| ValueCell::String(s.to_vec())),
            StackType::ExternalRef => stack
                .get_external_ref(index)
                .map_or(ValueCell::Nil, ValueCell::ExternalRef),
            StackType::Table => self.read_table(index)?,
            other @ (StackType::Function | StackType::Thread | StackType::Userdata) => {
                trace!("Reading unsupported {} at slot {} as nil", other.name(), index);
                ValueCell::Nil
            }
        })
    }

    fn read_table(&mut self, index: usize) -> Result<ValueCell, StackError> {
        let Some(native_id) = self.stack.table_id(index) else {
            return Ok(ValueCell::Nil);
        };
        if let Some(graph) = self.tracker.lookup(&native_id) {
            return Ok(ValueCell::back_ref(graph));
        }
        if self.depth >= self.max_depth {
            return Err(StackError::DepthExceeded(self.max_depth));
        }

        let mut builder = TableBuilder::with_capacity(self.stack.table_size_hint(index));
        self.tracker.remember(native_id, Arc::clone(builder.graph()));

        // Iteration holds a key and a value above the table.
        if !self.stack.ensure_capacity(2) {
            return Err(StackError::Overflow { requested: 2 });
        }

        self.depth += 1;
        self.stack.push_nil();
        while self.stack.next(index) {
            let top = self.stack.depth();
            let key = self.read(top - 2)?;
            let value = self.read(top - 1)?;
            builder.push(key, value);
            self.stack.pop(1);
        }
        self.depth -= 1;

        Ok(ValueCell::Table(builder.finish()))
    }
}

struct StackWriter<'a, T: InterpreterStack + ?Sized> {
    stack: &'a mut T,
    ref_list: &'a mut HandleTracker<T::Table>,
    max_depth: usize,
    depth: usize,
}

impl<T: InterpreterStack + ?Sized> StackWriter<'_, T> {
    fn reserve(&mut self, n: usize) -> Result<(), StackError> {
        if self.stack.ensure_capacity(n) {
            Ok(())
        } else {
            Err(StackError::Overflow { requested: n })
        }
    }

    fn write(&mut self, cell: &ValueCell) -> Result<(), StackError> {
        self.reserve(1)?;
        match cell {
            ValueCell::Nil => self.stack.push_nil(),
            ValueCell::Bool(b) => self.stack.push_bool(*b),
            ValueCell::Number(n) => self.stack.push_number(*n),
            ValueCell::String(bytes) => self.stack.push_string(bytes),
            ValueCell::ExternalRef(id) => self.stack.push_external_ref(*id),
            ValueCell::Table(graph) => self.write_table(graph)?,
            ValueCell::TableRef(weak) => match weak.upgrade() {
                Some(graph) => self.write_table(&graph)?,
                None => {
                    debug!("Dangling table reference, pushing nil");
                    self.stack.push_nil();
                }
            },
        }
        Ok(())
    }

    fn write_table(&mut self, graph: &Arc<TableGraph>) -> Result<(), StackError> {
        let id = TableId::of(graph);
        if let Some(handle) = self.ref_list.lookup(&id) {
            self.stack.push_table(handle);
            return Ok(());
        }
        if self.depth >= self.max_depth {
            return Err(StackError::DepthExceeded(self.max_depth));
        }

        self.stack.new_table(graph.len());
        let table_index = self.stack.depth() - 1;

        // Only a graph that can be reached again needs its native table
        // remembered.
        if Arc::strong_count(graph) > 1 || Arc::weak_count(graph) > 0 {
            if let Some(handle) = self.stack.table_handle(table_index) {
                self.ref_list.remember(id, handle);
            }
        }

        self.depth += 1;
        for (key, value) in graph.pairs() {
            self.write(key)?;
            self.write(value)?;
            self.stack.set_table(table_index);
        }
        self.depth -= 1;
        Ok(())
    }
}

/// Pop back down to `base` after a failed operation
fn restore<T: InterpreterStack + ?Sized>(stack: &mut T, base: usize) {
    let depth = stack.depth();
    if depth > base {
        stack.pop(depth - base);
    }
}

/// Read the value at `index`, resolving tables through `tracker`
pub fn read_one<T: InterpreterStack + ?Sized>(
    stack: &mut T,
    index: usize,
    tracker: &mut NativeTracker,
    config: &StackConfig,
) -> Result<ValueCell, StackError> {
    let base = stack.depth();
    let mut reader = StackReader {
        stack: &mut *stack,
        tracker,
        max_depth: config.max_depth,
        depth: 0,
    };
    let result = reader.read(index);
    if result.is_err() {
        restore(stack, base);
    }
    result
}

/// Read `count` slots starting at `begin`; `None` reads through to the top
pub fn read_range<T: InterpreterStack + ?Sized>(
    stack: &mut T,
    begin: usize,
    count: Option<usize>,
    config: &StackConfig,
) -> Result<ValueList, StackError> {
    let depth = stack.depth();
    let end = match count {
        Some(n) => begin.checked_add(n),
        None => Some(depth.max(begin)),
    };
    let end = match end {
        Some(end) if begin <= depth && end <= depth => end,
        _ => {
            return Err(StackError::IndexOutOfRange {
                begin,
                end: end.unwrap_or(usize::MAX),
                depth,
            });
        }
    };

    let mut tracker = NativeTracker::new();
    let mut list = ValueList::with_capacity(end - begin);
    for index in begin..end {
        list.push(read_one(stack, index, &mut tracker, config)?);
    }
    debug!(
        "Read {} values ({} tables) from the stack",
        list.len(),
        tracker.len()
    );
    Ok(list)
}

/// Push the native form of `cell`, reusing tables registered in `ref_list`
pub fn write_one<T: InterpreterStack + ?Sized>(
    stack: &mut T,
    cell: &ValueCell,
    ref_list: &mut HandleTracker<T::Table>,
    config: &StackConfig,
) -> Result<(), StackError> {
    let base = stack.depth();
    let mut writer = StackWriter {
        stack: &mut *stack,
        ref_list,
        max_depth: config.max_depth,
        depth: 0,
    };
    let result = writer.write(cell);
    if result.is_err() {
        restore(stack, base);
    }
    result
}

/// Interpreter stack conversion for lists
pub trait StackCodec: Sized {
    fn from_stack_with_config<T: InterpreterStack + ?Sized>(
        stack: &mut T,
        begin: usize,
        count: Option<usize>,
        config: &StackConfig,
    ) -> Result<Self, StackError>;

    fn to_stack_with_config<T: InterpreterStack + ?Sized>(
        &self,
        stack: &mut T,
        config: &StackConfig,
    ) -> Result<(), StackError>;

    fn from_stack<T: InterpreterStack + ?Sized>(
        stack: &mut T,
        begin: usize,
        count: Option<usize>,
    ) -> Result<Self, StackError> {
        Self::from_stack_with_config(stack, begin, count, &StackConfig::default())
    }

    fn to_stack<T: InterpreterStack + ?Sized>(&self, stack: &mut T) -> Result<(), StackError> {
        self.to_stack_with_config(stack, &StackConfig::default())
    }
}

impl StackCodec for ValueList {
    fn from_stack_with_config<T: InterpreterStack + ?Sized>(
        stack: &mut T,
        begin: usize,
        count: Option<usize>,
        config: &StackConfig,
    ) -> Result<Self, StackError> {
        read_range(stack, begin, count, config)
    }

    fn to_stack_with_config<T: InterpreterStack + ?Sized>(
        &self,
        stack: &mut T,
        config: &StackConfig,
    ) -> Result<(), StackError> {
        let base = stack.depth();
        let mut ref_list = HandleTracker::new();
        for cell in self {
            if let Err(e) = write_one(stack, cell, &mut ref_list, config) {
                restore(stack, base);
                return Err(e);
            }
        }
        debug!(
            "Wrote {} values ({} shared tables) to the stack",
            self.len(),
            ref_list.len()
        );
        Ok(())
    }
}
