//! Interpreter stack interface
//!
//! The engine talks to the host scripting VM only through this trait. It is
//! shaped after a Lua-style C API: values live in numbered slots, tables are
//! built by pushing a key and a value and then storing them, and iteration is
//! driven by `next`.
//!
//! Indices are absolute and 0-based (slot 0 is the bottom of the stack), so
//! pushing temporaries never shifts the index of a table being iterated.
//!
//! Callers must reserve room with [`InterpreterStack::ensure_capacity`]
//! before pushing; pushing into unreserved space is a logic error and
//! implementations are free to panic on it.

use crate::value::RefId;

/// Native type of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackType {
    /// Index is past the top of the stack
    None,
    Nil,
    Bool,
    Number,
    String,
    ExternalRef,
    Table,
    Function,
    Thread,
    Userdata,
}

impl StackType {
    pub fn name(self) -> &'static str {
        match self {
            StackType::None => "none",
            StackType::Nil => "nil",
            StackType::Bool => "boolean",
            StackType::Number => "number",
            StackType::String => "string",
            StackType::ExternalRef => "reference",
            StackType::Table => "table",
            StackType::Function => "function",
            StackType::Thread => "thread",
            StackType::Userdata => "userdata",
        }
    }
}

/// A host interpreter's value stack
pub trait InterpreterStack {
    /// Handle that keeps a native table reachable; pushing it again pushes the
    /// same table
    type Table: Clone;

    /// Number of occupied slots
    fn depth(&self) -> usize;

    fn type_of(&self, index: usize) -> StackType;

    fn get_bool(&self, index: usize) -> Option<bool>;
    fn get_number(&self, index: usize) -> Option<f64>;
    fn get_string(&self, index: usize) -> Option<&[u8]>;
    fn get_external_ref(&self, index: usize) -> Option<RefId>;

    /// Identity of the native table at `index`, stable while it is reachable
    fn table_id(&self, index: usize) -> Option<usize>;

    /// Handle to the native table at `index`
    fn table_handle(&self, index: usize) -> Option<Self::Table>;

    /// Number of entries in the native table at `index`
    ///
    /// Readers reserve exactly this many pairs, so the count must be exact.
    fn table_size_hint(&self, index: usize) -> usize;

    /// Make room for `n` more slots; `false` if the stack cannot grow that far
    fn ensure_capacity(&mut self, n: usize) -> bool;

    fn push_nil(&mut self);
    fn push_bool(&mut self, value: bool);
    fn push_number(&mut self, value: f64);
    fn push_string(&mut self, value: &[u8]);
    fn push_external_ref(&mut self, id: RefId);

    /// Push a new empty table sized for `size_hint` entries
    fn new_table(&mut self, size_hint: usize);

    /// Push an existing table
    fn push_table(&mut self, table: &Self::Table);

    /// Pop a value and then a key, and store `table[key] = value` in the table
    /// at `index`
    fn set_table(&mut self, index: usize);

    /// Table iteration step
    ///
    /// Pops a key and pushes the next key and value of the table at `index`,
    /// returning `true`; returns `false` with nothing pushed once the table is
    /// exhausted. Start with a nil key.
    fn next(&mut self, index: usize) -> bool;

    /// Remove the top `n` slots
    fn pop(&mut self, n: usize);
}
