//! scriptval core: the value model shared by every codec
//!
//! This crate provides the dynamically-typed value that an embedded
//! scripting language hands to the host, together with the identity
//! machinery needed to move aliased and self-referencing tables around
//! without looping or duplicating them.
//!
//! Key design principles:
//! - ValueCell: closed tagged union, leaves inline, tables behind `Arc`
//! - TableGraph: write-once ordered pairs, sealed before it is shared
//! - ReferenceTracker: one identity map per codec pass, never global
//!
//! # Modules
//!
//! - `value`: ValueCell and its accessors
//! - `table`: TableGraph, TableBuilder and table identity
//! - `compare`: flat equality, structural equivalence, deep copy
//! - `list`: ValueList
//! - `tracker`: per-pass identity maps and slot allocation
//! - `registry`: external reference resolution
//! - `stack`: the interpreter stack interface
//! - `tagged_stack`: an in-memory interpreter stack
//! - `config`: codec configuration

pub mod compare;
pub mod config;
pub mod list;
pub mod registry;
pub mod stack;
pub mod table;
pub mod tagged_stack;
pub mod tracker;
pub mod value;

pub use config::{
    CodecConfig, ConfigError, DEFAULT_MAX_DEPTH, JsonConfig, NumberPolicy, StackConfig, WireConfig,
};
pub use list::ValueList;
pub use registry::{EmptyRegistry, ExternalRegistry, LiveObject, StaticRegistry};
pub use stack::{InterpreterStack, StackType};
pub use table::{TableBuilder, TableGraph, TableId, TablePair};
pub use tagged_stack::{HostTable, StackSlot, TableHandle, TaggedStack};
pub use tracker::{GraphTracker, ReferenceTracker, SlotTracker};
pub use value::{RefId, ValueCell};
