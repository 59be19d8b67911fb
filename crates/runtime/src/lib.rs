//! scriptval runtime: the three codecs
//!
//! Key design principles:
//! - Codecs depend on the core value model, never on each other
//! - Every call owns its trackers; nothing is shared between calls
//! - Malformed input is an error, never a panic or a partial result
//!
//! # Modules
//!
//! - `stack`: ValueList ⇄ interpreter stack
//! - `bitstream`: MSB-first bit streams and compressed integers
//! - `wire`: ValueList ⇄ bit-packed binary messages
//! - `json`: ValueList ⇄ JSON text with tagged-string sentinels
//! - `error`: one error enum per codec

pub mod bitstream;
pub mod error;
pub mod json;
pub mod stack;
pub mod wire;

pub use bitstream::{BitBuffer, BitReader, BitSink, BitSource};
pub use error::{JsonError, ProtocolError, StackError};
pub use json::{JSON_SLOT_BASE, JsonCodec, JsonMode};
pub use stack::{HandleTracker, NativeTracker, StackCodec, read_one, read_range, write_one};
pub use wire::{
    NumberEncoding, SHORT_STRING_MAX, WIRE_SLOT_BASE, WireCodec, WireTag, classify_number,
    no_registry,
};

// The value model, so codec users need only this crate
pub use scriptval_core::{
    CodecConfig, ExternalRegistry, JsonConfig, LiveObject, NumberPolicy, RefId, StackConfig,
    StaticRegistry, TableBuilder, TableGraph, ValueCell, ValueList, WireConfig,
};
