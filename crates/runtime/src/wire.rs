//! Wire codec: bit-packed binary messages
//!
//! Both ends of a connection run the same codec; there is no version
//! negotiation.
//!
//! ## Layout
//!
//! Every cell starts with a 4-bit tag:
//!
//! | Tag | Type | Payload |
//! |---|---|---|
//! | 0 | Nil | |
//! | 1 | Bool | 1 bit |
//! | 2 | Number | 1 bit is-float, then a zig-zag compressed int, or 1 bit is-double and 32/64 raw bits |
//! | 3 | ShortString | compressed length, raw bytes |
//! | 4 | LongString | compressed length, byte-align, raw bytes |
//! | 5 | ExternalRef | compressed id |
//! | 6 | Table | compressed element count (2 per pair), then key, value per pair |
//! | 7 | TableRef | compressed slot |
//!
//! A list is a compressed cell count followed by the cells. Tables are
//! numbered in order of first appearance starting at [`WIRE_SLOT_BASE`];
//! numbering is shared by every cell of a list, and a table's slot is
//! assigned before its contents are written, so a table may contain a
//! reference to itself.
//!
//! ## Numbers
//!
//! See [`classify_number`]. Integral values within `(-2^24, 2^24)` are
//! compressed ints, other values within `[-(2^31-1), 2^31-1]` are f32, and
//! everything else (including NaN and the infinities) is f64.
//!
//! ## Reading untrusted input
//!
//! Declared lengths and counts are checked against what is left of the input
//! before anything is allocated, and nesting is bounded by
//! [`WireConfig::max_depth`]. Any failure aborts the whole read.

use crate::bitstream::{BitBuffer, BitReader, BitSink, BitSource};
use crate::error::ProtocolError;
use scriptval_core::{
    EmptyRegistry, ExternalRegistry, GraphTracker, NumberPolicy, ReferenceTracker, SlotTracker,
    TableBuilder, TableGraph, TableId, ValueCell, ValueList, WireConfig,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// First slot number handed to a table on the wire
pub const WIRE_SLOT_BASE: u32 = 1;

/// Longest string sent with the short-string tag
pub const SHORT_STRING_MAX: usize = 65535;

const TAG_BITS: u32 = 4;

/// Largest magnitude (exclusive) sent as a compressed int
const INT_LIMIT: f64 = 16_777_216.0; // 2^24

/// Largest magnitude (inclusive) sent as f32
const SINGLE_LIMIT: f64 = 2_147_483_647.0; // 2^31 - 1

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireTag {
    Nil = 0,
    Bool = 1,
    Number = 2,
    ShortString = 3,
    LongString = 4,
    ExternalRef = 5,
    Table = 6,
    TableRef = 7,
}

impl TryFrom<u8> for WireTag {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        Ok(match tag {
            0 => WireTag::Nil,
            1 => WireTag::Bool,
            2 => WireTag::Number,
            3 => WireTag::ShortString,
            4 => WireTag::LongString,
            5 => WireTag::ExternalRef,
            6 => WireTag::Table,
            7 => WireTag::TableRef,
            other => return Err(ProtocolError::InvalidTag(other)),
        })
    }
}

/// Wire representation chosen for a number
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberEncoding {
    Int(i32),
    Single(f32),
    Double(f64),
}

/// Pick the wire representation of `value`
///
/// Under [`NumberPolicy::Compact`] every value within `[-(2^31-1), 2^31-1]`
/// that is not a small integer travels as f32, even where that rounds.
/// [`NumberPolicy::Lossless`] only takes the f32 path when the value survives
/// it bit for bit, and keeps `-0.0` out of the int path.
pub fn classify_number(value: f64, policy: NumberPolicy) -> NumberEncoding {
    let lossless = policy == NumberPolicy::Lossless;
    let negative_zero = value == 0.0 && value.is_sign_negative();

    let integral = value.fract() == 0.0 && value > -INT_LIMIT && value < INT_LIMIT;
    if integral && !(lossless && negative_zero) {
        return NumberEncoding::Int(value as i32);
    }

    if (-SINGLE_LIMIT..=SINGLE_LIMIT).contains(&value) {
        let single = value as f32;
        if !lossless || (single as f64).to_bits() == value.to_bits() {
            return NumberEncoding::Single(single);
        }
    }

    NumberEncoding::Double(value)
}

/// Encoder state for one message
struct WireWriter<'a, S: BitSink + ?Sized> {
    sink: &'a mut S,
    registry: &'a dyn ExternalRegistry,
    config: &'a WireConfig,
    tracker: SlotTracker,
    depth: usize,
}

impl<'a, S: BitSink + ?Sized> WireWriter<'a, S> {
    fn new(sink: &'a mut S, registry: &'a dyn ExternalRegistry, config: &'a WireConfig) -> Self {
        WireWriter {
            sink,
            registry,
            config,
            tracker: ReferenceTracker::with_base(WIRE_SLOT_BASE),
            depth: 0,
        }
    }

    fn tag(&mut self, tag: WireTag) {
        self.sink.write_bits(tag as u64, TAG_BITS);
    }

    fn write_list(&mut self, list: &ValueList) -> Result<(), ProtocolError> {
        self.sink.write_compressed(list.len() as u64);
        for cell in list {
            self.write_cell(cell)?;
        }
        Ok(())
    }

    fn write_cell(&mut self, cell: &ValueCell) -> Result<(), ProtocolError> {
        match cell {
            ValueCell::Nil => self.tag(WireTag::Nil),
            ValueCell::Bool(b) => {
                self.tag(WireTag::Bool);
                self.sink.write_bit(*b);
            }
            ValueCell::Number(n) => self.write_number(*n),
            ValueCell::String(bytes) => self.write_string(bytes),
            ValueCell::ExternalRef(id) => {
                if self.registry.resolve(*id).is_some() {
                    self.tag(WireTag::ExternalRef);
                    self.sink.write_compressed(*id);
                } else {
                    debug!("Reference {} no longer resolves, sending nil", id);
                    self.tag(WireTag::Nil);
                }
            }
            ValueCell::Table(graph) => self.write_table(graph)?,
            ValueCell::TableRef(weak) => match weak.upgrade() {
                Some(graph) => self.write_table(&graph)?,
                None => {
                    debug!("Dangling table reference, sending nil");
                    self.tag(WireTag::Nil);
                }
            },
        }
        Ok(())
    }

    fn write_number(&mut self, value: f64) {
        self.tag(WireTag::Number);
        match classify_number(value, self.config.number_policy) {
            NumberEncoding::Int(i) => {
                self.sink.write_bit(false);
                self.sink.write_signed(i as i64);
            }
            NumberEncoding::Single(f) => {
                self.sink.write_bit(true);
                self.sink.write_bit(false);
                self.sink.write_bits(f.to_bits() as u64, 32);
            }
            NumberEncoding::Double(d) => {
                self.sink.write_bit(true);
                self.sink.write_bit(true);
                self.sink.write_bits(d.to_bits(), 64);
            }
        }
    }

    fn write_string(&mut self, bytes: &[u8]) {
        if bytes.len() <= SHORT_STRING_MAX {
            self.tag(WireTag::ShortString);
            self.sink.write_compressed(bytes.len() as u64);
        } else {
            self.tag(WireTag::LongString);
            self.sink.write_compressed(bytes.len() as u64);
            self.sink.align();
        }
        self.sink.write_bytes(bytes);
    }

    fn write_table(&mut self, graph: &Arc<TableGraph>) -> Result<(), ProtocolError> {
        let id = TableId::of(graph);
        if let Some(&slot) = self.tracker.lookup(&id) {
            self.tag(WireTag::TableRef);
            self.sink.write_compressed(slot as u64);
            return Ok(());
        }
        if self.depth >= self.config.max_depth {
            return Err(ProtocolError::DepthExceeded(self.config.max_depth));
        }

        let slot = self.tracker.assign_slot(id);
        trace!("Table slot {} with {} pairs", slot, graph.len());
        self.tag(WireTag::Table);
        self.sink.write_compressed(graph.len() as u64 * 2);

        self.depth += 1;
        for (key, value) in graph.pairs() {
            self.write_cell(key)?;
            self.write_cell(value)?;
        }
        self.depth -= 1;
        Ok(())
    }
}

/// Decoder state for one message
struct WireReader<'a, S: BitSource + ?Sized> {
    source: &'a mut S,
    config: &'a WireConfig,
    tracker: GraphTracker,
    depth: usize,
}

impl<'a, S: BitSource + ?Sized> WireReader<'a, S> {
    fn new(source: &'a mut S, config: &'a WireConfig) -> Self {
        WireReader {
            source,
            config,
            tracker: ReferenceTracker::with_base(WIRE_SLOT_BASE),
            depth: 0,
        }
    }

    /// Reject a count of cells that the remaining input cannot possibly hold
    fn check_count(&self, declared: u64) -> Result<(), ProtocolError> {
        let remaining_bits = self.source.bits_remaining();
        let minimum = declared.saturating_mul(TAG_BITS as u64);
        if minimum > remaining_bits as u64 {
            return Err(ProtocolError::CountExceedsRemaining {
                declared,
                remaining_bits,
            });
        }
        Ok(())
    }

    fn read_list(&mut self) -> Result<ValueList, ProtocolError> {
        let count = self.source.read_compressed()?;
        self.check_count(count)?;
        let mut list = ValueList::with_capacity(count as usize);
        for _ in 0..count {
            list.push(self.read_cell()?);
        }
        Ok(list)
    }

    fn read_cell(&mut self) -> Result<ValueCell, ProtocolError> {
        let tag = WireTag::try_from(self.source.read_bits(TAG_BITS)? as u8)?;
        Ok(match tag {
            WireTag::Nil => ValueCell::Nil,
            WireTag::Bool => ValueCell::Bool(self.source.read_bit()?),
            WireTag::Number => ValueCell::Number(self.read_number()?),
            WireTag::ShortString => {
                let len = self.read_length()?;
                ValueCell::String(self.source.read_bytes(len)?)
            }
            WireTag::LongString => {
                let declared = self.source.read_compressed()?;
                self.source.align();
                let len = self.checked_length(declared)?;
                ValueCell::String(self.source.read_bytes(len)?)
            }
            WireTag::ExternalRef => ValueCell::ExternalRef(self.source.read_compressed()?),
            WireTag::Table => self.read_table()?,
            WireTag::TableRef => {
                let slot = self.source.read_compressed()?;
                let graph = u32::try_from(slot)
                    .ok()
                    .and_then(|slot| self.tracker.lookup(&slot))
                    .ok_or(ProtocolError::UnknownTableRef(slot))?;
                ValueCell::back_ref(graph)
            }
        })
    }

    fn read_number(&mut self) -> Result<f64, ProtocolError> {
        if !self.source.read_bit()? {
            return Ok(self.source.read_signed()? as f64);
        }
        if self.source.read_bit()? {
            Ok(f64::from_bits(self.source.read_bits(64)?))
        } else {
            Ok(f32::from_bits(self.source.read_bits(32)? as u32) as f64)
        }
    }

    fn read_length(&mut self) -> Result<usize, ProtocolError> {
        let declared = self.source.read_compressed()?;
        self.checked_length(declared)
    }

    fn checked_length(&self, declared: u64) -> Result<usize, ProtocolError> {
        let remaining = self.source.bytes_remaining();
        if declared > remaining as u64 {
            return Err(ProtocolError::LengthExceedsRemaining {
                declared,
                remaining,
            });
        }
        Ok(declared as usize)
    }

    fn read_table(&mut self) -> Result<ValueCell, ProtocolError> {
        let count = self.source.read_compressed()?;
        if count % 2 != 0 {
            return Err(ProtocolError::OddTableLength(count));
        }
        self.check_count(count)?;
        if self.depth >= self.config.max_depth {
            return Err(ProtocolError::DepthExceeded(self.config.max_depth));
        }

        let pairs = (count / 2) as usize;
        let mut builder = TableBuilder::with_capacity(pairs);
        self.tracker.register(Arc::clone(builder.graph()));

        self.depth += 1;
        for _ in 0..pairs {
            let key = self.read_cell()?;
            let value = self.read_cell()?;
            builder.push(key, value);
        }
        self.depth -= 1;
        Ok(ValueCell::Table(builder.finish()))
    }
}

/// Wire encoding for values and lists
///
/// On error the sink holds a partial message and must be discarded.
pub trait WireCodec: Sized {
    fn to_wire_with_config<S: BitSink + ?Sized>(
        &self,
        sink: &mut S,
        registry: &dyn ExternalRegistry,
        config: &WireConfig,
    ) -> Result<(), ProtocolError>;

    fn from_wire_with_config<S: BitSource + ?Sized>(
        source: &mut S,
        config: &WireConfig,
    ) -> Result<Self, ProtocolError>;

    fn to_wire<S: BitSink + ?Sized>(
        &self,
        sink: &mut S,
        registry: &dyn ExternalRegistry,
    ) -> Result<(), ProtocolError> {
        self.to_wire_with_config(sink, registry, &WireConfig::default())
    }

    fn from_wire<S: BitSource + ?Sized>(source: &mut S) -> Result<Self, ProtocolError> {
        Self::from_wire_with_config(source, &WireConfig::default())
    }

    /// Encode into a fresh byte vector
    fn to_wire_bytes(&self, registry: &dyn ExternalRegistry) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = BitBuffer::new();
        self.to_wire(&mut buf, registry)?;
        Ok(buf.into_bytes())
    }

    /// Decode from a byte slice
    fn from_wire_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BitReader::new(bytes);
        let decoded = Self::from_wire(&mut reader)?;
        if reader.bytes_remaining() > 0 {
            debug!("{} trailing bytes after wire message", reader.bytes_remaining());
        }
        Ok(decoded)
    }
}

impl WireCodec for ValueList {
    fn to_wire_with_config<S: BitSink + ?Sized>(
        &self,
        sink: &mut S,
        registry: &dyn ExternalRegistry,
        config: &WireConfig,
    ) -> Result<(), ProtocolError> {
        let start = sink.bit_len();
        let mut writer = WireWriter::new(sink, registry, config);
        writer.write_list(self)?;
        let tables = writer.tracker.len();
        debug!(
            "Encoded {} cells ({} tables) in {} bits",
            self.len(),
            tables,
            sink.bit_len() - start
        );
        Ok(())
    }

    fn from_wire_with_config<S: BitSource + ?Sized>(
        source: &mut S,
        config: &WireConfig,
    ) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(source, config);
        let list = reader.read_list()?;
        debug!(
            "Decoded {} cells ({} tables)",
            list.len(),
            reader.tracker.len()
        );
        Ok(list)
    }
}

impl WireCodec for ValueCell {
    fn to_wire_with_config<S: BitSink + ?Sized>(
        &self,
        sink: &mut S,
        registry: &dyn ExternalRegistry,
        config: &WireConfig,
    ) -> Result<(), ProtocolError> {
        WireWriter::new(sink, registry, config).write_cell(self)
    }

    fn from_wire_with_config<S: BitSource + ?Sized>(
        source: &mut S,
        config: &WireConfig,
    ) -> Result<Self, ProtocolError> {
        WireReader::new(source, config).read_cell()
    }
}

/// Registry for callers that never send references
pub fn no_registry() -> &'static dyn ExternalRegistry {
    &EmptyRegistry
}
