//! Bit streams for the wire codec
//!
//! Bits are packed most-significant first within each byte. Multi-bit fields
//! are written high bit first, so an 8-bit field written at a byte boundary
//! is exactly that byte.
//!
//! ## Compressed integers
//!
//! ```text
//! value = 300 = 0b10_0101100
//!
//! group 0: 1 0101100   continuation set, low 7 bits
//! group 1: 0 0000010   continuation clear, next 7 bits
//! ```
//!
//! Groups are 8 bits each, least significant group first. Signed values are
//! zig-zag mapped (`0, -1, 1, -2, ...` → `0, 1, 2, 3, ...`) before
//! compression so that small negative numbers stay short.
//!
//! Readers check availability before consuming anything and never allocate
//! more than the remaining input could fill.

use crate::error::ProtocolError;

/// Most groups a 64-bit compressed integer can occupy
const MAX_COMPRESSED_GROUPS: u32 = 10;

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Destination of a bit-packed message
pub trait BitSink {
    /// Write the low `count` bits of `value`, high bit first (`count` ≤ 64)
    fn write_bits(&mut self, value: u64, count: u32);

    /// Pad with zero bits up to the next byte boundary
    fn align(&mut self);

    /// Number of bits written so far
    fn bit_len(&self) -> usize;

    fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    fn write_compressed(&mut self, mut value: u64) {
        loop {
            let group = value & 0x7f;
            value >>= 7;
            let more = value != 0;
            self.write_bit(more);
            self.write_bits(group, 7);
            if !more {
                break;
            }
        }
    }

    fn write_signed(&mut self, value: i64) {
        self.write_compressed(zigzag_encode(value));
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_bits(byte as u64, 8);
        }
    }
}

/// Source of a bit-packed message
pub trait BitSource {
    /// Read `count` bits (`count` ≤ 64), high bit first
    fn read_bits(&mut self, count: u32) -> Result<u64, ProtocolError>;

    /// Skip to the next byte boundary
    fn align(&mut self);

    fn bits_remaining(&self) -> usize;

    fn bytes_remaining(&self) -> usize {
        self.bits_remaining() / 8
    }

    fn read_bit(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_bits(1)? == 1)
    }

    fn read_compressed(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for i in 0..MAX_COMPRESSED_GROUPS {
            let more = self.read_bit()?;
            let group = self.read_bits(7)?;
            let shift = 7 * i;
            // The tenth group only has room for the top bit of a u64.
            if shift == 63 && group > 1 {
                return Err(ProtocolError::MalformedInteger);
            }
            value |= group << shift;
            if !more {
                return Ok(value);
            }
        }
        Err(ProtocolError::MalformedInteger)
    }

    fn read_signed(&mut self) -> Result<i64, ProtocolError> {
        Ok(zigzag_decode(self.read_compressed()?))
    }

    /// Read `len` bytes; fails before allocating if they are not all there
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let needed = len.saturating_mul(8);
        if needed > self.bits_remaining() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.bits_remaining(),
            });
        }
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }
}

/// Growable bit buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The written bytes; a trailing partial byte is zero-padded
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn is_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }
}

impl BitSink for BitBuffer {
    fn write_bits(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 64, "write_bits: count {} exceeds 64", count);
        for i in (0..count).rev() {
            if self.is_aligned() {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    fn align(&mut self) {
        self.bit_len = self.bytes.len() * 8;
    }

    fn bit_len(&self) -> usize {
        self.bit_len
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if self.is_aligned() {
            self.bytes.extend_from_slice(bytes);
            self.bit_len += bytes.len() * 8;
        } else {
            for &byte in bytes {
                self.write_bits(byte as u64, 8);
            }
        }
    }
}

/// Reader over a byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Bits consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    fn bit_at(&self, pos: usize) -> u64 {
        ((self.data[pos / 8] >> (7 - pos % 8)) & 1) as u64
    }
}

impl BitSource for BitReader<'_> {
    fn read_bits(&mut self, count: u32) -> Result<u64, ProtocolError> {
        debug_assert!(count <= 64, "read_bits: count {} exceeds 64", count);
        let needed = count as usize;
        if needed > self.bits_remaining() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.bits_remaining(),
            });
        }
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.bit_at(self.pos);
            self.pos += 1;
        }
        Ok(value)
    }

    fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let needed = len.saturating_mul(8);
        if needed > self.bits_remaining() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.bits_remaining(),
            });
        }
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.pos += needed;
            return Ok(self.data[start..start + len].to_vec());
        }
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }
}
