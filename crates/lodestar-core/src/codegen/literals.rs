//! Literal buffer layout
//!
//! Each device gets its own literal buffer for a compiled function. Literals
//! are laid out in registration order, each at an offset aligned to its own
//! width:
//!
//! ```text
//! offset 0                                    high-water mark
//! ┌────────┬────┬────────────┬────────┬──────┬────────────────────────┐
//! │ i32    │pad │ i64        │ header │ f32  │ string payloads ...    │
//! └────────┴────┴────────────┴────┬───┴──────┴────────────────────────┘
//!                                 │  bits [31:16] payload offset
//!                                 └─ bits [15:0]  payload length
//! ```
//!
//! Scalars are stored native-endian in exactly `bits / 8` bytes. An
//! unencoded string occupies a 4-byte packed header in the literal region;
//! its bytes are appended after the region when the buffer is serialized.

use crate::{Error, Result};

/// Mask selecting the payload offset of a packed string header
pub const STRING_OFFSET_MASK: u32 = 0xFFFF_0000;

/// Shift moving the payload offset of a packed string header to bit 0
pub const STRING_OFFSET_SHIFT: u32 = 16;

/// Mask selecting the payload length of a packed string header
pub const STRING_LENGTH_MASK: u32 = 0x0000_FFFF;

/// Size in bytes of a packed string header
pub const STRING_HEADER_BYTES: usize = 4;

/// Largest payload offset or length a packed string header can carry
pub const MAX_STRING_FIELD: usize = u16::MAX as usize;

/// Pack a string payload offset and length into a header word.
///
/// Both must fit in 16 bits; anything larger means the literal buffer was
/// sized wrong upstream.
pub fn pack_string_header(offset: usize, len: usize) -> Result<u32> {
    if offset > MAX_STRING_FIELD {
        return Err(Error::precondition(format!(
            "string payload offset {offset} exceeds {MAX_STRING_FIELD}"
        )));
    }
    if len > MAX_STRING_FIELD {
        return Err(Error::precondition(format!(
            "string payload length {len} exceeds {MAX_STRING_FIELD}"
        )));
    }
    Ok(((offset as u32) << STRING_OFFSET_SHIFT) | len as u32)
}

/// Split a header word into `(payload offset, payload length)`
pub fn unpack_string_header(header: u32) -> (u16, u16) {
    let offset = (header & STRING_OFFSET_MASK) >> STRING_OFFSET_SHIFT;
    let len = header & STRING_LENGTH_MASK;
    (offset as u16, len as u16)
}

/// Value stored in a literal buffer
#[derive(Debug, Clone)]
pub enum LiteralValue {
    /// NOT NULL boolean, one byte
    Bool(bool),
    /// Nullable boolean (or its null sentinel), one byte
    Int8(i8),
    /// 16-bit integer
    Int16(i16),
    /// 32-bit integer; also dictionary ids
    Int32(i32),
    /// 64-bit integer; also temporal values
    Int64(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Unencoded string
    Str(String),
}

impl LiteralValue {
    /// Bytes the value occupies in the literal region (and its alignment)
    pub fn byte_width(&self) -> usize {
        match self {
            Self::Bool(_) | Self::Int8(_) => 1,
            Self::Int16(_) => 2,
            Self::Int32(_) | Self::Float(_) => 4,
            Self::Int64(_) | Self::Double(_) => 8,
            Self::Str(_) => STRING_HEADER_BYTES,
        }
    }
}

// Floats compare by bit pattern so -0.0 and 0.0 stay distinct literals and a
// NaN literal is found again on the second lookup.
impl PartialEq for LiteralValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int8(a), Self::Int8(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// End offset of a value of `alignment` bytes placed after `off`
pub fn add_aligned(off: usize, alignment: usize) -> usize {
    let mut off = off;
    if off % alignment != 0 {
        off += alignment - off % alignment;
    }
    off + alignment
}

/// Literals registered for one device
#[derive(Debug, Clone, Default)]
pub struct LiteralBuffer {
    literals: Vec<LiteralValue>,
    high_watermark: usize,
}

impl LiteralBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `value`, registering it at the end of the literal region
    /// if it is not there yet
    pub fn get_or_add(&mut self, value: LiteralValue) -> usize {
        let mut found_off = 0;
        for literal in &self.literals {
            let lit_bytes = literal.byte_width();
            found_off = add_aligned(found_off, lit_bytes);
            if *literal == value {
                return found_off - lit_bytes;
            }
        }
        let lit_bytes = value.byte_width();
        self.literals.push(value);
        self.high_watermark = add_aligned(self.high_watermark, lit_bytes);
        self.high_watermark - lit_bytes
    }

    /// Next free byte of the literal region
    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// Number of registered literals
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    /// Whether no literal is registered
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Registered literals with their offsets
    pub fn entries(&self) -> Vec<(usize, &LiteralValue)> {
        let mut off = 0;
        self.literals
            .iter()
            .map(|literal| {
                let lit_bytes = literal.byte_width();
                off = add_aligned(off, lit_bytes);
                (off - lit_bytes, literal)
            })
            .collect()
    }

    /// Byte image of the buffer as generated code reads it
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload_bytes: usize = self
            .literals
            .iter()
            .map(|literal| match literal {
                LiteralValue::Str(s) => s.len(),
                _ => 0,
            })
            .sum();
        let mut serialized = vec![0u8; self.high_watermark + payload_bytes];
        let mut payload_off = self.high_watermark;

        for (off, literal) in self.entries() {
            let slot = &mut serialized[off..off + literal.byte_width()];
            match literal {
                LiteralValue::Bool(v) => slot.copy_from_slice(bytemuck::bytes_of(&(*v as i8))),
                LiteralValue::Int8(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Int16(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Int32(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Int64(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Float(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Double(v) => slot.copy_from_slice(bytemuck::bytes_of(v)),
                LiteralValue::Str(s) => {
                    let header = pack_string_header(payload_off, s.len())?;
                    slot.copy_from_slice(bytemuck::bytes_of(&header));
                    serialized[payload_off..payload_off + s.len()].copy_from_slice(s.as_bytes());
                    payload_off += s.len();
                }
            }
        }
        Ok(serialized)
    }
}
