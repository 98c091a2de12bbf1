//! Low-level protobuf wire format primitives.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! The deprecated group wire types (3 and 4) are rejected.

mod decoder;
mod encoder;
mod varint;

use crate::error::{Error, Result};

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use varint::{
    decode_varint, encode_varint, varint_size32, varint_size64, zigzag_decode32, zigzag_decode64,
    zigzag_encode32, zigzag_encode64, MAX_VARINT_LEN,
};

/// Minimum valid protobuf field number
pub const MIN_FIELD_NUMBER: u32 = 1;

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed runs)
    Len = 2,
    /// 32-bit fixed-width
    I32 = 5,
}

impl WireType {
    /// Returns the raw 3-bit value of this wire type
    pub const fn into_val(self) -> u8 {
        self as u8
    }

    /// Returns the wire type name as used in the encoding guide
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::Varint => "VARINT",
            WireType::I64 => "I64",
            WireType::Len => "LEN",
            WireType::I32 => "I32",
        }
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_type(value, 0)),
        }
    }
}

/// Combines a field number and wire type into a raw tag value
pub const fn make_tag(number: u32, wire_type: WireType) -> u32 {
    (number << 3) | wire_type.into_val() as u32
}

/// Returns the encoded length of a field tag
///
/// The wire type only occupies the low three bits, so it never changes the
/// length of the tag.
pub fn tag_size(number: u32) -> usize {
    varint_size32(number << 3)
}
