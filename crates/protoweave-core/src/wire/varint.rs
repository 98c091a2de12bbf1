//! Base-128 varint and zigzag encoding.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Maximum number of bytes in an encoded 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Encodings
/// longer than 64 bits are truncated, matching the reference parsers. The
/// returned error carries an offset relative to `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::malformed_varint(0));
        }

        // Bits past the 64th are dropped (the 10th byte contributes one bit).
        if i < 9 {
            result |= ((byte & 0x7F) as u64) << (7 * i);
        } else {
            result |= ((byte & 0x01) as u64) << 63;
        }

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        Err(Error::malformed_varint(0))
    } else {
        Err(Error::truncated(data.len(), 1))
    }
}

/// Encode `value` as a varint into `buf`, returning the bytes written
pub fn encode_varint<B: BufMut>(mut value: u64, buf: &mut B) -> usize {
    let mut written = 1;
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
        written += 1;
    }
    buf.put_u8(value as u8);
    written
}

/// The number of bytes required to encode `value` as a varint.
///
/// Varints carry 7 bits per byte, so this is `ceil(significant_bits / 7)`
/// with a minimum of one byte for zero.
pub const fn varint_size64(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 {
        1
    } else {
        (bits + 6) / 7
    }
}

/// The number of bytes required to encode a 32-bit unsigned value
pub const fn varint_size32(value: u32) -> usize {
    varint_size64(value as u64)
}

/// Zigzag-encode a signed 32-bit value (`sint32`)
#[inline]
pub const fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`]
#[inline]
pub const fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Zigzag-encode a signed 64-bit value (`sint64`)
#[inline]
pub const fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`]
#[inline]
pub const fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
