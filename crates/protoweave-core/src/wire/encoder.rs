//! Fixed-capacity protobuf output buffer.

use super::varint::encode_varint;
use super::{make_tag, varint_size64, WireType};
use crate::error::{Error, Result};
use bytes::BufMut;

/// A write cursor over a buffer whose size is known up front.
///
/// The capacity comes from a size pass; every write is checked against it
/// and a write past the end is reported as [`Error::BufferOverflow`]. The
/// buffer never grows.
#[derive(Debug)]
pub struct Encoder {
    buf: Vec<u8>,
    capacity: usize,
}

impl Encoder {
    /// Creates an encoder that accepts exactly `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total capacity fixed at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that may still be written
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Writes a field tag
    pub fn write_tag(&mut self, number: u32, wire_type: WireType) -> Result<()> {
        self.write_varint32(make_tag(number, wire_type))
    }

    /// Writes a 32-bit varint.
    ///
    /// Negative `int32` values must be sign-extended and written with
    /// [`Encoder::write_varint64`].
    pub fn write_varint32(&mut self, value: u32) -> Result<()> {
        self.write_varint64(value as u64)
    }

    /// Writes a 64-bit varint
    pub fn write_varint64(&mut self, value: u64) -> Result<()> {
        self.reserve(varint_size64(value))?;
        encode_varint(value, &mut self.buf);
        Ok(())
    }

    /// Writes a little-endian 32-bit value
    pub fn write_fixed32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    /// Writes a little-endian 64-bit value
    pub fn write_fixed64(&mut self, value: u64) -> Result<()> {
        self.reserve(8)?;
        self.buf.put_u64_le(value);
        Ok(())
    }

    /// Writes raw bytes without a length prefix
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Writes UTF-8 text without a length prefix
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Consumes the encoder and returns the written bytes
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn reserve(&self, required: usize) -> Result<()> {
        if required > self.remaining() {
            return Err(Error::BufferOverflow {
                capacity: self.capacity,
                required: self.buf.len() + required,
            });
        }
        Ok(())
    }
}
