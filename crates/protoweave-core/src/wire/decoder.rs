//! Cursor over an in-memory protobuf buffer.

use super::varint::decode_varint;
use super::MAX_FIELD_NUMBER;
use crate::error::{Error, Result};

/// A read cursor over a byte buffer with a movable logical end.
///
/// The limit scopes reads to the current length-delimited region (an
/// embedded message or a packed run) without slicing the buffer, so offsets
/// reported in errors are always absolute.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder whose window covers the whole buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            limit: buf.len(),
        }
    }

    /// Current absolute read position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Logical end of the current window
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Moves the logical end of the window.
    ///
    /// The limit may not run past the end of the buffer or behind the
    /// current position.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.buf.len() || limit < self.pos {
            return Err(Error::length_overrun(
                limit as u64,
                self.buf.len().saturating_sub(self.pos),
                self.pos,
            ));
        }
        self.limit = limit;
        Ok(())
    }

    /// Narrows the window to the next `len` bytes, returning the previous limit
    pub fn push_limit(&mut self, len: usize) -> Result<usize> {
        if len > self.remaining() {
            return Err(Error::length_overrun(len as u64, self.remaining(), self.pos));
        }
        let old = self.limit;
        self.limit = self.pos + len;
        Ok(old)
    }

    /// Restores a limit returned by [`Decoder::push_limit`]
    pub fn pop_limit(&mut self, old: usize) {
        self.limit = old;
    }

    /// Bytes left in the current window
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Returns true while the cursor is inside the window
    pub fn is_readable(&self) -> bool {
        self.pos < self.limit
    }

    /// Reads a field tag.
    ///
    /// Returns `None` at the end of the window, otherwise the field number
    /// and the raw 3-bit wire type. Field number 0 is returned as-is so the
    /// caller can report it.
    pub fn read_tag(&mut self) -> Result<Option<(u32, u8)>> {
        if !self.is_readable() {
            return Ok(None);
        }
        let start = self.pos;
        let tag = self.read_varint64()?;
        let number = tag >> 3;
        if number > MAX_FIELD_NUMBER as u64 {
            return Err(Error::invalid_field_number(number, start));
        }
        Ok(Some((number as u32, (tag & 0x07) as u8)))
    }

    /// Reads a varint, keeping the low 64 bits
    pub fn read_varint64(&mut self) -> Result<u64> {
        let start = self.pos;
        match decode_varint(&self.buf[self.pos..self.limit]) {
            Ok((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            Err(Error::MalformedVarint { .. }) => Err(Error::malformed_varint(start)),
            Err(_) => Err(Error::truncated(start, 1)),
        }
    }

    /// Reads a varint, keeping the low 32 bits
    pub fn read_varint32(&mut self) -> Result<u32> {
        self.read_varint64().map(|v| v as u32)
    }

    /// Reads a little-endian 32-bit value
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads a little-endian 64-bit value
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a length prefix and checks it against the window
    pub fn read_length(&mut self) -> Result<usize> {
        let length = self.read_varint64()?;
        if length > self.remaining() as u64 {
            return Err(Error::length_overrun(length, self.remaining(), self.pos));
        }
        Ok(length as usize)
    }

    /// Reads exactly `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::length_overrun(n as u64, self.remaining(), self.pos));
        }
        self.take(n)
    }

    /// Reads exactly `n` bytes as UTF-8 text
    pub fn read_string(&mut self, n: usize) -> Result<&'a str> {
        let start = self.pos;
        let bytes = self.read_bytes(n)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 { offset: start })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::truncated(self.pos, n - self.remaining()));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tag() {
        let data = [0x08, 0x96, 0x01];
        let mut decoder = Decoder::new(&data);
        assert_eq!(decoder.read_tag().unwrap(), Some((1, 0)));
        assert_eq!(decoder.read_varint32().unwrap(), 150);
        assert!(!decoder.is_readable());
        assert_eq!(decoder.read_tag().unwrap(), None);
    }

    #[test]
    fn test_read_tag_field_zero_is_reported() {
        let data = [0x00];
        let mut decoder = Decoder::new(&data);
        assert_eq!(decoder.read_tag().unwrap(), Some((0, 0)));
    }

    #[test]
    fn test_read_tag_number_too_large() {
        // field number 2^29 with wire type 0
        let data = [0x80, 0x80, 0x80, 0x80, 0x10];
        let mut decoder = Decoder::new(&data);
        assert!(matches!(
            decoder.read_tag(),
            Err(Error::InvalidFieldNumber { number: 536_870_912, offset: 0 })
        ));
    }

    #[test]
    fn test_read_varint32_truncates() {
        // -1 as int64 on the wire
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut decoder = Decoder::new(&data);
        assert_eq!(decoder.read_varint32().unwrap(), u32::MAX);
        assert_eq!(decoder.position(), 10);
    }

    #[test]
    fn test_malformed_varint_offset() {
        let mut data = vec![0x08];
        data.extend_from_slice(&[0xFF; 11]);
        let mut decoder = Decoder::new(&data);
        decoder.read_tag().unwrap();
        assert!(matches!(
            decoder.read_varint64(),
            Err(Error::MalformedVarint { offset: 1 })
        ));
    }

    #[test]
    fn test_fixed_reads() {
        let data = [0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = Decoder::new(&data);
        assert_eq!(decoder.read_fixed32().unwrap(), 1);
        assert_eq!(decoder.read_fixed64().unwrap(), u64::MAX);
        assert!(matches!(
            decoder.read_fixed32(),
            Err(Error::Truncated { offset: 12, needed: 4 })
        ));
    }

    #[test]
    fn test_limits_scope_reads() {
        let data = [0x03, b'a', b'b', b'c', 0x08, 0x01];
        let mut decoder = Decoder::new(&data);
        let len = decoder.read_length().unwrap();
        let old = decoder.push_limit(len).unwrap();
        assert_eq!(decoder.limit(), 4);
        assert_eq!(decoder.read_string(3).unwrap(), "abc");
        assert!(!decoder.is_readable());
        decoder.pop_limit(old);
        assert!(decoder.is_readable());
        assert_eq!(decoder.read_tag().unwrap(), Some((1, 0)));
    }

    #[test]
    fn test_length_overrun() {
        let data = [0x05, b'a'];
        let mut decoder = Decoder::new(&data);
        assert!(matches!(
            decoder.read_length(),
            Err(Error::LengthOverrun { length: 5, available: 1, offset: 1 })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let data = [0xC3, 0x28];
        let mut decoder = Decoder::new(&data);
        assert!(matches!(
            decoder.read_string(2),
            Err(Error::InvalidUtf8 { offset: 0 })
        ));
    }

    #[test]
    fn test_set_limit_bounds() {
        let data = [0u8; 4];
        let mut decoder = Decoder::new(&data);
        assert!(decoder.set_limit(2).is_ok());
        assert_eq!(decoder.remaining(), 2);
        assert!(decoder.set_limit(5).is_err());
    }
}
