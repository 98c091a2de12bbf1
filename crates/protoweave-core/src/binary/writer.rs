//! Two-pass binary encoding.
//!
//! The first pass runs a [`SizeVisitor`] over the traversal and records the
//! body length of every embedded message and packed run in a flat array, in
//! the order their brackets open. The second pass replays the same
//! traversal through an [`EncodeVisitor`] that writes into a buffer sized
//! from the first pass, taking length prefixes from the array with a cursor.

use crate::error::{Error, Result};
use crate::schema::{Field, MessageId, MessageType, Schema};
use crate::visitor::{Emit, ProtoVisitor, Scalar};
use crate::wire::{tag_size, varint_size32, varint_size64, zigzag_encode32, zigzag_encode64};
use crate::wire::{Encoder, WireType};
use tracing::debug;

/// Encoded size of a scalar value, without its tag
pub fn scalar_size(value: &Scalar<'_>) -> usize {
    match *value {
        Scalar::Int32(v) | Scalar::Enum(v) => varint_size64(v as i64 as u64),
        Scalar::Int64(v) => varint_size64(v as u64),
        Scalar::UInt32(v) => varint_size32(v),
        Scalar::UInt64(v) => varint_size64(v),
        Scalar::SInt32(v) => varint_size32(zigzag_encode32(v)),
        Scalar::SInt64(v) => varint_size64(zigzag_encode64(v)),
        Scalar::Bool(_) => 1,
        Scalar::Fixed32(_) | Scalar::SFixed32(_) | Scalar::Float(_) => 4,
        Scalar::Fixed64(_) | Scalar::SFixed64(_) | Scalar::Double(_) => 8,
        Scalar::String(v) => varint_size64(v.len() as u64) + v.len(),
        Scalar::Bytes(v) => varint_size64(v.len() as u64) + v.len(),
    }
}

#[derive(Debug)]
struct Frame {
    slot: usize,
    len: usize,
    packed: bool,
}

/// First pass: measures a traversal
#[derive(Debug, Default)]
pub struct SizeVisitor {
    lengths: Vec<usize>,
    frames: Vec<Frame>,
    total: usize,
}

impl SizeVisitor {
    /// Creates an empty size pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Total encoded size of the last complete traversal
    pub fn total(&self) -> usize {
        self.total
    }

    /// Recorded body lengths, in bracket-opening order
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Consumes the pass, returning the total size and the length array
    pub fn into_parts(self) -> (usize, Vec<usize>) {
        (self.total, self.lengths)
    }

    fn top(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::unsupported("size pass received a value outside of init/destroy"))
    }

    fn open(&mut self, packed: bool) -> Result<()> {
        if self.frames.is_empty() {
            return Err(Error::unsupported("size pass opened a bracket before init"));
        }
        let slot = self.lengths.len();
        self.lengths.push(0);
        self.frames.push(Frame { slot, len: 0, packed });
        Ok(())
    }

    fn close(&mut self, field: &Field) -> Result<()> {
        if self.frames.len() < 2 {
            return Err(Error::unsupported(format!(
                "size pass closed field {} without a matching bracket",
                field.number()
            )));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("size pass frame stack underflow"))?;
        self.lengths[frame.slot] = frame.len;
        let framed = tag_size(field.number()) + varint_size64(frame.len as u64) + frame.len;
        self.top()?.len += framed;
        Ok(())
    }
}

impl ProtoVisitor for SizeVisitor {
    fn init(&mut self, _message: &MessageType) -> Result<()> {
        self.lengths.clear();
        self.frames.clear();
        self.total = 0;
        self.frames.push(Frame {
            slot: usize::MAX,
            len: 0,
            packed: false,
        });
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.frames.len() != 1 {
            return Err(Error::unsupported(format!(
                "size pass ended with {} open bracket(s)",
                self.frames.len().saturating_sub(1)
            )));
        }
        self.total = self.top()?.len;
        self.frames.clear();
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        let frame = self.top()?;
        let tag = if frame.packed { 0 } else { tag_size(field.number()) };
        frame.len += tag + scalar_size(&value);
        Ok(())
    }

    fn enter(&mut self, _field: &Field) -> Result<()> {
        self.open(false)
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        self.close(field)
    }

    fn enter_packed(&mut self, _field: &Field) -> Result<()> {
        self.open(true)
    }

    fn leave_packed(&mut self, field: &Field) -> Result<()> {
        self.close(field)
    }
}

/// Second pass: writes a traversal measured by [`SizeVisitor`]
#[derive(Debug)]
pub struct EncodeVisitor {
    encoder: Encoder,
    lengths: Vec<usize>,
    cursor: usize,
    packed: bool,
}

impl EncodeVisitor {
    /// Creates an encode pass from the results of a size pass
    pub fn new(total: usize, lengths: Vec<usize>) -> Self {
        Self {
            encoder: Encoder::new(total),
            lengths,
            cursor: 0,
            packed: false,
        }
    }

    /// Consumes the pass, returning the encoded bytes
    pub fn finish(self) -> Vec<u8> {
        self.encoder.finish()
    }

    fn open(&mut self, field: &Field) -> Result<()> {
        let len = self.lengths.get(self.cursor).copied().ok_or_else(|| {
            Error::internal(format!(
                "encode pass opened more brackets than were measured (field {})",
                field.number()
            ))
        })?;
        self.cursor += 1;
        self.encoder.write_tag(field.number(), WireType::Len)?;
        self.encoder.write_varint64(len as u64)
    }
}

impl ProtoVisitor for EncodeVisitor {
    fn init(&mut self, _message: &MessageType) -> Result<()> {
        self.cursor = 0;
        self.packed = false;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.cursor != self.lengths.len() || self.encoder.remaining() != 0 {
            return Err(Error::internal(format!(
                "encode pass diverged from size pass: {} of {} lengths used, {} bytes unwritten",
                self.cursor,
                self.lengths.len(),
                self.encoder.remaining()
            )));
        }
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        let encoder = &mut self.encoder;
        if !self.packed {
            encoder.write_tag(field.number(), value.wire_type())?;
        }
        match value {
            Scalar::Int32(v) | Scalar::Enum(v) => encoder.write_varint64(v as i64 as u64),
            Scalar::Int64(v) => encoder.write_varint64(v as u64),
            Scalar::UInt32(v) => encoder.write_varint32(v),
            Scalar::UInt64(v) => encoder.write_varint64(v),
            Scalar::SInt32(v) => encoder.write_varint32(zigzag_encode32(v)),
            Scalar::SInt64(v) => encoder.write_varint64(zigzag_encode64(v)),
            Scalar::Bool(v) => encoder.write_varint32(v as u32),
            Scalar::Fixed32(v) => encoder.write_fixed32(v),
            Scalar::SFixed32(v) => encoder.write_fixed32(v as u32),
            Scalar::Float(v) => encoder.write_fixed32(v.to_bits()),
            Scalar::Fixed64(v) => encoder.write_fixed64(v),
            Scalar::SFixed64(v) => encoder.write_fixed64(v as u64),
            Scalar::Double(v) => encoder.write_fixed64(v.to_bits()),
            Scalar::String(v) => {
                encoder.write_varint64(v.len() as u64)?;
                encoder.write_string(v)
            }
            Scalar::Bytes(v) => {
                encoder.write_varint64(v.len() as u64)?;
                encoder.write_bytes(v)
            }
        }
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        self.open(field)
    }

    fn leave(&mut self, _field: &Field) -> Result<()> {
        Ok(())
    }

    fn enter_packed(&mut self, field: &Field) -> Result<()> {
        self.open(field)?;
        self.packed = true;
        Ok(())
    }

    fn leave_packed(&mut self, _field: &Field) -> Result<()> {
        self.packed = false;
        Ok(())
    }
}

/// Encodes traversals to the binary wire format
#[derive(Debug, Clone, Copy)]
pub struct WireWriter<'s> {
    schema: &'s Schema,
}

impl<'s> WireWriter<'s> {
    /// Creates a writer over `schema`
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Encodes a traversal of a `root` message produced by `drive`.
    ///
    /// `drive` runs twice and must produce the same field calls both times;
    /// `init` and `destroy` are issued here.
    pub fn encode_with<F>(&self, root: MessageId, mut drive: F) -> Result<Vec<u8>>
    where
        F: FnMut(&mut dyn ProtoVisitor) -> Result<()>,
    {
        let message = self.schema.message(root);

        let mut sizer = SizeVisitor::new();
        sizer.init(message)?;
        drive(&mut sizer)?;
        sizer.destroy()?;
        let (total, lengths) = sizer.into_parts();
        debug!(
            "Encoding {}: {} bytes, {} nested lengths",
            message.full_name(),
            total,
            lengths.len()
        );

        let mut encoder = EncodeVisitor::new(total, lengths);
        encoder.init(message)?;
        drive(&mut encoder)?;
        encoder.destroy()?;
        Ok(encoder.finish())
    }

    /// Encodes a message to a new byte vector
    pub fn encode_to_vec<E: Emit + ?Sized>(&self, message: &E) -> Result<Vec<u8>> {
        let schema = self.schema;
        self.encode_with(message.message_type(), |visitor| message.emit(schema, visitor))
    }
}

/// Encodes `message` to the binary wire format
pub fn encode_to_vec<E: Emit + ?Sized>(schema: &Schema, message: &E) -> Result<Vec<u8>> {
    WireWriter::new(schema).encode_to_vec(message)
}
