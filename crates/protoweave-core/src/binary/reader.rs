//! Driving a visitor from binary wire data.

use crate::error::{Error, Result};
use crate::schema::{Field, FieldType, MessageId, MessageType, ScalarKind, Schema};
use crate::visitor::{ProtoVisitor, Scalar};
use crate::wire::{zigzag_decode32, zigzag_decode64, Decoder, WireType};
use tracing::{debug, trace};

/// Default limit on embedded message nesting
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Configuration for [`WireReader`]
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Maximum number of nested embedded messages
    pub max_depth: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReaderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Reads protobuf binary data against a schema, reporting every field to a
/// visitor.
///
/// Fields the schema does not declare are reported through a synthesized
/// unknown [`Field`]: varints as `int64`, I32 values as `fixed32`, I64
/// values as `fixed64` and length-delimited payloads as `bytes`. A declared
/// field arriving with an incompatible wire type takes the same path.
#[derive(Debug, Clone)]
pub struct WireReader<'s> {
    schema: &'s Schema,
    config: ReaderConfig,
}

impl<'s> WireReader<'s> {
    /// Creates a reader with the default configuration
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            config: ReaderConfig::default(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Reads one message of type `message_type` from `bytes`.
    ///
    /// The visitor sees exactly one `init`/`destroy` pair. Any decode error
    /// aborts the read.
    pub fn read<V>(&self, message_type: MessageId, bytes: &[u8], visitor: &mut V) -> Result<()>
    where
        V: ProtoVisitor + ?Sized,
    {
        let message = self.schema.message(message_type);
        debug!("Reading {} from {} bytes", message.full_name(), bytes.len());

        let mut decoder = Decoder::new(bytes);
        visitor.init(message)?;
        self.read_fields(message, &mut decoder, visitor, 0)?;
        visitor.destroy()
    }

    /// Reads fields until the decoder's window is exhausted.
    ///
    /// LEN data for a packable field is read as a packed run only when the
    /// field is repeated. A singular scalar or enum field receiving LEN data
    /// is kept as an unknown field, as reference protobuf parsers do.
    fn read_fields<V>(
        &self,
        message: &MessageType,
        decoder: &mut Decoder<'_>,
        visitor: &mut V,
        depth: usize,
    ) -> Result<()>
    where
        V: ProtoVisitor + ?Sized,
    {
        loop {
            let offset = decoder.position();
            let Some((number, raw)) = decoder.read_tag()? else {
                return Ok(());
            };
            if number == 0 {
                return Err(Error::invalid_field_number(0, offset));
            }
            let wire_type =
                WireType::try_from(raw).map_err(|_| Error::invalid_wire_type(raw, offset))?;

            match message.field(number) {
                Some(field) if field.wire_type() == wire_type => {
                    self.read_field(field, decoder, visitor, depth)?
                }
                Some(field)
                    if wire_type == WireType::Len
                        && field.is_repeated()
                        && field.field_type().is_packable() =>
                {
                    read_packed(field, decoder, visitor)?
                }
                known => {
                    if known.is_some() {
                        trace!(
                            "Field {} of {} arrived as {}, keeping it as unknown",
                            number,
                            message.full_name(),
                            wire_type.as_str()
                        );
                    }
                    let field = message.unknown_field(number, wire_type);
                    read_unknown(&field, wire_type, decoder, visitor)?
                }
            }
        }
    }

    fn read_field<V>(
        &self,
        field: &Field,
        decoder: &mut Decoder<'_>,
        visitor: &mut V,
        depth: usize,
    ) -> Result<()>
    where
        V: ProtoVisitor + ?Sized,
    {
        match field.field_type() {
            FieldType::Message(id) => {
                if depth >= self.config.max_depth {
                    return Err(Error::RecursionLimit {
                        limit: self.config.max_depth,
                    });
                }
                let len = decoder.read_length()?;
                let old = decoder.push_limit(len)?;
                visitor.enter(field)?;
                self.read_fields(self.schema.message(id), decoder, visitor, depth + 1)?;
                visitor.leave(field)?;
                decoder.pop_limit(old);
                Ok(())
            }
            FieldType::Scalar(ScalarKind::String) => {
                let len = decoder.read_length()?;
                let value = decoder.read_string(len)?;
                visitor.visit_string(field, value)
            }
            FieldType::Scalar(ScalarKind::Bytes) => {
                let len = decoder.read_length()?;
                let value = decoder.read_bytes(len)?;
                visitor.visit_bytes(field, value)
            }
            _ => read_scalar(field, decoder)?.visit(field, visitor),
        }
    }
}

/// Decodes one non-length-delimited value of `field`
fn read_scalar<'a>(field: &Field, decoder: &mut Decoder<'a>) -> Result<Scalar<'a>> {
    let kind = match field.field_type() {
        FieldType::Enum(_) => return Ok(Scalar::Enum(decoder.read_varint64()? as i32)),
        FieldType::Scalar(kind) => kind,
        other => {
            return Err(Error::internal(format!(
                "field {} of type {:?} has no scalar encoding",
                field.number(),
                other
            )))
        }
    };

    Ok(match kind {
        ScalarKind::Int32 => Scalar::Int32(decoder.read_varint64()? as i32),
        ScalarKind::Int64 => Scalar::Int64(decoder.read_varint64()? as i64),
        ScalarKind::UInt32 => Scalar::UInt32(decoder.read_varint32()?),
        ScalarKind::UInt64 => Scalar::UInt64(decoder.read_varint64()?),
        ScalarKind::SInt32 => Scalar::SInt32(zigzag_decode32(decoder.read_varint32()?)),
        ScalarKind::SInt64 => Scalar::SInt64(zigzag_decode64(decoder.read_varint64()?)),
        ScalarKind::Bool => Scalar::Bool(decoder.read_varint64()? != 0),
        ScalarKind::Fixed32 => Scalar::Fixed32(decoder.read_fixed32()?),
        ScalarKind::SFixed32 => Scalar::SFixed32(decoder.read_fixed32()? as i32),
        ScalarKind::Float => Scalar::Float(f32::from_bits(decoder.read_fixed32()?)),
        ScalarKind::Fixed64 => Scalar::Fixed64(decoder.read_fixed64()?),
        ScalarKind::SFixed64 => Scalar::SFixed64(decoder.read_fixed64()? as i64),
        ScalarKind::Double => Scalar::Double(f64::from_bits(decoder.read_fixed64()?)),
        ScalarKind::String | ScalarKind::Bytes => {
            return Err(Error::internal(format!(
                "field {} is length-delimited, not packable",
                field.number()
            )))
        }
    })
}

/// Reads a packed run, decoding values until its window is exhausted
fn read_packed<V>(field: &Field, decoder: &mut Decoder<'_>, visitor: &mut V) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
{
    let len = decoder.read_length()?;
    if len == 0 {
        return Ok(());
    }
    let old = decoder.push_limit(len)?;
    visitor.enter_packed(field)?;
    while decoder.is_readable() {
        read_scalar(field, decoder)?.visit(field, visitor)?;
    }
    visitor.leave_packed(field)?;
    decoder.pop_limit(old);
    Ok(())
}

fn read_unknown<V>(
    field: &Field,
    wire_type: WireType,
    decoder: &mut Decoder<'_>,
    visitor: &mut V,
) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
{
    match wire_type {
        WireType::Varint => visitor.visit_int64(field, decoder.read_varint64()? as i64),
        WireType::I32 => visitor.visit_fixed32(field, decoder.read_fixed32()?),
        WireType::I64 => visitor.visit_fixed64(field, decoder.read_fixed64()?),
        WireType::Len => {
            let len = decoder.read_length()?;
            visitor.visit_bytes(field, decoder.read_bytes(len)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SchemaBuilder};
    use crate::value::Value;
    use crate::visitor::{RecordingVisitor, VisitEvent};
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MessageId) {
        let mut builder = SchemaBuilder::new();
        let id = builder.message("test.Reader");
        let color = builder.enumeration("test.Color");
        builder.enum_value(color, "RED", 0).enum_value(color, "BLUE", 1);
        builder
            .add_field(id, FieldSpec::scalar(1, "i32", ScalarKind::Int32))
            .add_field(id, FieldSpec::scalar(2, "s32", ScalarKind::SInt32))
            .add_field(id, FieldSpec::scalar(3, "name", ScalarKind::String))
            .add_field(id, FieldSpec::scalar(4, "nums", ScalarKind::UInt32).repeated())
            .add_field(id, FieldSpec::new(5, "child", FieldType::Message(id)))
            .add_field(id, FieldSpec::new(6, "color", FieldType::Enum(color)))
            .add_field(id, FieldSpec::scalar(7, "ratio", ScalarKind::Float))
            .add_field(id, FieldSpec::scalar(8, "flag", ScalarKind::Bool));
        (builder.build().unwrap(), id)
    }

    fn record(bytes: &[u8]) -> Result<Vec<VisitEvent>> {
        let (schema, id) = schema();
        let mut recorder = RecordingVisitor::new();
        WireReader::new(&schema).read(id, bytes, &mut recorder)?;
        Ok(recorder.into_events())
    }

    fn scalar(field: u32, value: Value) -> VisitEvent {
        VisitEvent::Scalar { field, value }
    }

    #[test]
    fn test_scalars() {
        let bytes = [
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, // i32 = -1
            0x10, 0x03, // s32 = -2
            0x1A, 0x02, b'h', b'i', // name = "hi"
            0x30, 0x05, // color = 5 (unknown number)
            0x3D, 0x00, 0x00, 0x80, 0x3F, // ratio = 1.0
            0x40, 0x02, // flag = true
        ];
        assert_eq!(
            record(&bytes).unwrap(),
            vec![
                VisitEvent::Init("test.Reader".into()),
                scalar(1, Value::Int32(-1)),
                scalar(2, Value::SInt32(-2)),
                scalar(3, Value::String("hi".into())),
                scalar(6, Value::Enum(5)),
                scalar(7, Value::Float(1.0)),
                scalar(8, Value::Bool(true)),
                VisitEvent::Destroy,
            ]
        );
    }

    #[test]
    fn test_packed_and_unpacked_input() {
        let bytes = [0x22, 0x02, 0x01, 0x02, 0x20, 0x03, 0x22, 0x00];
        assert_eq!(
            record(&bytes).unwrap(),
            vec![
                VisitEvent::Init("test.Reader".into()),
                VisitEvent::EnterPacked(4),
                scalar(4, Value::UInt32(1)),
                scalar(4, Value::UInt32(2)),
                VisitEvent::LeavePacked(4),
                scalar(4, Value::UInt32(3)),
                VisitEvent::Destroy,
            ]
        );
    }

    #[test]
    fn test_embedded_message() {
        let bytes = [0x2A, 0x02, 0x08, 0x07, 0x08, 0x01];
        assert_eq!(
            record(&bytes).unwrap(),
            vec![
                VisitEvent::Init("test.Reader".into()),
                VisitEvent::Enter(5),
                scalar(1, Value::Int32(7)),
                VisitEvent::Leave(5),
                scalar(1, Value::Int32(1)),
                VisitEvent::Destroy,
            ]
        );
    }

    #[test]
    fn test_unknown_fields() {
        let bytes = [
            0x48, 0x96, 0x01, // 9: varint 150
            0x55, 0x01, 0x00, 0x00, 0x00, // 10: fixed32 1
            0x59, 0x02, 0, 0, 0, 0, 0, 0, 0, // 11: fixed64 2
            0x62, 0x01, 0xAA, // 12: bytes
            0x0A, 0x01, 0x01, // 1 as LEN: wire type mismatch
        ];
        assert_eq!(
            record(&bytes).unwrap(),
            vec![
                VisitEvent::Init("test.Reader".into()),
                scalar(9, Value::Int64(150)),
                scalar(10, Value::Fixed32(1)),
                scalar(11, Value::Fixed64(2)),
                scalar(12, Value::Bytes(vec![0xAA])),
                scalar(1, Value::Bytes(vec![0x01])),
                VisitEvent::Destroy,
            ]
        );
    }

    #[test]
    fn test_singular_scalar_with_len_data_is_unknown() {
        let (schema, id) = schema();
        // i32 (field 1) framed as a one-value packed run
        let bytes = [0x0A, 0x01, 0x07, 0x08, 0x02];
        let message = crate::binary::decode(&schema, id, &bytes).unwrap();
        assert_eq!(message.get_single(1), Some(&Value::Int32(2)));
        let unknown: Vec<_> = message
            .unknown_fields()
            .map(|(number, values)| (number, values.len()))
            .collect();
        assert_eq!(unknown, vec![(1, 1)]);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            record(&[0x00, 0x01]),
            Err(Error::InvalidFieldNumber { number: 0, offset: 0 })
        ));
        assert!(matches!(
            record(&[0x08, 0x01, 0x0B]),
            Err(Error::InvalidWireType { value: 3, offset: 2 })
        ));
        assert!(matches!(
            record(&[0x1A, 0x05, b'a']),
            Err(Error::LengthOverrun { length: 5, .. })
        ));
        assert!(matches!(
            record(&[0x1A, 0x01, 0xFF]),
            Err(Error::InvalidUtf8 { offset: 2 })
        ));
        assert!(matches!(record(&[0x08]), Err(Error::Truncated { offset: 1, .. })));
        assert!(matches!(
            record(&[0x3D, 0x00, 0x00]),
            Err(Error::Truncated { .. })
        ));
        // packed run whose last varint crosses the window
        assert!(matches!(
            record(&[0x22, 0x01, 0x80, 0x01]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let (schema, id) = schema();
        // three levels of `child`
        let bytes = [0x2A, 0x04, 0x2A, 0x02, 0x2A, 0x00];
        let reader = WireReader::new(&schema).with_config(ReaderConfig::new().max_depth(2));
        let mut recorder = RecordingVisitor::new();
        assert!(matches!(
            reader.read(id, &bytes, &mut recorder),
            Err(Error::RecursionLimit { limit: 2 })
        ));

        let reader = WireReader::new(&schema).with_config(ReaderConfig::new().max_depth(3));
        assert!(reader.read(id, &bytes, &mut RecordingVisitor::new()).is_ok());
    }
}
