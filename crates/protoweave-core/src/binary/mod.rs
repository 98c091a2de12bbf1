//! The protobuf binary wire format.
//!
//! [`WireReader`] turns bytes into visitor calls; [`WireWriter`] turns a
//! replayable traversal back into bytes using a size pass followed by an
//! encode pass.

mod reader;
mod writer;

pub use reader::{ReaderConfig, WireReader, DEFAULT_MAX_DEPTH};
pub use writer::{encode_to_vec, scalar_size, EncodeVisitor, SizeVisitor, WireWriter};

use crate::error::Result;
use crate::schema::{MessageId, Schema};
use crate::value::{DynamicMessage, MessageBuilder};

/// Decodes `bytes` as a message of type `message_type`
pub fn decode(schema: &Schema, message_type: MessageId, bytes: &[u8]) -> Result<DynamicMessage> {
    let mut builder = MessageBuilder::new(schema);
    WireReader::new(schema).read(message_type, bytes, &mut builder)?;
    builder.finish()
}

impl DynamicMessage {
    /// Decodes a message from the binary wire format
    pub fn decode(schema: &Schema, message_type: MessageId, bytes: &[u8]) -> Result<Self> {
        decode(schema, message_type, bytes)
    }

    /// Encodes this message to the binary wire format
    pub fn encode_to_vec(&self, schema: &Schema) -> Result<Vec<u8>> {
        encode_to_vec(schema, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType, ScalarKind, SchemaBuilder};
    use crate::value::{FieldValue, Value};
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MessageId, MessageId) {
        let mut builder = SchemaBuilder::new();
        let outer = builder.message("test.Outer");
        let inner = builder.message("test.Inner");
        builder
            .add_field(outer, FieldSpec::scalar(1, "name", ScalarKind::String))
            .add_field(outer, FieldSpec::new(2, "inner", FieldType::Message(inner)))
            .add_field(outer, FieldSpec::scalar(3, "ids", ScalarKind::Int64).repeated())
            .add_field(inner, FieldSpec::scalar(1, "a", ScalarKind::Int32))
            .add_field(inner, FieldSpec::scalar(2, "b", ScalarKind::Int32));
        builder.add_map_field(
            outer,
            4,
            "counts",
            ScalarKind::String,
            FieldType::Scalar(ScalarKind::UInt32),
        );
        (builder.build().unwrap(), outer, inner)
    }

    #[test]
    fn test_round_trip() {
        let (schema, outer, inner) = schema();
        let mut nested = DynamicMessage::new(inner);
        nested.set(1, Value::Int32(-5));
        let mut message = DynamicMessage::new(outer);
        message
            .set(1, Value::String("weave".into()))
            .set(2, Value::Message(nested))
            .push(3, Value::Int64(i64::MIN))
            .push(3, Value::Int64(i64::MAX))
            .insert_map(4, Value::String("a".into()), Value::UInt32(1))
            .insert_map(4, Value::String("b".into()), Value::UInt32(u32::MAX));

        let bytes = message.encode_to_vec(&schema).unwrap();
        let decoded = DynamicMessage::decode(&schema, outer, &bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.encode_to_vec(&schema).unwrap(), bytes);
    }

    #[test]
    fn test_concatenation_merges() {
        let (schema, outer, inner) = schema();
        let mut first = DynamicMessage::new(outer);
        let mut a = DynamicMessage::new(inner);
        a.set(1, Value::Int32(1));
        first
            .set(1, Value::String("first".into()))
            .set(2, Value::Message(a))
            .push(3, Value::Int64(1));

        let mut second = DynamicMessage::new(outer);
        let mut b = DynamicMessage::new(inner);
        b.set(2, Value::Int32(2));
        second
            .set(1, Value::String("second".into()))
            .set(2, Value::Message(b))
            .push(3, Value::Int64(2));

        let mut bytes = first.encode_to_vec(&schema).unwrap();
        bytes.extend(second.encode_to_vec(&schema).unwrap());
        let decoded = DynamicMessage::decode(&schema, outer, &bytes).unwrap();

        let mut expected = first.clone();
        expected.merge(second);
        assert_eq!(decoded, expected);
        assert_eq!(
            decoded.get(3),
            Some(&FieldValue::List(vec![Value::Int64(1), Value::Int64(2)]))
        );
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let (schema, outer, _) = schema();
        // field 1 known; 7 (varint), 8 (fixed64) and 9 (LEN) unknown
        let bytes = vec![
            0x0A, 0x01, b'x', 0x38, 0x2A, 0x41, 1, 2, 3, 4, 5, 6, 7, 8, 0x4A, 0x03, 1, 2, 3,
        ];
        let decoded = DynamicMessage::decode(&schema, outer, &bytes).unwrap();
        assert_eq!(decoded.unknown_fields().count(), 3);
        assert_eq!(decoded.encode_to_vec(&schema).unwrap(), bytes);
    }
}
