use pretty_assertions::assert_eq;
use protoweave_core::binary::{self, ReaderConfig};
use protoweave_core::visitor::VisitEvent;
use protoweave_core::{
    ChainVisitor, DynamicMessage, Error, Field, FieldSpec, FieldType, FieldValue, JsonWriter,
    MessageId, RecordingVisitor, ScalarKind, Schema, SchemaBuilder, Value, WireReader,
};

struct Fixture {
    schema: Schema,
    outer: MessageId,
    inner: MessageId,
}

fn fixture() -> Fixture {
    let mut builder = SchemaBuilder::new();
    let outer = builder.message("test.Outer");
    let inner = builder.message("test.Inner");
    builder
        .add_field(outer, FieldSpec::scalar(1, "signed", ScalarKind::Int32))
        .add_field(outer, FieldSpec::scalar(2, "zigzag", ScalarKind::SInt32))
        .add_field(outer, FieldSpec::scalar(3, "fixed", ScalarKind::Fixed32))
        .add_field(outer, FieldSpec::scalar(4, "real", ScalarKind::Double))
        .add_field(outer, FieldSpec::scalar(5, "flag", ScalarKind::Bool))
        .add_field(outer, FieldSpec::scalar(6, "huge", ScalarKind::UInt64))
        .add_field(outer, FieldSpec::scalar(7, "name", ScalarKind::String))
        .add_field(outer, FieldSpec::new(8, "inner", FieldType::Message(inner)))
        .add_field(outer, FieldSpec::scalar(9, "ids", ScalarKind::Int32).repeated())
        .add_field(
            outer,
            FieldSpec::scalar(10, "loose", ScalarKind::Int32)
                .repeated()
                .packed(false),
        )
        .add_field(inner, FieldSpec::scalar(1, "a", ScalarKind::Int32))
        .add_field(inner, FieldSpec::scalar(2, "b", ScalarKind::SInt64));
    Fixture {
        schema: builder.build().unwrap(),
        outer,
        inner,
    }
}

#[test]
fn test_scalar_boundaries_encode_exactly() {
    let fixture = fixture();
    let mut message = DynamicMessage::new(fixture.outer);
    message
        .set(1, Value::Int32(-1))
        .set(2, Value::SInt32(-1))
        .set(3, Value::Fixed32(0xDEAD_BEEF))
        .set(4, Value::Double(1.0))
        .set(5, Value::Bool(true))
        .set(6, Value::UInt64(u64::MAX));

    let mut expected = vec![0x08];
    expected.extend([0xFF; 9]);
    expected.extend([0x01, 0x10, 0x01, 0x1D, 0xEF, 0xBE, 0xAD, 0xDE]);
    expected.extend([0x21, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F, 0x28, 0x01, 0x30]);
    expected.extend([0xFF; 9]);
    expected.push(0x01);

    let bytes = message.encode_to_vec(&fixture.schema).unwrap();
    assert_eq!(bytes, expected);
    assert_eq!(
        DynamicMessage::decode(&fixture.schema, fixture.outer, &bytes).unwrap(),
        message
    );
}

#[test]
fn test_extreme_values_survive() {
    let fixture = fixture();
    let mut inner = DynamicMessage::new(fixture.inner);
    inner.set(1, Value::Int32(i32::MIN)).set(2, Value::SInt64(i64::MIN));
    let mut message = DynamicMessage::new(fixture.outer);
    message
        .set(2, Value::SInt32(i32::MAX))
        .set(4, Value::Double(f64::MIN_POSITIVE))
        .set(7, Value::String("ünïcödé".into()))
        .set(8, Value::Message(inner));
    for id in [i32::MIN, -1, 0, i32::MAX] {
        message.push(9, Value::Int32(id));
    }

    let bytes = message.encode_to_vec(&fixture.schema).unwrap();
    let decoded = DynamicMessage::decode(&fixture.schema, fixture.outer, &bytes).unwrap();
    assert_eq!(decoded, message);
    assert_eq!(decoded.encode_to_vec(&fixture.schema).unwrap(), bytes);
}

#[test]
fn test_concatenation_merges() {
    let fixture = fixture();
    let first = [
        0x3A, 0x01, b'a', // name = "a"
        0x42, 0x02, 0x08, 0x01, // inner.a = 1
        0x4A, 0x01, 0x05, // ids = [5]
    ];
    let second = [
        0x3A, 0x01, b'b', // name = "b"
        0x42, 0x02, 0x10, 0x04, // inner.b = 2
        0x48, 0x06, // ids += 6, unpacked
    ];
    let joined = [&first[..], &second[..]].concat();
    let message = DynamicMessage::decode(&fixture.schema, fixture.outer, &joined).unwrap();

    assert_eq!(message.get_single(7), Some(&Value::String("b".into())));
    let inner = message.get_single(8).and_then(Value::as_message).unwrap();
    assert_eq!(inner.get_single(1), Some(&Value::Int32(1)));
    assert_eq!(inner.get_single(2), Some(&Value::SInt64(2)));
    assert_eq!(
        message.get(9),
        Some(&FieldValue::List(vec![Value::Int32(5), Value::Int32(6)]))
    );
}

#[test]
fn test_packing_follows_the_schema_on_output() {
    let fixture = fixture();
    // `ids` arrives unpacked and `loose` arrives packed
    let bytes = [0x48, 0x01, 0x48, 0x02, 0x52, 0x02, 0x03, 0x04];
    let message = DynamicMessage::decode(&fixture.schema, fixture.outer, &bytes).unwrap();
    assert_eq!(
        message.get(10),
        Some(&FieldValue::List(vec![Value::Int32(3), Value::Int32(4)]))
    );
    assert_eq!(
        message.encode_to_vec(&fixture.schema).unwrap(),
        vec![0x4A, 0x02, 0x01, 0x02, 0x50, 0x03, 0x50, 0x04]
    );
}

#[test]
fn test_unknown_fields_round_trip_verbatim() {
    let fixture = fixture();
    let mut narrow = SchemaBuilder::new();
    let id = narrow.message("test.Outer");
    narrow.add_field(id, FieldSpec::scalar(7, "name", ScalarKind::String));
    let narrow = narrow.build().unwrap();

    let mut full = DynamicMessage::new(fixture.outer);
    full.set(1, Value::Int32(-3))
        .set(3, Value::Fixed32(9))
        .set(4, Value::Double(2.5))
        .set(7, Value::String("kept".into()));
    let mut inner = DynamicMessage::new(fixture.inner);
    inner.set(1, Value::Int32(1));
    full.set(8, Value::Message(inner));
    let bytes = full.encode_to_vec(&fixture.schema).unwrap();

    let partial = DynamicMessage::decode(&narrow, id, &bytes).unwrap();
    assert_eq!(partial.unknown_fields().count(), 4);
    let reencoded = partial.encode_to_vec(&narrow).unwrap();
    assert_eq!(
        DynamicMessage::decode(&fixture.schema, fixture.outer, &reencoded).unwrap(),
        full
    );
}

#[test]
fn test_every_truncation_is_a_clean_decode_error() {
    let fixture = fixture();
    let mut message = DynamicMessage::new(fixture.outer);
    let mut inner = DynamicMessage::new(fixture.inner);
    inner.set(2, Value::SInt64(-70_000));
    message
        .set(1, Value::Int32(-5))
        .set(4, Value::Double(0.1))
        .set(7, Value::String("truncate me".into()))
        .set(8, Value::Message(inner));
    message.push(9, Value::Int32(1)).push(9, Value::Int32(1_000_000));
    let bytes = message.encode_to_vec(&fixture.schema).unwrap();

    for end in 0..bytes.len() {
        if let Err(err) = DynamicMessage::decode(&fixture.schema, fixture.outer, &bytes[..end]) {
            assert!(err.is_decode(), "prefix {}: {}", end, err);
        }
    }
}

#[test]
fn test_malformed_input() {
    let fixture = fixture();
    let decode = |bytes: &[u8]| DynamicMessage::decode(&fixture.schema, fixture.outer, bytes);

    assert!(matches!(decode(&[0x3A, 0x05, b'a']), Err(Error::LengthOverrun { .. })));
    assert!(matches!(decode(&[0x3A, 0x01, 0xFF]), Err(Error::InvalidUtf8 { .. })));
    assert!(matches!(decode(&[0x0E]), Err(Error::InvalidWireType { .. })));
    assert!(matches!(decode(&[0x00]), Err(Error::InvalidFieldNumber { .. })));
    let runaway = [0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    assert!(decode(&runaway).unwrap_err().is_decode());

    let deep = [0x42, 0x02, 0x08, 0x01];
    let mut builder = protoweave_core::MessageBuilder::new(&fixture.schema);
    let err = WireReader::new(&fixture.schema)
        .with_config(ReaderConfig::new().max_depth(0))
        .read(fixture.outer, &deep, &mut builder)
        .unwrap_err();
    assert!(matches!(err, Error::RecursionLimit { limit: 0 }));
}

#[test]
fn test_chain_splits_a_stream() {
    let fixture = fixture();
    let bytes = [
        0x3A, 0x02, b'h', b'i', // name = "hi"
        0x42, 0x02, 0x08, 0x07, // inner.a = 7
        0x4A, 0x02, 0x01, 0x02, // ids = [1, 2]
    ];

    let mut rest = RecordingVisitor::new();
    let writer = JsonWriter::new(&fixture.schema);
    let mut chain = ChainVisitor::new(writer, |f: &Field| f.number() == 7).with_next(&mut rest);
    WireReader::new(&fixture.schema)
        .read(fixture.outer, &bytes, &mut chain)
        .unwrap();
    assert_eq!(chain.into_primary().finish().unwrap(), r#"{"name":"hi"}"#);

    assert_eq!(
        rest.into_events(),
        vec![
            VisitEvent::Init("test.Outer".into()),
            VisitEvent::Enter(8),
            VisitEvent::Scalar { field: 1, value: Value::Int32(7) },
            VisitEvent::Leave(8),
            VisitEvent::EnterPacked(9),
            VisitEvent::Scalar { field: 9, value: Value::Int32(1) },
            VisitEvent::Scalar { field: 9, value: Value::Int32(2) },
            VisitEvent::LeavePacked(9),
            VisitEvent::Destroy,
        ]
    );
}

#[test]
fn test_size_pass_matches_output() {
    let fixture = fixture();
    let mut message = DynamicMessage::new(fixture.outer);
    let mut inner = DynamicMessage::new(fixture.inner);
    inner.set(2, Value::SInt64(-1));
    message.set(8, Value::Message(inner)).set(7, Value::String("x".repeat(200)));

    let mut sizer = binary::SizeVisitor::new();
    protoweave_core::visitor::visit_message(&fixture.schema, &message, &mut sizer).unwrap();
    let bytes = binary::encode_to_vec(&fixture.schema, &message).unwrap();
    assert_eq!(sizer.total(), bytes.len());
    // 200-byte string needs a two-byte length prefix
    assert_eq!(bytes.len(), 4 + 3 + 200);
}
