//! Protobuf-JSON (proto3 canonical JSON mapping).
//!
//! [`JsonReader`] drives any [`ProtoVisitor`](crate::visitor::ProtoVisitor)
//! from JSON text as it is parsed; [`JsonWriter`] is a visitor that writes
//! JSON as it is fed. Because both sides speak the visitor protocol,
//! binary-to-JSON is a [`WireReader`](crate::binary::WireReader) feeding a
//! [`JsonWriter`], and JSON-to-binary is a [`JsonReader`] feeding a
//! [`WireWriter`](crate::binary::WireWriter) traversal.

mod generator;
mod reader;
pub mod well_known;
mod writer;

pub use generator::{JsonGenerator, Layout};
pub use reader::{JsonReader, JsonReaderConfig};
pub use writer::{render, JsonWriter, JsonWriterConfig};

use crate::binary::{WireReader, WireWriter};
use crate::error::{Error, Result};
use crate::schema::{MessageId, Schema};
use crate::value::{DynamicMessage, MessageBuilder};
use crate::visitor::Emit;
use tracing::debug;

/// Renders any emittable message as compact Protobuf-JSON
pub fn to_json<E: Emit + ?Sized>(schema: &Schema, message: &E) -> Result<String> {
    render(schema, message, &JsonWriterConfig::default())
}

/// Parses Protobuf-JSON into a [`DynamicMessage`]
pub fn from_json(schema: &Schema, message_type: MessageId, json: &str) -> Result<DynamicMessage> {
    let mut builder = MessageBuilder::new(schema);
    JsonReader::new(schema).read(message_type, json, &mut builder)?;
    builder.finish()
}

/// Converts Protobuf-JSON straight to the binary wire format.
///
/// The text is parsed once for each pass of the writer; no tree is built.
pub fn json_to_binary(
    schema: &Schema,
    message_type: MessageId,
    json: &str,
    config: JsonReaderConfig,
) -> Result<Vec<u8>> {
    let reader = JsonReader::new(schema).with_config(config);
    WireWriter::new(schema).encode_with(message_type, |visitor| {
        reader.emit(message_type, json, visitor)
    })
}

/// Converts the binary wire format straight to Protobuf-JSON.
///
/// Bytes in canonical order stream straight into a [`JsonWriter`]. Input
/// that repeats a singular field or splits a repeated one (legal on the
/// wire, where it means merge) is decoded with merge semantics first and
/// rendered from the merged message.
pub fn binary_to_json(
    schema: &Schema,
    message_type: MessageId,
    bytes: &[u8],
    reader_config: crate::binary::ReaderConfig,
    writer_config: JsonWriterConfig,
) -> Result<String> {
    let reader = WireReader::new(schema).with_config(reader_config);
    let mut writer = JsonWriter::new(schema).with_config(writer_config.clone());
    match reader.read(message_type, bytes, &mut writer) {
        Ok(()) => writer.finish(),
        Err(Error::NonCanonicalOrder { message, field }) => {
            debug!(
                "Field {} of {} is split across the input, merging before rendering",
                field, message
            );
            let mut builder = MessageBuilder::new(schema);
            reader.read(message_type, bytes, &mut builder)?;
            render(schema, &builder.finish()?, &writer_config)
        }
        Err(err) => Err(err),
    }
}

impl DynamicMessage {
    /// Renders this message as compact Protobuf-JSON
    pub fn to_json(&self, schema: &Schema) -> Result<String> {
        render(schema, self, &JsonWriterConfig::default())
    }

    /// Parses a message from Protobuf-JSON
    pub fn from_json(schema: &Schema, message_type: MessageId, json: &str) -> Result<Self> {
        from_json(schema, message_type, json)
    }
}
