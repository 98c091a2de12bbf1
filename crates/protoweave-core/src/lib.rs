//! # protoweave-core
//!
//! A schema-driven Protocol Buffers codec that converts messages between the
//! binary wire format and Protobuf-JSON without generated code.
//!
//! Every format speaks one streaming protocol, the [`ProtoVisitor`]. Readers
//! turn input into visitor calls; writers are visitors that produce output.
//! Any reader can drive any writer, so format conversion never needs an
//! intermediate message tree.
//!
//! ## Architecture
//!
//! - [`schema`]: Runtime message/enum/field model, built by hand or from
//!   `FileDescriptorSet`s
//! - [`wire`]: Varints, tags and the low-level decoder/encoder
//! - [`visitor`]: The visitor protocol plus [`ChainVisitor`] and
//!   [`RecordingVisitor`]
//! - [`binary`]: [`WireReader`] and the two-pass [`WireWriter`]
//! - [`json`]: [`JsonReader`], [`JsonWriter`] and the well-known type forms
//! - [`value`]: [`DynamicMessage`], an owned message value
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use protoweave_core::{FieldSpec, JsonWriter, ScalarKind, SchemaBuilder, WireReader};
//!
//! let mut builder = SchemaBuilder::new();
//! let id = builder.message("demo.Greeting");
//! builder
//!     .add_field(id, FieldSpec::scalar(1, "text", ScalarKind::String))
//!     .add_field(id, FieldSpec::scalar(2, "count", ScalarKind::Int64));
//! let schema = builder.build()?;
//!
//! let mut writer = JsonWriter::new(&schema);
//! WireReader::new(&schema).read(id, b"\x0a\x02hi\x10\x2a", &mut writer)?;
//! assert_eq!(writer.finish()?, r#"{"text":"hi","count":"42"}"#);
//! # Ok::<(), protoweave_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! Implement [`ProtoVisitor`] to consume messages in a new way, or [`Emit`]
//! to feed a custom message representation into the writers.
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod binary;
pub mod error;
pub mod json;
pub mod schema;
pub mod value;
pub mod visitor;
pub mod wire;

// Re-export primary types for convenience
pub use binary::{ReaderConfig, WireReader, WireWriter};
pub use error::{Error, ErrorKind, Result};
pub use json::{JsonReader, JsonReaderConfig, JsonWriter, JsonWriterConfig};
pub use schema::{
    EnumId, Field, FieldSpec, FieldType, MessageId, MessageType, ScalarKind, Schema,
    SchemaBuilder, WellKnownType,
};
pub use value::{DynamicMessage, FieldValue, MessageBuilder, UnknownValue, Value};
pub use visitor::{ChainVisitor, Emit, ProtoVisitor, RecordingVisitor, Scalar};
pub use wire::WireType;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
