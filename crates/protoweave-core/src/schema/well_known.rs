//! The `google.protobuf` well-known types.
//!
//! These messages have bespoke JSON shapes. A message is recognized as
//! well-known purely by its full name, so schemas imported from descriptors
//! get the same treatment as ones registered with
//! [`SchemaBuilder::with_well_known_types`].

use super::builder::{FieldSpec, SchemaBuilder};
use super::types::{FieldType, ScalarKind};

const PACKAGE: &str = "google.protobuf";

/// Well-known message types with special JSON mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    /// `google.protobuf.Duration`
    Duration,
    /// `google.protobuf.Timestamp`
    Timestamp,
    /// `google.protobuf.Struct`
    Struct,
    /// `google.protobuf.Value`
    Value,
    /// `google.protobuf.ListValue`
    ListValue,
    /// `google.protobuf.FieldMask`
    FieldMask,
    /// `google.protobuf.Empty`
    Empty,
    /// `google.protobuf.DoubleValue`
    DoubleValue,
    /// `google.protobuf.FloatValue`
    FloatValue,
    /// `google.protobuf.Int64Value`
    Int64Value,
    /// `google.protobuf.UInt64Value`
    UInt64Value,
    /// `google.protobuf.Int32Value`
    Int32Value,
    /// `google.protobuf.UInt32Value`
    UInt32Value,
    /// `google.protobuf.BoolValue`
    BoolValue,
    /// `google.protobuf.StringValue`
    StringValue,
    /// `google.protobuf.BytesValue`
    BytesValue,
}

impl WellKnownType {
    /// Every well-known message type
    pub const ALL: [WellKnownType; 16] = [
        WellKnownType::Duration,
        WellKnownType::Timestamp,
        WellKnownType::Struct,
        WellKnownType::Value,
        WellKnownType::ListValue,
        WellKnownType::FieldMask,
        WellKnownType::Empty,
        WellKnownType::DoubleValue,
        WellKnownType::FloatValue,
        WellKnownType::Int64Value,
        WellKnownType::UInt64Value,
        WellKnownType::Int32Value,
        WellKnownType::UInt32Value,
        WellKnownType::BoolValue,
        WellKnownType::StringValue,
        WellKnownType::BytesValue,
    ];

    /// Recognizes a well-known type by its full name
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let name = full_name.strip_prefix("google.protobuf.")?;
        Self::ALL.into_iter().find(|wkt| wkt.name() == name)
    }

    /// The fully-qualified message name
    pub fn full_name(&self) -> &'static str {
        match self {
            WellKnownType::Duration => "google.protobuf.Duration",
            WellKnownType::Timestamp => "google.protobuf.Timestamp",
            WellKnownType::Struct => "google.protobuf.Struct",
            WellKnownType::Value => "google.protobuf.Value",
            WellKnownType::ListValue => "google.protobuf.ListValue",
            WellKnownType::FieldMask => "google.protobuf.FieldMask",
            WellKnownType::Empty => "google.protobuf.Empty",
            WellKnownType::DoubleValue => "google.protobuf.DoubleValue",
            WellKnownType::FloatValue => "google.protobuf.FloatValue",
            WellKnownType::Int64Value => "google.protobuf.Int64Value",
            WellKnownType::UInt64Value => "google.protobuf.UInt64Value",
            WellKnownType::Int32Value => "google.protobuf.Int32Value",
            WellKnownType::UInt32Value => "google.protobuf.UInt32Value",
            WellKnownType::BoolValue => "google.protobuf.BoolValue",
            WellKnownType::StringValue => "google.protobuf.StringValue",
            WellKnownType::BytesValue => "google.protobuf.BytesValue",
        }
    }

    /// The message name inside `google.protobuf`
    pub fn name(&self) -> &'static str {
        &self.full_name()[PACKAGE.len() + 1..]
    }

    /// The scalar kind a wrapper type carries in field 1
    pub fn wrapped_kind(&self) -> Option<ScalarKind> {
        match self {
            WellKnownType::DoubleValue => Some(ScalarKind::Double),
            WellKnownType::FloatValue => Some(ScalarKind::Float),
            WellKnownType::Int64Value => Some(ScalarKind::Int64),
            WellKnownType::UInt64Value => Some(ScalarKind::UInt64),
            WellKnownType::Int32Value => Some(ScalarKind::Int32),
            WellKnownType::UInt32Value => Some(ScalarKind::UInt32),
            WellKnownType::BoolValue => Some(ScalarKind::Bool),
            WellKnownType::StringValue => Some(ScalarKind::String),
            WellKnownType::BytesValue => Some(ScalarKind::Bytes),
            _ => None,
        }
    }

    /// Returns true for the scalar wrapper types
    pub fn is_wrapper(&self) -> bool {
        self.wrapped_kind().is_some()
    }
}

/// Adds every well-known type to `builder`
pub(crate) fn register(builder: &mut SchemaBuilder) {
    let seconds_and_nanos = |builder: &mut SchemaBuilder, name: &str| {
        let id = builder.message_in(PACKAGE, name);
        builder
            .add_field(id, FieldSpec::scalar(1, "seconds", ScalarKind::Int64))
            .add_field(id, FieldSpec::scalar(2, "nanos", ScalarKind::Int32));
    };
    seconds_and_nanos(builder, "Duration");
    seconds_and_nanos(builder, "Timestamp");

    let null_value = builder.enumeration_in(PACKAGE, "NullValue");
    builder.enum_value(null_value, "NULL_VALUE", 0);

    let structure = builder.message_in(PACKAGE, "Struct");
    let value = builder.message_in(PACKAGE, "Value");
    let list = builder.message_in(PACKAGE, "ListValue");

    builder.add_map_field(
        structure,
        1,
        "fields",
        ScalarKind::String,
        FieldType::Message(value),
    );
    builder
        .add_field(value, FieldSpec::new(1, "null_value", FieldType::Enum(null_value)))
        .add_field(value, FieldSpec::scalar(2, "number_value", ScalarKind::Double))
        .add_field(value, FieldSpec::scalar(3, "string_value", ScalarKind::String))
        .add_field(value, FieldSpec::scalar(4, "bool_value", ScalarKind::Bool))
        .add_field(value, FieldSpec::new(5, "struct_value", FieldType::Message(structure)))
        .add_field(value, FieldSpec::new(6, "list_value", FieldType::Message(list)));
    builder.add_field(
        list,
        FieldSpec::new(1, "values", FieldType::Message(value)).repeated(),
    );

    let mask = builder.message_in(PACKAGE, "FieldMask");
    builder.add_field(
        mask,
        FieldSpec::scalar(1, "paths", ScalarKind::String).repeated(),
    );

    builder.message_in(PACKAGE, "Empty");

    for wkt in WellKnownType::ALL {
        if let Some(kind) = wkt.wrapped_kind() {
            let id = builder.message_in(PACKAGE, wkt.name());
            builder.add_field(id, FieldSpec::scalar(1, "value", kind));
        }
    }
}
