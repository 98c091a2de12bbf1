//! An in-memory message representation driven by the schema.
//!
//! [`DynamicMessage`] stands in for generated message types: it is built by
//! [`MessageBuilder`] from any reader and replays itself through
//! [`Emit`] to any writer.

mod builder;

pub use builder::MessageBuilder;

use crate::error::{Error, Result};
use crate::schema::{Field, FieldType, MessageId, ScalarKind, Schema};
use crate::visitor::{self, Emit, ProtoVisitor, Scalar};
use crate::wire::{zigzag_encode32, zigzag_encode64, WireType};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `int32`
    Int32(i32),
    /// `uint32`
    UInt32(u32),
    /// `sint32`
    SInt32(i32),
    /// `int64`
    Int64(i64),
    /// `uint64`
    UInt64(u64),
    /// `sint64`
    SInt64(i64),
    /// `fixed32`
    Fixed32(u32),
    /// `sfixed32`
    SFixed32(i32),
    /// `fixed64`
    Fixed64(u64),
    /// `sfixed64`
    SFixed64(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `bool`
    Bool(bool),
    /// An enum number
    Enum(i32),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Vec<u8>),
    /// An embedded message
    Message(DynamicMessage),
}

impl Value {
    /// The default value of a field type; `None` for unknown fields
    pub fn default_for(schema: &Schema, ty: FieldType) -> Option<Value> {
        let value = match ty {
            FieldType::Scalar(kind) => match kind {
                ScalarKind::Int32 => Value::Int32(0),
                ScalarKind::Int64 => Value::Int64(0),
                ScalarKind::UInt32 => Value::UInt32(0),
                ScalarKind::UInt64 => Value::UInt64(0),
                ScalarKind::SInt32 => Value::SInt32(0),
                ScalarKind::SInt64 => Value::SInt64(0),
                ScalarKind::Fixed32 => Value::Fixed32(0),
                ScalarKind::Fixed64 => Value::Fixed64(0),
                ScalarKind::SFixed32 => Value::SFixed32(0),
                ScalarKind::SFixed64 => Value::SFixed64(0),
                ScalarKind::Float => Value::Float(0.0),
                ScalarKind::Double => Value::Double(0.0),
                ScalarKind::Bool => Value::Bool(false),
                ScalarKind::String => Value::String(String::new()),
                ScalarKind::Bytes => Value::Bytes(Vec::new()),
            },
            FieldType::Enum(id) => Value::Enum(schema.enumeration(id).default_number()),
            FieldType::Message(id) => Value::Message(DynamicMessage::new(id)),
            FieldType::Unknown(_) => return None,
        };
        Some(value)
    }

    /// Borrows this value as a [`Scalar`]; `None` for messages
    pub fn as_scalar(&self) -> Option<Scalar<'_>> {
        Some(match self {
            Value::Int32(v) => Scalar::Int32(*v),
            Value::UInt32(v) => Scalar::UInt32(*v),
            Value::SInt32(v) => Scalar::SInt32(*v),
            Value::Int64(v) => Scalar::Int64(*v),
            Value::UInt64(v) => Scalar::UInt64(*v),
            Value::SInt64(v) => Scalar::SInt64(*v),
            Value::Fixed32(v) => Scalar::Fixed32(*v),
            Value::SFixed32(v) => Scalar::SFixed32(*v),
            Value::Fixed64(v) => Scalar::Fixed64(*v),
            Value::SFixed64(v) => Scalar::SFixed64(*v),
            Value::Float(v) => Scalar::Float(*v),
            Value::Double(v) => Scalar::Double(*v),
            Value::Bool(v) => Scalar::Bool(*v),
            Value::Enum(v) => Scalar::Enum(*v),
            Value::String(v) => Scalar::String(v),
            Value::Bytes(v) => Scalar::Bytes(v),
            Value::Message(_) => return None,
        })
    }

    /// The embedded message, if this is one
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The text, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn emit_as<V: ProtoVisitor + ?Sized>(
        &self,
        schema: &Schema,
        field: &Field,
        visitor: &mut V,
    ) -> Result<()> {
        match self {
            Value::Message(message) => {
                visitor::visit_embedded(visitor, field, |v| message.emit(schema, v))
            }
            scalar => match scalar.as_scalar() {
                Some(s) => s.visit(field, visitor),
                None => Ok(()),
            },
        }
    }
}

impl From<Scalar<'_>> for Value {
    fn from(value: Scalar<'_>) -> Self {
        match value {
            Scalar::Int32(v) => Value::Int32(v),
            Scalar::UInt32(v) => Value::UInt32(v),
            Scalar::SInt32(v) => Value::SInt32(v),
            Scalar::Int64(v) => Value::Int64(v),
            Scalar::UInt64(v) => Value::UInt64(v),
            Scalar::SInt64(v) => Value::SInt64(v),
            Scalar::Fixed32(v) => Value::Fixed32(v),
            Scalar::SFixed32(v) => Value::SFixed32(v),
            Scalar::Fixed64(v) => Value::Fixed64(v),
            Scalar::SFixed64(v) => Value::SFixed64(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Double(v) => Value::Double(v),
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::Enum(v) => Value::Enum(v),
            Scalar::String(v) => Value::String(v.to_string()),
            Scalar::Bytes(v) => Value::Bytes(v.to_vec()),
        }
    }
}

/// The stored value of one declared field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A singular field
    Single(Value),
    /// A repeated field, in order
    List(Vec<Value>),
    /// A map field, in insertion order with unique keys
    Map(Vec<(Value, Value)>),
}

/// The raw content of a field absent from the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownValue {
    /// A varint
    Varint(u64),
    /// A 32-bit fixed value
    Fixed32(u32),
    /// A 64-bit fixed value
    Fixed64(u64),
    /// A length-delimited payload
    LengthDelimited(Vec<u8>),
}

impl UnknownValue {
    /// Captures the raw wire content of any scalar
    pub fn from_scalar(value: Scalar<'_>) -> Self {
        match value {
            Scalar::Int32(v) | Scalar::Enum(v) => UnknownValue::Varint(v as i64 as u64),
            Scalar::UInt32(v) => UnknownValue::Varint(v as u64),
            Scalar::SInt32(v) => UnknownValue::Varint(zigzag_encode32(v) as u64),
            Scalar::Int64(v) => UnknownValue::Varint(v as u64),
            Scalar::UInt64(v) => UnknownValue::Varint(v),
            Scalar::SInt64(v) => UnknownValue::Varint(zigzag_encode64(v)),
            Scalar::Bool(v) => UnknownValue::Varint(v as u64),
            Scalar::Fixed32(v) => UnknownValue::Fixed32(v),
            Scalar::SFixed32(v) => UnknownValue::Fixed32(v as u32),
            Scalar::Float(v) => UnknownValue::Fixed32(v.to_bits()),
            Scalar::Fixed64(v) => UnknownValue::Fixed64(v),
            Scalar::SFixed64(v) => UnknownValue::Fixed64(v as u64),
            Scalar::Double(v) => UnknownValue::Fixed64(v.to_bits()),
            Scalar::String(v) => UnknownValue::LengthDelimited(v.as_bytes().to_vec()),
            Scalar::Bytes(v) => UnknownValue::LengthDelimited(v.to_vec()),
        }
    }

    /// The wire type this value was read with
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::I32,
            UnknownValue::Fixed64(_) => WireType::I64,
            UnknownValue::LengthDelimited(_) => WireType::Len,
        }
    }

    fn emit<V: ProtoVisitor + ?Sized>(&self, field: &Field, visitor: &mut V) -> Result<()> {
        match self {
            UnknownValue::Varint(v) => visitor.visit_int64(field, *v as i64),
            UnknownValue::Fixed32(v) => visitor.visit_fixed32(field, *v),
            UnknownValue::Fixed64(v) => visitor.visit_fixed64(field, *v),
            UnknownValue::LengthDelimited(v) => visitor.visit_bytes(field, v),
        }
    }
}

/// A message whose shape is described by a [`Schema`] at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    message_type: MessageId,
    fields: BTreeMap<u32, FieldValue>,
    unknown: BTreeMap<u32, Vec<UnknownValue>>,
}

impl DynamicMessage {
    /// Creates an empty message of the given type
    pub fn new(message_type: MessageId) -> Self {
        Self {
            message_type,
            fields: BTreeMap::new(),
            unknown: BTreeMap::new(),
        }
    }

    /// Returns true if no field is set, unknown fields included
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }

    /// The value of a declared field
    pub fn get(&self, number: u32) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    /// The singular value of a declared field
    pub fn get_single(&self, number: u32) -> Option<&Value> {
        match self.fields.get(&number) {
            Some(FieldValue::Single(value)) => Some(value),
            _ => None,
        }
    }

    /// Declared fields that are set, in number order
    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldValue)> + '_ {
        self.fields.iter().map(|(number, value)| (*number, value))
    }

    /// Unknown fields, in number order
    pub fn unknown_fields(&self) -> impl Iterator<Item = (u32, &[UnknownValue])> + '_ {
        self.unknown
            .iter()
            .map(|(number, values)| (*number, values.as_slice()))
    }

    /// Sets a singular field, replacing any previous value
    pub fn set(&mut self, number: u32, value: Value) -> &mut Self {
        self.fields.insert(number, FieldValue::Single(value));
        self
    }

    /// Appends to a repeated field
    pub fn push(&mut self, number: u32, value: Value) -> &mut Self {
        match self.fields.entry(number) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                FieldValue::List(values) => values.push(value),
                other => *other = FieldValue::List(vec![value]),
            },
            Entry::Vacant(slot) => {
                slot.insert(FieldValue::List(vec![value]));
            }
        }
        self
    }

    /// Inserts a map entry, replacing the value of an existing key
    pub fn insert_map(&mut self, number: u32, key: Value, value: Value) -> &mut Self {
        match self.fields.entry(number) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                FieldValue::Map(entries) => upsert(entries, key, value),
                other => *other = FieldValue::Map(vec![(key, value)]),
            },
            Entry::Vacant(slot) => {
                slot.insert(FieldValue::Map(vec![(key, value)]));
            }
        }
        self
    }

    /// Records raw content for a field number absent from the schema
    pub fn push_unknown(&mut self, number: u32, value: UnknownValue) -> &mut Self {
        self.unknown.entry(number).or_default().push(value);
        self
    }

    /// Clears a field, returning its previous value
    pub fn remove(&mut self, number: u32) -> Option<FieldValue> {
        self.fields.remove(&number)
    }

    /// Merges `other` into this message.
    ///
    /// Singular fields set in `other` replace ours, except embedded
    /// messages, which merge recursively. Repeated fields concatenate, map
    /// entries replace by key and unknown fields append.
    pub fn merge(&mut self, other: DynamicMessage) {
        for (number, incoming) in other.fields {
            match self.fields.entry(number) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                Entry::Occupied(mut slot) => match (slot.get_mut(), incoming) {
                    (
                        FieldValue::Single(Value::Message(existing)),
                        FieldValue::Single(Value::Message(update)),
                    ) => existing.merge(update),
                    (FieldValue::List(existing), FieldValue::List(update)) => {
                        existing.extend(update)
                    }
                    (FieldValue::Map(existing), FieldValue::Map(update)) => {
                        for (key, value) in update {
                            upsert(existing, key, value);
                        }
                    }
                    (current, update) => *current = update,
                },
            }
        }
        for (number, values) in other.unknown {
            self.unknown.entry(number).or_default().extend(values);
        }
    }

    /// Merges a singular embedded message into field `number`
    pub(crate) fn merge_message(&mut self, number: u32, message: DynamicMessage) {
        match self.fields.get_mut(&number) {
            Some(FieldValue::Single(Value::Message(existing))) => existing.merge(message),
            _ => {
                self.fields
                    .insert(number, FieldValue::Single(Value::Message(message)));
            }
        }
    }
}

fn upsert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

impl Emit for DynamicMessage {
    fn message_type(&self) -> MessageId {
        self.message_type
    }

    /// Emits fields in number order; unknown fields are interleaved by
    /// number after any declared field with the same number.
    fn emit<V: ProtoVisitor + ?Sized>(&self, schema: &Schema, visitor: &mut V) -> Result<()> {
        let message_type = schema.message(self.message_type);
        let mut known = self.fields.iter().peekable();
        let mut unknown = self.unknown.iter().peekable();

        loop {
            let take_known = match (known.peek(), unknown.peek()) {
                (Some((k, _)), Some((u, _))) => k <= u,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            if take_known {
                if let Some((&number, value)) = known.next() {
                    match message_type.field(number) {
                        Some(field) => emit_field(schema, field, value, visitor)?,
                        None => {
                            return Err(Error::unsupported(format!(
                                "field {} is not declared in '{}'",
                                number,
                                message_type.full_name()
                            )))
                        }
                    }
                }
            } else if let Some((&number, values)) = unknown.next() {
                for value in values {
                    let field = message_type.unknown_field(number, value.wire_type());
                    value.emit(&field, visitor)?;
                }
            }
        }
        Ok(())
    }
}

fn emit_field<V: ProtoVisitor + ?Sized>(
    schema: &Schema,
    field: &Field,
    value: &FieldValue,
    visitor: &mut V,
) -> Result<()> {
    match value {
        FieldValue::Single(value) => value.emit_as(schema, field, visitor),
        FieldValue::List(values) => {
            if field.is_packed() {
                visitor::visit_repeated(visitor, field, values.iter().filter_map(Value::as_scalar))
            } else {
                values
                    .iter()
                    .try_for_each(|value| value.emit_as(schema, field, visitor))
            }
        }
        FieldValue::Map(entries) => {
            let entry_type = field
                .message_type()
                .map(|id| schema.message(id))
                .ok_or_else(|| {
                    Error::unsupported(format!("map field {} has no entry type", field.number()))
                })?;
            let (key_field, value_field) = match (entry_type.map_key(), entry_type.map_value()) {
                (Some(key), Some(value)) => (key, value),
                _ => {
                    return Err(Error::unsupported(format!(
                        "'{}' is not a map entry",
                        entry_type.full_name()
                    )))
                }
            };
            let pairs = entries.iter().map(|(key, value)| (key, value));
            visitor::visit_map(visitor, field, pairs, |v, key, value| {
                key.emit_as(schema, key_field, v)?;
                value.emit_as(schema, value_field, v)
            })
        }
    }
}
