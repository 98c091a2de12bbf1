//! Message types and their fields.

use super::types::{EnumId, FieldType, MessageId, ScalarKind};
use super::well_known::WellKnownType;
use crate::wire::WireType;
use std::collections::HashMap;

/// A field of a message type.
///
/// Fields are owned by their [`MessageType`] and handed to visitors by
/// reference, so a visitor always knows which message a value belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub(crate) owner: MessageId,
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) json_name: String,
    pub(crate) ty: FieldType,
    pub(crate) repeated: bool,
    pub(crate) packed: bool,
    pub(crate) map: bool,
    pub(crate) map_key: bool,
    pub(crate) map_value: bool,
}

impl Field {
    /// Creates a stand-in for a field number the schema does not declare
    pub fn unknown(owner: MessageId, number: u32, wire_type: WireType) -> Self {
        Self {
            owner,
            number,
            name: String::new(),
            json_name: String::new(),
            ty: FieldType::Unknown(wire_type),
            repeated: false,
            packed: false,
            map: false,
            map_key: false,
            map_value: false,
        }
    }

    /// The message type declaring this field
    pub fn owner(&self) -> MessageId {
        self.owner
    }

    /// Field number, unique within the owner
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Proto (snake_case) name; empty for unknown fields
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON (lowerCamel) name; empty for unknown fields
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// The field's type
    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    /// The wire type values of this field are framed with
    pub fn wire_type(&self) -> WireType {
        self.ty.wire_type()
    }

    /// Returns true for repeated fields, map fields included
    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Returns true if repeated values are written as one packed run
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Returns true for map fields
    pub fn is_map(&self) -> bool {
        self.map
    }

    /// Returns true for the key field (1) of a map entry
    pub fn is_map_key(&self) -> bool {
        self.map_key
    }

    /// Returns true for the value field (2) of a map entry
    pub fn is_map_value(&self) -> bool {
        self.map_value
    }

    /// Returns true if this field stands in for an undeclared number
    pub fn is_unknown(&self) -> bool {
        matches!(self.ty, FieldType::Unknown(_))
    }

    /// The embedded message type, if this is a message field
    pub fn message_type(&self) -> Option<MessageId> {
        match self.ty {
            FieldType::Message(id) => Some(id),
            _ => None,
        }
    }

    /// The enum type, if this is an enum field
    pub fn enum_type(&self) -> Option<EnumId> {
        match self.ty {
            FieldType::Enum(id) => Some(id),
            _ => None,
        }
    }

    /// The scalar kind, if this is a scalar field
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self.ty {
            FieldType::Scalar(kind) => Some(kind),
            _ => None,
        }
    }
}

/// A message type: a name plus fields indexed by number, proto name and
/// JSON name.
#[derive(Debug, Clone)]
pub struct MessageType {
    pub(crate) id: MessageId,
    pub(crate) package: String,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) by_number: HashMap<u32, usize>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_json_name: HashMap<String, usize>,
    pub(crate) map_entry: bool,
    pub(crate) well_known: Option<WellKnownType>,
}

impl MessageType {
    /// This type's id in its schema
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Package name, possibly empty
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name relative to the package, e.g. `Outer.Inner`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name without a leading dot
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Fields ordered by number
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by number
    pub fn field(&self, number: u32) -> Option<&Field> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Looks up a field by proto name
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Looks up a field by JSON name
    pub fn field_by_json_name(&self, name: &str) -> Option<&Field> {
        self.by_json_name.get(name).map(|&i| &self.fields[i])
    }

    /// Synthesizes a field for a number this type does not declare
    pub fn unknown_field(&self, number: u32, wire_type: WireType) -> Field {
        Field::unknown(self.id, number, wire_type)
    }

    /// Returns true for the synthetic entry type backing a map field
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }

    /// The well-known type this message is, if any
    pub fn well_known(&self) -> Option<WellKnownType> {
        self.well_known
    }

    /// Key field of a map entry
    pub fn map_key(&self) -> Option<&Field> {
        self.field(1).filter(|f| f.map_key)
    }

    /// Value field of a map entry
    pub fn map_value(&self) -> Option<&Field> {
        self.field(2).filter(|f| f.map_value)
    }
}
