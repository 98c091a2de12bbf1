//! The schema model: message, enum and field descriptions.
//!
//! A [`Schema`] is an arena of [`MessageType`]s and [`EnumType`]s addressed
//! by [`MessageId`] and [`EnumId`]. It is populated through a
//! [`SchemaBuilder`] (or imported from descriptors, see [`descriptor`]) and
//! immutable afterwards, so a built schema can be shared freely between
//! threads.

mod builder;
pub mod descriptor;
mod enumeration;
mod message;
pub mod naming;
mod types;
mod well_known;

pub use builder::{FieldSpec, SchemaBuilder};
pub use enumeration::{EnumType, EnumValue};
pub use message::{Field, MessageType};
pub use types::{EnumId, FieldType, MessageId, ScalarKind};
pub use well_known::WellKnownType;

use std::collections::HashMap;

/// An immutable registry of message and enum types
#[derive(Debug, Clone)]
pub struct Schema {
    messages: Vec<MessageType>,
    enums: Vec<EnumType>,
    message_names: HashMap<String, MessageId>,
    enum_names: HashMap<String, EnumId>,
}

impl Schema {
    /// Creates a builder for a new schema
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub(crate) fn from_parts(messages: Vec<MessageType>, enums: Vec<EnumType>) -> Self {
        let message_names = messages
            .iter()
            .map(|m| (m.full_name.clone(), m.id))
            .collect();
        let enum_names = enums.iter().map(|e| (e.full_name.clone(), e.id)).collect();
        Self {
            messages,
            enums,
            message_names,
            enum_names,
        }
    }

    /// Returns the message type with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued for this schema.
    pub fn message(&self, id: MessageId) -> &MessageType {
        &self.messages[id.index()]
    }

    /// Returns the enum type with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued for this schema.
    pub fn enumeration(&self, id: EnumId) -> &EnumType {
        &self.enums[id.index()]
    }

    /// Looks up a message type by full name (a leading dot is ignored)
    pub fn get_message(&self, full_name: &str) -> Option<&MessageType> {
        self.message_id(full_name).map(|id| self.message(id))
    }

    /// Looks up a message id by full name (a leading dot is ignored)
    pub fn message_id(&self, full_name: &str) -> Option<MessageId> {
        self.message_names
            .get(full_name.trim_start_matches('.'))
            .copied()
    }

    /// Looks up an enum type by full name (a leading dot is ignored)
    pub fn get_enum(&self, full_name: &str) -> Option<&EnumType> {
        self.enum_names
            .get(full_name.trim_start_matches('.'))
            .map(|&id| self.enumeration(id))
    }

    /// All message types, map entries included
    pub fn messages(&self) -> &[MessageType] {
        &self.messages
    }

    /// All enum types
    pub fn enums(&self) -> &[EnumType] {
        &self.enums
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_schema_is_shareable() {
        assert_send_sync::<Schema>();
    }

    #[test]
    fn test_lookup() {
        let mut builder = Schema::builder();
        let id = builder.message("test.Basic");
        builder
            .add_field(id, FieldSpec::scalar(1, "string_field", ScalarKind::String))
            .add_field(id, FieldSpec::scalar(2, "long_field", ScalarKind::Int64));
        let schema = builder.build().unwrap();

        let basic = schema.get_message(".test.Basic").unwrap();
        assert_eq!(basic.id(), id);
        assert_eq!(basic.package(), "test");
        assert_eq!(basic.name(), "Basic");
        assert_eq!(basic.field_by_name("long_field").unwrap().number(), 2);
        assert_eq!(basic.field_by_json_name("stringField").unwrap().number(), 1);
        assert!(basic.field(3).is_none());
        assert!(schema.get_message("test.Missing").is_none());

        let unknown = basic.unknown_field(9, crate::wire::WireType::I64);
        assert!(unknown.is_unknown());
        assert_eq!(unknown.owner(), id);
        assert_eq!(unknown.number(), 9);
    }
}
