//! Building [`DynamicMessage`]s from visitor calls.

use super::{DynamicMessage, FieldValue, UnknownValue, Value};
use crate::error::{Error, Result};
use crate::schema::{Field, MessageType, Schema};
use crate::visitor::{ProtoVisitor, Scalar};

/// A visitor that assembles a [`DynamicMessage`].
///
/// Repeated occurrences follow protobuf merge rules: singular scalars are
/// overwritten, repeated fields accumulate, singular embedded messages merge
/// recursively and map entries replace by key. Values for fields absent from
/// the schema are kept as [`UnknownValue`]s.
#[derive(Debug)]
pub struct MessageBuilder<'s> {
    schema: &'s Schema,
    stack: Vec<DynamicMessage>,
    root: Option<DynamicMessage>,
}

impl<'s> MessageBuilder<'s> {
    /// Creates a builder over `schema`
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            stack: Vec::new(),
            root: None,
        }
    }

    /// Returns the message assembled by the last complete traversal
    pub fn finish(mut self) -> Result<DynamicMessage> {
        self.take()
    }

    /// Takes the assembled message, leaving the builder ready for reuse
    pub fn take(&mut self) -> Result<DynamicMessage> {
        self.root
            .take()
            .ok_or_else(|| Error::unsupported("message builder finished before destroy"))
    }

    fn current(&mut self) -> Result<&mut DynamicMessage> {
        self.stack
            .last_mut()
            .ok_or_else(|| Error::unsupported("value visited outside of init/destroy"))
    }

    fn finish_entry(&self, field: &Field, mut entry: DynamicMessage) -> Result<(Value, Value)> {
        let entry_type = self.schema.message(entry.message_type);
        let (Some(key_field), Some(value_field)) = (entry_type.map_key(), entry_type.map_value())
        else {
            return Err(Error::unsupported(format!(
                "map field '{}' does not reference a map entry",
                field.name()
            )));
        };

        let mut take = |target: &Field| -> Result<Value> {
            match entry.remove(target.number()) {
                Some(FieldValue::Single(value)) => Ok(value),
                _ => Value::default_for(self.schema, target.field_type()).ok_or_else(|| {
                    Error::internal(format!("no default for map entry field {}", target.number()))
                }),
            }
        };
        let key = take(key_field)?;
        let value = take(value_field)?;
        Ok((key, value))
    }
}

impl ProtoVisitor for MessageBuilder<'_> {
    fn init(&mut self, message: &MessageType) -> Result<()> {
        self.stack.clear();
        self.root = None;
        self.stack.push(DynamicMessage::new(message.id()));
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.stack.len() != 1 {
            return Err(Error::unsupported(format!(
                "unbalanced traversal: {} message(s) still open",
                self.stack.len().saturating_sub(1)
            )));
        }
        self.root = self.stack.pop();
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        let message = self.current()?;
        if field.is_unknown() {
            message.push_unknown(field.number(), UnknownValue::from_scalar(value));
        } else if field.is_repeated() {
            message.push(field.number(), Value::from(value));
        } else {
            message.set(field.number(), Value::from(value));
        }
        Ok(())
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        let id = field.message_type().ok_or_else(|| {
            Error::unsupported(format!(
                "enter on non-message field {} ({})",
                field.number(),
                field.name()
            ))
        })?;
        self.stack.push(DynamicMessage::new(id));
        Ok(())
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        if self.stack.len() < 2 {
            return Err(Error::unsupported(format!(
                "leave without matching enter for field {}",
                field.number()
            )));
        }
        let child = self
            .stack
            .pop()
            .ok_or_else(|| Error::internal("message stack underflow"))?;

        if field.is_map() {
            let (key, value) = self.finish_entry(field, child)?;
            self.current()?.insert_map(field.number(), key, value);
        } else if field.is_repeated() {
            self.current()?.push(field.number(), Value::Message(child));
        } else {
            self.current()?.merge_message(field.number(), child);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType, MessageId, ScalarKind, SchemaBuilder};
    use crate::wire::WireType;
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MessageId, MessageId) {
        let mut builder = SchemaBuilder::new();
        let outer = builder.message("test.Outer");
        let inner = builder.message("test.Inner");
        builder
            .add_field(outer, FieldSpec::scalar(1, "name", ScalarKind::String))
            .add_field(outer, FieldSpec::new(2, "inner", FieldType::Message(inner)))
            .add_field(
                outer,
                FieldSpec::new(3, "items", FieldType::Message(inner)).repeated(),
            )
            .add_field(inner, FieldSpec::scalar(1, "a", ScalarKind::Int32))
            .add_field(inner, FieldSpec::scalar(2, "b", ScalarKind::Int32));
        builder.add_map_field(
            outer,
            4,
            "counts",
            ScalarKind::String,
            FieldType::Scalar(ScalarKind::Int32),
        );
        (builder.build().unwrap(), outer, inner)
    }

    #[test]
    fn test_singular_message_merges() {
        let (schema, outer, inner) = schema();
        let outer_type = schema.message(outer);
        let inner_type = schema.message(inner);
        let field = outer_type.field(2).unwrap();

        let mut builder = MessageBuilder::new(&schema);
        builder.init(outer_type).unwrap();
        builder.visit_string(outer_type.field(1).unwrap(), "a").unwrap();
        builder.enter(field).unwrap();
        builder.visit_int32(inner_type.field(1).unwrap(), 1).unwrap();
        builder.leave(field).unwrap();
        builder.visit_string(outer_type.field(1).unwrap(), "b").unwrap();
        builder.enter(field).unwrap();
        builder.visit_int32(inner_type.field(2).unwrap(), 2).unwrap();
        builder.leave(field).unwrap();
        builder.destroy().unwrap();

        let message = builder.finish().unwrap();
        assert_eq!(message.get_single(1), Some(&Value::String("b".into())));
        let nested = message.get_single(2).and_then(Value::as_message).unwrap();
        assert_eq!(nested.get_single(1), Some(&Value::Int32(1)));
        assert_eq!(nested.get_single(2), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_repeated_messages_accumulate() {
        let (schema, outer, inner) = schema();
        let outer_type = schema.message(outer);
        let a = schema.message(inner).field(1).unwrap();
        let field = outer_type.field(3).unwrap();

        let mut builder = MessageBuilder::new(&schema);
        builder.init(outer_type).unwrap();
        builder
            .visit_embedded_iter(field, [1, 2], |v, n| v.visit_int32(a, n))
            .unwrap();
        builder.destroy().unwrap();

        let message = builder.finish().unwrap();
        match message.get(3) {
            Some(FieldValue::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_map_entries_with_defaults() {
        let (schema, outer, _) = schema();
        let outer_type = schema.message(outer);
        let field = outer_type.field(4).unwrap();
        let entry = schema.message(field.message_type().unwrap());

        let mut builder = MessageBuilder::new(&schema);
        builder.init(outer_type).unwrap();
        builder.enter(field).unwrap();
        builder.visit_string(entry.field(1).unwrap(), "k").unwrap();
        builder.leave(field).unwrap();
        builder.enter(field).unwrap();
        builder.visit_string(entry.field(1).unwrap(), "k").unwrap();
        builder.visit_int32(entry.field(2).unwrap(), 7).unwrap();
        builder.leave(field).unwrap();
        builder.enter(field).unwrap();
        builder.visit_int32(entry.field(2).unwrap(), 3).unwrap();
        builder.leave(field).unwrap();
        builder.destroy().unwrap();

        let message = builder.finish().unwrap();
        assert_eq!(
            message.get(4),
            Some(&FieldValue::Map(vec![
                (Value::String("k".into()), Value::Int32(7)),
                (Value::String(String::new()), Value::Int32(3)),
            ]))
        );
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let (schema, outer, _) = schema();
        let outer_type = schema.message(outer);
        let unknown = outer_type.unknown_field(99, WireType::Varint);

        let mut builder = MessageBuilder::new(&schema);
        builder.init(outer_type).unwrap();
        builder.visit_int64(&unknown, -1).unwrap();
        builder.destroy().unwrap();

        let message = builder.finish().unwrap();
        let unknown: Vec<_> = message.unknown_fields().collect();
        assert_eq!(unknown, vec![(99, &[UnknownValue::Varint(u64::MAX)][..])]);
    }

    #[test]
    fn test_unbalanced_traversal_fails() {
        let (schema, outer, _) = schema();
        let outer_type = schema.message(outer);
        let mut builder = MessageBuilder::new(&schema);
        builder.init(outer_type).unwrap();
        builder.enter(outer_type.field(2).unwrap()).unwrap();
        assert!(builder.destroy().is_err());
        assert!(builder.finish().is_err());
    }
}
