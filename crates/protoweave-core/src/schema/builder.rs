//! Programmatic schema construction.

use super::enumeration::EnumType;
use super::message::{Field, MessageType};
use super::naming::{to_lower_camel_case, to_upper_camel_case};
use super::types::{EnumId, FieldType, MessageId, ScalarKind};
use super::well_known::{self, WellKnownType};
use super::Schema;
use crate::error::{Error, Result};
use crate::wire::{MAX_FIELD_NUMBER, MIN_FIELD_NUMBER};
use std::collections::HashMap;
use tracing::debug;

/// Declaration of one field, added with [`SchemaBuilder::add_field`]
#[derive(Debug, Clone)]
pub struct FieldSpec {
    number: u32,
    name: String,
    json_name: Option<String>,
    ty: FieldType,
    repeated: bool,
    packed: Option<bool>,
    map: bool,
}

impl FieldSpec {
    /// Declares a singular field
    pub fn new(number: u32, name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            number,
            name: name.into(),
            json_name: None,
            ty,
            repeated: false,
            packed: None,
            map: false,
        }
    }

    /// Declares a singular scalar field
    pub fn scalar(number: u32, name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(number, name, FieldType::Scalar(kind))
    }

    /// Marks the field repeated
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Sets whether a repeated scalar field is packed (default: true)
    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = Some(packed);
        self
    }

    /// Overrides the JSON name (default: lowerCamel of the proto name)
    pub fn json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = Some(json_name.into());
        self
    }

    pub(crate) fn map(mut self) -> Self {
        self.repeated = true;
        self.map = true;
        self
    }
}

#[derive(Debug)]
struct MessageDraft {
    package: String,
    name: String,
    full_name: String,
    fields: Vec<FieldSpec>,
    map_entry: bool,
}

#[derive(Debug)]
struct EnumDraft {
    package: String,
    name: String,
    full_name: String,
    values: Vec<(String, i32)>,
}

/// Populates a [`Schema`].
///
/// Types are created lazily by name: asking for a message or enum that
/// does not exist yet creates it, so types can be referenced before they
/// are filled in. [`SchemaBuilder::build`] validates the result and freezes
/// it.
///
/// # Example
///
/// ```
/// use protoweave_core::schema::{FieldSpec, ScalarKind, SchemaBuilder};
///
/// let mut builder = SchemaBuilder::new();
/// let id = builder.message("test.Basic");
/// builder
///     .add_field(id, FieldSpec::scalar(1, "string_field", ScalarKind::String))
///     .add_field(id, FieldSpec::scalar(2, "long_field", ScalarKind::Int64));
/// let schema = builder.build()?;
///
/// let basic = schema.message(id);
/// assert_eq!(basic.field(2).unwrap().json_name(), "longField");
/// # Ok::<(), protoweave_core::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    messages: Vec<MessageDraft>,
    enums: Vec<EnumDraft>,
    message_names: HashMap<String, MessageId>,
    enum_names: HashMap<String, EnumId>,
}

impl SchemaBuilder {
    /// Creates an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `google.protobuf` well-known types
    pub fn with_well_known_types(mut self) -> Self {
        well_known::register(&mut self);
        self
    }

    /// Gets or creates a top-level message by fully-qualified name.
    ///
    /// Everything before the last dot is taken as the package. Use
    /// [`SchemaBuilder::message_in`] for nested messages.
    pub fn message(&mut self, full_name: &str) -> MessageId {
        let full_name = full_name.trim_start_matches('.');
        if let Some(&id) = self.message_names.get(full_name) {
            return id;
        }
        let (package, name) = split_full_name(full_name);
        self.message_in(package, name)
    }

    /// Gets or creates a message by package and package-relative name
    pub fn message_in(&mut self, package: &str, name: &str) -> MessageId {
        let full_name = join_full_name(package, name);
        if let Some(&id) = self.message_names.get(&full_name) {
            return id;
        }
        let id = MessageId(self.messages.len() as u32);
        self.messages.push(MessageDraft {
            package: package.to_string(),
            name: name.to_string(),
            full_name: full_name.clone(),
            fields: Vec::new(),
            map_entry: false,
        });
        self.message_names.insert(full_name, id);
        id
    }

    /// Gets or creates a top-level enum by fully-qualified name
    pub fn enumeration(&mut self, full_name: &str) -> EnumId {
        let full_name = full_name.trim_start_matches('.');
        if let Some(&id) = self.enum_names.get(full_name) {
            return id;
        }
        let (package, name) = split_full_name(full_name);
        self.enumeration_in(package, name)
    }

    /// Gets or creates an enum by package and package-relative name
    pub fn enumeration_in(&mut self, package: &str, name: &str) -> EnumId {
        let full_name = join_full_name(package, name);
        if let Some(&id) = self.enum_names.get(&full_name) {
            return id;
        }
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumDraft {
            package: package.to_string(),
            name: name.to_string(),
            full_name: full_name.clone(),
            values: Vec::new(),
        });
        self.enum_names.insert(full_name, id);
        id
    }

    /// Declares an enum value; declaration order decides alias resolution
    pub fn enum_value(&mut self, id: EnumId, name: impl Into<String>, number: i32) -> &mut Self {
        self.enums[id.index()].values.push((name.into(), number));
        self
    }

    /// Adds a field to a message
    pub fn add_field(&mut self, owner: MessageId, spec: FieldSpec) -> &mut Self {
        self.messages[owner.index()].fields.push(spec);
        self
    }

    /// Adds a map field, synthesizing its entry message.
    ///
    /// The entry is a nested message named after the field
    /// (`map_field` -> `MapFieldEntry`) with the key as field 1 and the value
    /// as field 2. Returns the entry's id.
    pub fn add_map_field(
        &mut self,
        owner: MessageId,
        number: u32,
        name: &str,
        key: ScalarKind,
        value: FieldType,
    ) -> MessageId {
        let (package, owner_name) = {
            let draft = &self.messages[owner.index()];
            (draft.package.clone(), draft.name.clone())
        };
        let entry_name = format!("{}.{}Entry", owner_name, to_upper_camel_case(name));
        let entry = self.message_in(&package, &entry_name);
        self.messages[entry.index()].map_entry = true;
        self.add_field(entry, FieldSpec::scalar(1, "key", key))
            .add_field(entry, FieldSpec::new(2, "value", value))
            .add_field(owner, FieldSpec::new(number, name, FieldType::Message(entry)).map());
        entry
    }

    pub(crate) fn set_map_entry(&mut self, id: MessageId) {
        self.messages[id.index()].map_entry = true;
    }

    /// Adds a map field whose entry message is declared separately
    pub(crate) fn add_map_field_spec(&mut self, owner: MessageId, spec: FieldSpec) {
        self.add_field(owner, spec.map());
    }

    /// Validates the declarations and freezes them into a [`Schema`]
    pub fn build(self) -> Result<Schema> {
        let enums = self
            .enums
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                if draft.values.is_empty() {
                    return Err(Error::schema(format!(
                        "enum '{}' declares no values",
                        draft.full_name
                    )));
                }
                Ok(EnumType::new(
                    EnumId(i as u32),
                    draft.package,
                    draft.name,
                    draft.full_name,
                    draft.values,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let entry_flags: Vec<bool> = self.messages.iter().map(|m| m.map_entry).collect();
        let mut messages = Vec::with_capacity(self.messages.len());

        for (i, draft) in self.messages.into_iter().enumerate() {
            let id = MessageId(i as u32);
            let mut fields = draft
                .fields
                .into_iter()
                .map(|spec| build_field(id, &draft.full_name, draft.map_entry, &entry_flags, spec))
                .collect::<Result<Vec<_>>>()?;
            fields.sort_by_key(|f| f.number);

            let mut by_number = HashMap::with_capacity(fields.len());
            let mut by_name = HashMap::with_capacity(fields.len());
            let mut by_json_name = HashMap::with_capacity(fields.len());
            for (index, field) in fields.iter().enumerate() {
                if by_number.insert(field.number, index).is_some() {
                    return Err(Error::schema(format!(
                        "duplicate field number {} in '{}'",
                        field.number, draft.full_name
                    )));
                }
                if by_name.insert(field.name.clone(), index).is_some() {
                    return Err(Error::schema(format!(
                        "duplicate field name '{}' in '{}'",
                        field.name, draft.full_name
                    )));
                }
                if by_json_name.insert(field.json_name.clone(), index).is_some() {
                    return Err(Error::schema(format!(
                        "duplicate JSON name '{}' in '{}'",
                        field.json_name, draft.full_name
                    )));
                }
            }

            let message = MessageType {
                id,
                well_known: WellKnownType::from_full_name(&draft.full_name),
                package: draft.package,
                name: draft.name,
                full_name: draft.full_name,
                fields,
                by_number,
                by_name,
                by_json_name,
                map_entry: draft.map_entry,
            };
            if message.map_entry {
                validate_map_entry(&message)?;
            }
            messages.push(message);
        }

        debug!(
            "Built schema: {} messages, {} enums",
            messages.len(),
            enums.len()
        );

        Ok(Schema::from_parts(messages, enums))
    }
}

fn build_field(
    owner: MessageId,
    owner_name: &str,
    owner_is_entry: bool,
    entry_flags: &[bool],
    spec: FieldSpec,
) -> Result<Field> {
    if spec.number < MIN_FIELD_NUMBER || spec.number > MAX_FIELD_NUMBER {
        return Err(Error::schema(format!(
            "field '{}' in '{}' has invalid number {}",
            spec.name, owner_name, spec.number
        )));
    }
    if spec.name.is_empty() {
        return Err(Error::schema(format!(
            "field {} in '{}' has no name",
            spec.number, owner_name
        )));
    }
    if let FieldType::Unknown(_) = spec.ty {
        return Err(Error::schema(format!(
            "field '{}' in '{}' is declared with an unknown type",
            spec.name, owner_name
        )));
    }
    if spec.map {
        let is_entry = match spec.ty {
            FieldType::Message(id) => entry_flags.get(id.index()).copied().unwrap_or(false),
            _ => false,
        };
        if !is_entry {
            return Err(Error::schema(format!(
                "map field '{}' in '{}' does not reference a map entry",
                spec.name, owner_name
            )));
        }
    }

    let packed = spec.repeated && !spec.map && spec.ty.is_packable() && spec.packed.unwrap_or(true);
    let json_name = spec
        .json_name
        .unwrap_or_else(|| to_lower_camel_case(&spec.name));

    Ok(Field {
        owner,
        number: spec.number,
        json_name,
        name: spec.name,
        ty: spec.ty,
        repeated: spec.repeated,
        packed,
        map: spec.map,
        map_key: owner_is_entry && spec.number == 1,
        map_value: owner_is_entry && spec.number == 2,
    })
}

fn validate_map_entry(entry: &MessageType) -> Result<()> {
    let invalid = |details: &str| {
        Err(Error::schema(format!(
            "map entry '{}' {}",
            entry.full_name, details
        )))
    };
    if entry.fields.len() != 2 {
        return invalid("must declare exactly a key and a value");
    }
    let (Some(key), Some(value)) = (entry.field(1), entry.field(2)) else {
        return invalid("must use numbers 1 and 2");
    };
    if key.repeated || value.repeated {
        return invalid("cannot have repeated key or value");
    }
    match key.ty {
        FieldType::Scalar(kind) if kind.is_valid_map_key() => Ok(()),
        _ => invalid("has an invalid key type"),
    }
}

fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('.') {
        Some((package, name)) => (package, name),
        None => ("", full_name),
    }
}

fn join_full_name(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}
