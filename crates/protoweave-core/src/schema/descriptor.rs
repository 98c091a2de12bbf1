//! Conversion between [`Schema`] and descriptor sets.
//!
//! Export produces a `FileDescriptorSet` with one file per package, nested
//! types placed under their parents and map entries flagged with the
//! `map_entry` option. Import goes through `prost-reflect`, which resolves
//! and validates the descriptors before they are converted.

use super::builder::FieldSpec;
use super::types::{FieldType, ScalarKind};
use super::well_known::WellKnownType;
use super::{EnumType, MessageType, Schema, SchemaBuilder};
use crate::error::{Error, Result};
use prost::Message;
use prost_reflect::{DescriptorPool, Kind};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumOptions, EnumValueDescriptorProto,
    FieldDescriptorProto, FieldOptions, FileDescriptorProto, FileDescriptorSet, MessageOptions,
    OneofDescriptorProto,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

impl Schema {
    /// Exports the schema as a descriptor set.
    ///
    /// Each package becomes one file named after it (`a.b` ->
    /// `a/b.proto`). Files are proto3 unless one of their enums does not
    /// start at zero, in which case they are written as proto2. Repeated
    /// scalar fields always carry an explicit `packed` option.
    pub fn to_file_descriptor_set(&self) -> Result<FileDescriptorSet> {
        let mut packages: BTreeMap<&str, (Vec<&MessageType>, Vec<&EnumType>)> = BTreeMap::new();
        for message in self.messages() {
            packages.entry(message.package()).or_default().0.push(message);
        }
        for enumeration in self.enums() {
            packages.entry(enumeration.package()).or_default().1.push(enumeration);
        }

        let mut file = Vec::with_capacity(packages.len());
        for (package, (messages, enums)) in packages {
            file.push(self.export_file(package, &messages, &enums)?);
        }

        debug!("Exported descriptor set with {} files", file.len());
        Ok(FileDescriptorSet {
            file: dependencies_first(file),
        })
    }

    /// Imports every message and enum of a descriptor set
    pub fn from_file_descriptor_set(set: FileDescriptorSet) -> Result<Self> {
        let pool = DescriptorPool::from_file_descriptor_set(set)
            .map_err(|e| Error::descriptor_build(e.to_string()))?;
        Self::from_descriptor_pool(&pool)
    }

    /// Imports a serialized descriptor set, as written by `protoc -o`
    pub fn decode_file_descriptor_set(bytes: &[u8]) -> Result<Self> {
        let set = FileDescriptorSet::decode(bytes)?;
        Self::from_file_descriptor_set(set)
    }

    /// Imports every message and enum of a resolved descriptor pool
    pub fn from_descriptor_pool(pool: &DescriptorPool) -> Result<Self> {
        let mut builder = SchemaBuilder::new();

        for message in pool.all_messages() {
            let package = message.package_name();
            let id = builder.message_in(package, relative_name(message.full_name(), package));
            if message.is_map_entry() {
                builder.set_map_entry(id);
            }

            for field in message.fields() {
                let ty = match field.kind() {
                    Kind::Double => FieldType::Scalar(ScalarKind::Double),
                    Kind::Float => FieldType::Scalar(ScalarKind::Float),
                    Kind::Int32 => FieldType::Scalar(ScalarKind::Int32),
                    Kind::Int64 => FieldType::Scalar(ScalarKind::Int64),
                    Kind::Uint32 => FieldType::Scalar(ScalarKind::UInt32),
                    Kind::Uint64 => FieldType::Scalar(ScalarKind::UInt64),
                    Kind::Sint32 => FieldType::Scalar(ScalarKind::SInt32),
                    Kind::Sint64 => FieldType::Scalar(ScalarKind::SInt64),
                    Kind::Fixed32 => FieldType::Scalar(ScalarKind::Fixed32),
                    Kind::Fixed64 => FieldType::Scalar(ScalarKind::Fixed64),
                    Kind::Sfixed32 => FieldType::Scalar(ScalarKind::SFixed32),
                    Kind::Sfixed64 => FieldType::Scalar(ScalarKind::SFixed64),
                    Kind::Bool => FieldType::Scalar(ScalarKind::Bool),
                    Kind::String => FieldType::Scalar(ScalarKind::String),
                    Kind::Bytes => FieldType::Scalar(ScalarKind::Bytes),
                    Kind::Message(target) => FieldType::Message(builder.message_in(
                        target.package_name(),
                        relative_name(target.full_name(), target.package_name()),
                    )),
                    Kind::Enum(target) => FieldType::Enum(builder.enumeration_in(
                        target.package_name(),
                        relative_name(target.full_name(), target.package_name()),
                    )),
                };

                let spec = FieldSpec::new(field.number(), field.name(), ty).json_name(field.json_name());
                if field.is_map() {
                    builder.add_map_field_spec(id, spec);
                } else if field.is_list() {
                    builder.add_field(id, spec.repeated().packed(field.is_packed()));
                } else {
                    builder.add_field(id, spec);
                }
            }
        }

        for enumeration in pool.all_enums() {
            let package = enumeration.package_name();
            let id = builder.enumeration_in(package, relative_name(enumeration.full_name(), package));
            for value in enumeration.values() {
                builder.enum_value(id, value.name(), value.number());
            }
        }

        let schema = builder.build()?;
        debug!(
            "Imported descriptor pool: {} messages, {} enums",
            schema.messages().len(),
            schema.enums().len()
        );
        Ok(schema)
    }

    fn export_file(
        &self,
        package: &str,
        messages: &[&MessageType],
        enums: &[&EnumType],
    ) -> Result<FileDescriptorProto> {
        let mut roots: Vec<DescriptorProto> = Vec::new();
        let mut root_enums: Vec<EnumDescriptorProto> = Vec::new();
        let mut dependencies = BTreeSet::new();

        // Parents sort before their children, so every parent already
        // exists when a nested type is placed.
        let mut ordered: Vec<&MessageType> = messages.to_vec();
        ordered.sort_by_key(|m| m.name().matches('.').count());
        for message in ordered {
            let proto = self.export_message(message, &mut dependencies);
            match message.name().rsplit_once('.') {
                None => roots.push(proto),
                Some((parent, _)) => {
                    let slot = find_nested(&mut roots, parent).ok_or_else(|| {
                        Error::descriptor_build(format!(
                            "parent of nested message '{}' is not declared",
                            message.full_name()
                        ))
                    })?;
                    slot.nested_type.push(proto);
                }
            }
        }

        let mut proto2 = false;
        for enumeration in enums {
            proto2 |= enumeration.default_number() != 0;
            let proto = export_enum(enumeration);
            match enumeration.name().rsplit_once('.') {
                None => root_enums.push(proto),
                Some((parent, _)) => {
                    let slot = find_nested(&mut roots, parent).ok_or_else(|| {
                        Error::descriptor_build(format!(
                            "parent of nested enum '{}' is not declared",
                            enumeration.full_name()
                        ))
                    })?;
                    slot.enum_type.push(proto);
                }
            }
        }

        dependencies.remove(package);
        Ok(FileDescriptorProto {
            name: Some(file_name(package)),
            package: (!package.is_empty()).then(|| package.to_string()),
            dependency: dependencies.into_iter().map(file_name).collect(),
            message_type: roots,
            enum_type: root_enums,
            syntax: Some(if proto2 { "proto2" } else { "proto3" }.to_string()),
            ..Default::default()
        })
    }

    fn export_message<'s>(
        &'s self,
        message: &MessageType,
        dependencies: &mut BTreeSet<&'s str>,
    ) -> DescriptorProto {
        // Value's fields form the `kind` oneof, which gives them presence.
        let oneof = message.well_known() == Some(WellKnownType::Value);

        let field = message
            .fields()
            .iter()
            .map(|field| {
                let (ty, type_name) = match field.field_type() {
                    FieldType::Scalar(kind) => (scalar_type(kind), None),
                    FieldType::Enum(id) => {
                        let target = self.enumeration(id);
                        dependencies.insert(target.package());
                        (Type::Enum, Some(format!(".{}", target.full_name())))
                    }
                    FieldType::Message(id) => {
                        let target = self.message(id);
                        dependencies.insert(target.package());
                        (Type::Message, Some(format!(".{}", target.full_name())))
                    }
                    // Unknown fields are never stored in a schema.
                    FieldType::Unknown(_) => (Type::Bytes, None),
                };
                let label = if field.is_repeated() {
                    Label::Repeated
                } else {
                    Label::Optional
                };
                let options = (field.is_repeated() && field.field_type().is_packable()).then(|| {
                    FieldOptions {
                        packed: Some(field.is_packed()),
                        ..Default::default()
                    }
                });

                FieldDescriptorProto {
                    name: Some(field.name().to_string()),
                    number: Some(field.number() as i32),
                    label: Some(label as i32),
                    r#type: Some(ty as i32),
                    type_name,
                    json_name: Some(field.json_name().to_string()),
                    options,
                    oneof_index: oneof.then_some(0),
                    ..Default::default()
                }
            })
            .collect();

        DescriptorProto {
            name: Some(simple_name(message.name()).to_string()),
            field,
            options: message.is_map_entry().then(|| MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            oneof_decl: if oneof {
                vec![OneofDescriptorProto {
                    name: Some("kind".to_string()),
                    ..Default::default()
                }]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }
}

fn export_enum(enumeration: &EnumType) -> EnumDescriptorProto {
    let value: Vec<EnumValueDescriptorProto> = enumeration
        .values()
        .map(|(name, number)| EnumValueDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            ..Default::default()
        })
        .collect();
    let distinct: BTreeSet<i32> = value.iter().map(|v| v.number()).collect();
    let has_aliases = distinct.len() != value.len();

    EnumDescriptorProto {
        name: Some(simple_name(enumeration.name()).to_string()),
        value,
        options: has_aliases.then(|| EnumOptions {
            allow_alias: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Orders files so that every file follows the files it imports
fn dependencies_first(files: Vec<FileDescriptorProto>) -> Vec<FileDescriptorProto> {
    fn visit(
        i: usize,
        files: &[FileDescriptorProto],
        index: &HashMap<&str, usize>,
        visited: &mut [bool],
        order: &mut Vec<usize>,
    ) {
        if visited[i] {
            return;
        }
        visited[i] = true;
        for dependency in &files[i].dependency {
            if let Some(&j) = index.get(dependency.as_str()) {
                visit(j, files, index, visited, order);
            }
        }
        order.push(i);
    }

    let index: HashMap<&str, usize> = files
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name(), i))
        .collect();
    let mut visited = vec![false; files.len()];
    let mut order = Vec::with_capacity(files.len());
    for i in 0..files.len() {
        visit(i, &files, &index, &mut visited, &mut order);
    }
    drop(index);

    let mut slots: Vec<Option<FileDescriptorProto>> = files.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn find_nested<'a>(roots: &'a mut [DescriptorProto], path: &str) -> Option<&'a mut DescriptorProto> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = roots.iter_mut().find(|m| m.name() == first)?;
    for segment in segments {
        current = current
            .nested_type
            .iter_mut()
            .find(|m| m.name() == segment)?;
    }
    Some(current)
}

fn scalar_type(kind: ScalarKind) -> Type {
    match kind {
        ScalarKind::Int32 => Type::Int32,
        ScalarKind::Int64 => Type::Int64,
        ScalarKind::UInt32 => Type::Uint32,
        ScalarKind::UInt64 => Type::Uint64,
        ScalarKind::SInt32 => Type::Sint32,
        ScalarKind::SInt64 => Type::Sint64,
        ScalarKind::Fixed32 => Type::Fixed32,
        ScalarKind::Fixed64 => Type::Fixed64,
        ScalarKind::SFixed32 => Type::Sfixed32,
        ScalarKind::SFixed64 => Type::Sfixed64,
        ScalarKind::Float => Type::Float,
        ScalarKind::Double => Type::Double,
        ScalarKind::Bool => Type::Bool,
        ScalarKind::String => Type::String,
        ScalarKind::Bytes => Type::Bytes,
    }
}

fn file_name(package: &str) -> String {
    if package.is_empty() {
        "default.proto".to_string()
    } else {
        format!("{}.proto", package.replace('.', "/"))
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, simple)| simple)
}

fn relative_name<'a>(full_name: &'a str, package: &str) -> &'a str {
    if package.is_empty() {
        full_name
    } else {
        full_name
            .strip_prefix(package)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(full_name)
    }
}
