//! Rendering messages as Protobuf-JSON.

use super::generator::{JsonGenerator, Layout};
use super::well_known::{format_duration, format_field_mask, format_timestamp};
use crate::error::{Error, Result};
use crate::schema::{Field, FieldType, MessageId, MessageType, ScalarKind, Schema, WellKnownType};
use crate::value::Value;
use crate::visitor::{visit_message, Emit, ProtoVisitor, Scalar};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashSet;
use tracing::debug;

/// Configuration for [`JsonWriter`]
#[derive(Debug, Clone, Default)]
pub struct JsonWriterConfig {
    /// Use proto field names instead of their lowerCamel JSON names
    pub preserve_proto_field_names: bool,
    /// Indent the output
    pub pretty: bool,
}

impl JsonWriterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether keys use proto field names
    pub fn preserve_proto_field_names(mut self, preserve: bool) -> Self {
        self.preserve_proto_field_names = preserve;
        self
    }

    /// Sets whether the output is indented
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// How the current frame takes a field
enum Member {
    Skip,
    Buffer,
    Write,
}

/// The repeated or map field whose container is still open
struct Open {
    number: u32,
    keys: Option<HashSet<String>>,
}

/// One level of the message being rendered
enum Frame<'s> {
    Object {
        message: &'s MessageType,
        seen: HashSet<u32>,
        open: Option<Open>,
    },
    Struct {
        keys: HashSet<String>,
    },
    List,
    Value {
        set: bool,
    },
    Time {
        wkt: WellKnownType,
        seconds: i64,
        nanos: i32,
    },
    Mask {
        paths: Vec<String>,
    },
    Wrapper {
        kind: ScalarKind,
        value: Option<Value>,
    },
    Entry {
        entry: &'s MessageType,
        key: Option<String>,
        started: bool,
    },
    Skip,
}

/// A visitor that renders one traversal as Protobuf-JSON.
///
/// Output is generated as the calls arrive: a member is written as soon as
/// its field is visited, and only the well-known types with a string form
/// (and map keys) are held until their `leave`. The text is complete after
/// `destroy` and returned by [`JsonWriter::finish`].
///
/// Fields must arrive the way [`Emit`] produces them: each field once, with
/// repeated and map values contiguous. A field seen again after another one
/// fails with [`Error::NonCanonicalOrder`]; wire input of that shape is
/// merged first by [`binary_to_json`](super::binary_to_json).
///
/// Unknown fields have no JSON form and are dropped.
pub struct JsonWriter<'s> {
    schema: &'s Schema,
    config: JsonWriterConfig,
    out: JsonGenerator<Layout>,
    frames: Vec<Frame<'s>>,
    root: Option<&'s MessageType>,
    output: Option<String>,
}

impl<'s> JsonWriter<'s> {
    /// Creates a writer with the default configuration
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            config: JsonWriterConfig::default(),
            out: JsonGenerator::with_layout(false),
            frames: Vec::new(),
            root: None,
            output: None,
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: JsonWriterConfig) -> Self {
        self.config = config;
        self
    }

    /// The text generated so far by the traversal in progress
    pub fn written(&self) -> &[u8] {
        self.out.written()
    }

    /// Returns the JSON produced by the last complete traversal
    pub fn finish(self) -> Result<String> {
        self.output
            .ok_or_else(|| Error::unsupported("JSON writer finished before destroy"))
    }

    fn begin_member(&mut self, field: &Field) -> Result<Member> {
        if field.is_unknown() {
            return Ok(Member::Skip);
        }
        let preserve = self.config.preserve_proto_field_names;
        let number = field.number();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::unsupported("JSON writer visited before init"))?;
        match frame {
            Frame::Object {
                message,
                seen,
                open,
            } => {
                if matches!(open, Some(current) if current.number == number) {
                    return Ok(Member::Write);
                }
                if let Some(done) = open.take() {
                    end_container(&mut self.out, done)?;
                }
                if !seen.insert(number) {
                    return Err(Error::non_canonical_order(message.full_name(), number));
                }
                self.out
                    .key(if preserve { field.name() } else { field.json_name() })?;
                if field.is_map() {
                    self.out.begin_object()?;
                    *open = Some(Open {
                        number,
                        keys: Some(HashSet::new()),
                    });
                } else if field.is_repeated() {
                    self.out.begin_array()?;
                    *open = Some(Open { number, keys: None });
                }
                Ok(Member::Write)
            }
            Frame::Struct { .. } | Frame::List => Ok(if number == 1 {
                Member::Write
            } else {
                Member::Skip
            }),
            Frame::Value { set } => {
                if std::mem::replace(set, true) {
                    return Err(Error::non_canonical_order(
                        WellKnownType::Value.full_name(),
                        number,
                    ));
                }
                Ok(Member::Write)
            }
            Frame::Time { .. } | Frame::Mask { .. } | Frame::Wrapper { .. } => Ok(Member::Buffer),
            Frame::Entry {
                entry,
                key,
                started,
            } => {
                let entry: &'s MessageType = *entry;
                if *started {
                    return Err(Error::non_canonical_order(entry.full_name(), number));
                }
                if number == 1 {
                    return Ok(Member::Buffer);
                }
                *started = true;
                let key = key.take().unwrap_or_else(|| default_key(entry));
                let parent = self.frames.len().saturating_sub(2);
                self.entry_key(parent, entry, key)?;
                Ok(Member::Write)
            }
            Frame::Skip => Ok(Member::Skip),
        }
    }

    /// Writes a map key after checking it is new to its map
    fn entry_key(&mut self, parent: usize, entry: &MessageType, key: String) -> Result<()> {
        let keys = match self.frames.get_mut(parent) {
            Some(Frame::Object {
                open: Some(Open {
                    keys: Some(keys), ..
                }),
                ..
            })
            | Some(Frame::Struct { keys }) => keys,
            _ => return Err(Error::internal("map entry outside of a map")),
        };
        if !keys.insert(key.clone()) {
            return Err(Error::non_canonical_order(entry.full_name(), 1));
        }
        self.out.key(&key)
    }

    fn buffer(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        match (self.frames.last_mut(), field.number(), value) {
            (Some(Frame::Time { seconds, .. }), 1, Scalar::Int64(v)) => *seconds = v,
            (Some(Frame::Time { nanos, .. }), 2, Scalar::Int32(v)) => *nanos = v,
            (Some(Frame::Mask { paths }), 1, Scalar::String(path)) => paths.push(path.to_string()),
            (Some(Frame::Wrapper { value: slot, .. }), 1, value) => *slot = Some(Value::from(value)),
            (Some(Frame::Entry { key, .. }), 1, value) => *key = Some(map_key(field, value)?),
            _ => {}
        }
        Ok(())
    }

    fn write_scalar(&mut self, ty: FieldType, value: Scalar<'_>) -> Result<()> {
        let schema = self.schema;
        match value {
            Scalar::Enum(number) => match ty {
                FieldType::Enum(id) => {
                    let enum_type = schema.enumeration(id);
                    if enum_type.is_null_value() {
                        self.out.null()
                    } else {
                        match enum_type.name_of(number) {
                            Some(name) => self.out.string(name),
                            None => self.out.i64(number as i64),
                        }
                    }
                }
                _ => self.out.i64(number as i64),
            },
            Scalar::Int32(v) | Scalar::SInt32(v) | Scalar::SFixed32(v) => self.out.i64(v as i64),
            Scalar::UInt32(v) | Scalar::Fixed32(v) => self.out.u64(v as u64),
            Scalar::Int64(v) | Scalar::SInt64(v) | Scalar::SFixed64(v) => {
                self.out.string(&v.to_string())
            }
            Scalar::UInt64(v) | Scalar::Fixed64(v) => self.out.string(&v.to_string()),
            Scalar::Float(v) if v.is_finite() => self.out.f32(v),
            Scalar::Float(v) => self.out.string(non_finite(v as f64)),
            Scalar::Double(v) if v.is_finite() => self.out.f64(v),
            Scalar::Double(v) => self.out.string(non_finite(v)),
            Scalar::Bool(v) => self.out.bool(v),
            Scalar::String(v) => self.out.string(v),
            Scalar::Bytes(v) => self.out.string(&STANDARD.encode(v)),
        }
    }

    fn write_value(&mut self, ty: FieldType, value: &Value) -> Result<()> {
        match value.as_scalar() {
            Some(scalar) => self.write_scalar(ty, scalar),
            None => Err(Error::internal("expected a scalar value")),
        }
    }

    fn open_message(&mut self, id: MessageId) -> Result<()> {
        let schema = self.schema;
        let message = schema.message(id);
        let frame = match message.well_known() {
            Some(wkt @ (WellKnownType::Duration | WellKnownType::Timestamp)) => Frame::Time {
                wkt,
                seconds: 0,
                nanos: 0,
            },
            Some(WellKnownType::FieldMask) => Frame::Mask { paths: Vec::new() },
            Some(WellKnownType::Struct) => {
                self.out.begin_object()?;
                Frame::Struct {
                    keys: HashSet::new(),
                }
            }
            Some(WellKnownType::ListValue) => {
                self.out.begin_array()?;
                Frame::List
            }
            Some(WellKnownType::Value) => Frame::Value { set: false },
            Some(wkt) if wkt.is_wrapper() => Frame::Wrapper {
                kind: wkt.wrapped_kind().ok_or_else(|| {
                    Error::internal(format!("{} is not a wrapper", wkt.full_name()))
                })?,
                value: None,
            },
            _ => {
                self.out.begin_object()?;
                Frame::Object {
                    message,
                    seen: HashSet::new(),
                    open: None,
                }
            }
        };
        self.frames.push(frame);
        Ok(())
    }

    fn close(&mut self, frame: Frame<'s>) -> Result<()> {
        match frame {
            Frame::Object { open, .. } => {
                if let Some(open) = open {
                    end_container(&mut self.out, open)?;
                }
                self.out.end_object()
            }
            Frame::Struct { .. } => self.out.end_object(),
            Frame::List => self.out.end_array(),
            Frame::Value { set: true } | Frame::Skip => Ok(()),
            Frame::Value { set: false } => self.out.null(),
            Frame::Time {
                wkt,
                seconds,
                nanos,
            } => {
                let text = if wkt == WellKnownType::Duration {
                    format_duration(seconds, nanos)?
                } else {
                    format_timestamp(seconds, nanos)?
                };
                self.out.string(&text)
            }
            Frame::Mask { paths } => {
                let text = format_field_mask(paths.iter().map(String::as_str))?;
                self.out.string(&text)
            }
            Frame::Wrapper { kind, value } => {
                let ty = FieldType::Scalar(kind);
                let value = match value {
                    Some(value) => value,
                    None => self.default_value(ty)?,
                };
                self.write_value(ty, &value)
            }
            Frame::Entry {
                entry,
                key,
                started: false,
            } => {
                let key = key.unwrap_or_else(|| default_key(entry));
                self.entry_key(self.frames.len().saturating_sub(1), entry, key)?;
                let value_field = entry.map_value().ok_or_else(|| {
                    Error::unsupported(format!("'{}' is not a map entry", entry.full_name()))
                })?;
                match value_field.field_type() {
                    FieldType::Message(id) => {
                        self.open_message(id)?;
                        match self.frames.pop() {
                            Some(frame) => self.close(frame),
                            None => Err(Error::internal("map value frame vanished")),
                        }
                    }
                    ty => {
                        let value = self.default_value(ty)?;
                        self.write_value(ty, &value)
                    }
                }
            }
            Frame::Entry { .. } => Ok(()),
        }
    }

    fn default_value(&self, ty: FieldType) -> Result<Value> {
        Value::default_for(self.schema, ty)
            .ok_or_else(|| Error::internal(format!("{:?} has no default value", ty)))
    }
}

impl ProtoVisitor for JsonWriter<'_> {
    fn init(&mut self, message: &MessageType) -> Result<()> {
        self.out = JsonGenerator::with_layout(self.config.pretty);
        self.frames.clear();
        self.output = None;
        self.root = Some(self.schema.message(message.id()));
        self.open_message(message.id())
    }

    fn destroy(&mut self) -> Result<()> {
        let root = self
            .frames
            .pop()
            .ok_or_else(|| Error::unsupported("JSON writer destroyed before init"))?;
        if !self.frames.is_empty() {
            return Err(Error::internal(format!(
                "{} message(s) left open at destroy",
                self.frames.len()
            )));
        }
        self.close(root)?;
        let out = std::mem::replace(&mut self.out, JsonGenerator::with_layout(self.config.pretty));
        let text = out.finish()?;
        if let Some(root) = self.root {
            debug!(
                "Rendered {} as {} bytes of JSON",
                root.full_name(),
                text.len()
            );
        }
        self.output = Some(text);
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        if let (Some(Frame::Value { .. }), Scalar::Double(v)) = (self.frames.last(), value) {
            if !v.is_finite() && !field.is_unknown() {
                return Err(Error::well_known_encode(
                    "google.protobuf.Value",
                    format!("number_value {} is not finite", v),
                ));
            }
        }
        match self.begin_member(field)? {
            Member::Skip => Ok(()),
            Member::Buffer => self.buffer(field, value),
            Member::Write => self.write_scalar(field.field_type(), value),
        }
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        match self.begin_member(field)? {
            Member::Skip => {
                self.frames.push(Frame::Skip);
                Ok(())
            }
            Member::Buffer => Err(Error::unsupported(format!(
                "field {} cannot hold a message here",
                field.number()
            ))),
            Member::Write => {
                let id = field.message_type().ok_or_else(|| {
                    Error::unsupported(format!("field '{}' is not a message", field.name()))
                })?;
                if field.is_map() {
                    let schema = self.schema;
                    self.frames.push(Frame::Entry {
                        entry: schema.message(id),
                        key: None,
                        started: false,
                    });
                    Ok(())
                } else {
                    self.open_message(id)
                }
            }
        }
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        if self.frames.len() < 2 {
            return Err(Error::unsupported(format!(
                "leave of field {} without a matching enter",
                field.number()
            )));
        }
        match self.frames.pop() {
            Some(frame) => self.close(frame),
            None => Ok(()),
        }
    }
}

/// Renders any emittable message as JSON text
pub fn render<E: Emit + ?Sized>(schema: &Schema, message: &E, config: &JsonWriterConfig) -> Result<String> {
    let mut writer = JsonWriter::new(schema).with_config(config.clone());
    visit_message(schema, message, &mut writer)?;
    writer.finish()
}

fn end_container(out: &mut JsonGenerator<Layout>, open: Open) -> Result<()> {
    match open.keys {
        Some(_) => out.end_object(),
        None => out.end_array(),
    }
}

fn non_finite(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// The JSON key of an entry whose key field was never visited
fn default_key(entry: &MessageType) -> String {
    match entry.map_key().and_then(Field::scalar) {
        Some(ScalarKind::String) => String::new(),
        Some(ScalarKind::Bool) => "false".to_string(),
        _ => "0".to_string(),
    }
}

fn map_key(key_field: &Field, key: Scalar<'_>) -> Result<String> {
    Ok(match key {
        Scalar::String(s) => s.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int32(v) | Scalar::SInt32(v) | Scalar::SFixed32(v) => v.to_string(),
        Scalar::UInt32(v) | Scalar::Fixed32(v) => v.to_string(),
        Scalar::Int64(v) | Scalar::SInt64(v) | Scalar::SFixed64(v) => v.to_string(),
        Scalar::UInt64(v) | Scalar::Fixed64(v) => v.to_string(),
        other => {
            return Err(Error::unsupported(format!(
                "map key field '{}' holds {}",
                key_field.name(),
                other.kind_name()
            )))
        }
    })
}
