//! Driving a visitor from Protobuf-JSON.
//!
//! The text is pulled token by token from a `serde_json` deserializer; each
//! member is reported to the visitor as soon as it is parsed, so nothing
//! larger than one scalar is buffered.

use super::well_known::{parse_duration, parse_field_mask, parse_timestamp};
use crate::binary::DEFAULT_MAX_DEPTH;
use crate::error::{Error, Result};
use crate::schema::{EnumId, Field, FieldType, MessageId, MessageType, ScalarKind, Schema, WellKnownType};
use crate::value::Value;
use crate::visitor::{visit_repeated, ProtoVisitor, Scalar};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::result::Result as StdResult;
use tracing::debug;

/// Largest magnitude below which every integer is exact in an `f64` (2^53)
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Configuration for [`JsonReader`]
#[derive(Debug, Clone)]
pub struct JsonReaderConfig {
    /// Skip object members that name no field, and enum names that name no
    /// value, instead of failing
    pub ignore_unknown_fields: bool,
    /// Maximum number of nested messages
    pub max_depth: usize,
}

impl Default for JsonReaderConfig {
    fn default() -> Self {
        Self {
            ignore_unknown_fields: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl JsonReaderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unknown names are skipped
    pub fn ignore_unknown_fields(mut self, ignore: bool) -> Self {
        self.ignore_unknown_fields = ignore;
        self
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Reads Protobuf-JSON against a schema, reporting every field to a visitor.
///
/// Members may use either the JSON name or the proto name of a field, but a
/// field may appear only once. `null` means "absent" except for
/// `google.protobuf.Value` and `google.protobuf.NullValue`, where it is a
/// value. Fields are reported in document order.
#[derive(Debug, Clone)]
pub struct JsonReader<'s> {
    schema: &'s Schema,
    config: JsonReaderConfig,
}

impl<'s> JsonReader<'s> {
    /// Creates a reader with the default configuration
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            config: JsonReaderConfig::default(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: JsonReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Parses `json` as a message of type `message_type`.
    ///
    /// On error the visitor has already seen every member before the failing
    /// one.
    pub fn read<V>(&self, message_type: MessageId, json: &str, visitor: &mut V) -> Result<()>
    where
        V: ProtoVisitor + ?Sized,
    {
        visitor.init(self.schema.message(message_type))?;
        self.emit(message_type, json, visitor)?;
        visitor.destroy()
    }

    /// Reports the fields of `json` without the `init`/`destroy` bracket,
    /// for drivers such as [`WireWriter::encode_with`] that issue it
    /// themselves.
    ///
    /// [`WireWriter::encode_with`]: crate::binary::WireWriter::encode_with
    pub fn emit<V>(&self, message_type: MessageId, json: &str, visitor: &mut V) -> Result<()>
    where
        V: ProtoVisitor + ?Sized,
    {
        let message = self.schema.message(message_type);
        debug!(
            "Reading {} from {} bytes of JSON",
            message.full_name(),
            json.len()
        );

        let mut cx = Context {
            schema: self.schema,
            config: &self.config,
            visitor,
            error: None,
        };
        let mut de = serde_json::Deserializer::from_str(json);
        let seed = MessageSeed {
            cx: &mut cx,
            message,
            field: None,
            depth: 0,
            null_ok: false,
        };
        match seed.deserialize(&mut de).and_then(|()| de.end()) {
            Ok(()) => Ok(()),
            Err(err) => Err(cx.error.take().unwrap_or(Error::Json(err))),
        }
    }
}

/// One JSON value that is not a message: a scalar, or the kind of a
/// container that was skipped
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Null,
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Str(String),
    Array,
    Object,
}

impl Token {
    fn kind(&self) -> &'static str {
        match self {
            Token::Null => "null",
            Token::Bool(_) => "boolean",
            Token::Signed(_) | Token::Unsigned(_) | Token::Float(_) => "number",
            Token::Str(_) => "string",
            Token::Array => "array",
            Token::Object => "object",
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Token::Null)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        deserializer.deserialize_any(TokenVisitor)
    }
}

struct TokenVisitor;

impl<'de> Visitor<'de> for TokenVisitor {
    type Value = Token;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> StdResult<Token, E> {
        Ok(Token::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> StdResult<Token, E> {
        Ok(Token::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> StdResult<Token, E> {
        Ok(Token::Signed(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> StdResult<Token, E> {
        Ok(Token::Unsigned(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> StdResult<Token, E> {
        Ok(Token::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> StdResult<Token, E> {
        Ok(Token::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> StdResult<Token, E> {
        Ok(Token::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> StdResult<Token, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Token::Array)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> StdResult<Token, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Token::Object)
    }
}

/// State shared by the seeds of one read.
///
/// `serde` callbacks can only fail with the deserializer's error type, so the
/// first [`Error`] raised inside one is parked in `error` and returned in
/// place of the `serde_json` error that carries it out.
struct Context<'a, V: ?Sized> {
    schema: &'a Schema,
    config: &'a JsonReaderConfig,
    visitor: &'a mut V,
    error: Option<Error>,
}

impl<'a, V: ProtoVisitor + ?Sized> Context<'a, V> {
    fn schema(&self) -> &'a Schema {
        self.schema
    }

    fn fail<E: de::Error>(&mut self, error: Error) -> E {
        let message = error.to_string();
        if self.error.is_none() {
            self.error = Some(error);
        }
        E::custom(message)
    }

    fn check<T, E: de::Error>(&mut self, result: Result<T>) -> StdResult<T, E> {
        result.map_err(|error| self.fail(error))
    }

    /// Enters `field`, unless reading the root message
    fn open(&mut self, field: Option<&Field>, depth: usize) -> Result<()> {
        let Some(field) = field else {
            return Ok(());
        };
        if depth > self.config.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.config.max_depth,
            });
        }
        self.visitor.enter(field)
    }

    fn close(&mut self, field: Option<&Field>) -> Result<()> {
        match field {
            Some(field) => self.visitor.leave(field),
            None => Ok(()),
        }
    }

    fn message_of(&self, field: &Field) -> Result<&'a MessageType> {
        let schema = self.schema;
        field
            .message_type()
            .map(|id| schema.message(id))
            .ok_or_else(|| Error::internal(format!("field '{}' is not a message", field.name())))
    }

    fn accepts_null(&self, field: &Field) -> bool {
        match field.field_type() {
            FieldType::Enum(id) => self.schema.enumeration(id).is_null_value(),
            FieldType::Message(id) => {
                self.schema.message(id).well_known() == Some(WellKnownType::Value)
            }
            _ => false,
        }
    }

    /// Converts a non-message token; `None` for message fields and for
    /// ignored enum names
    fn singular_value(&self, field: &Field, token: &Token) -> Result<Option<Value>> {
        match field.field_type() {
            FieldType::Scalar(kind) => scalar_value(kind, token).map(Some),
            FieldType::Enum(id) => Ok(self.enum_number(id, token)?.map(Value::Enum)),
            FieldType::Message(_) => Ok(None),
            FieldType::Unknown(_) => Err(Error::internal(format!(
                "field {} has no declared type",
                field.number()
            ))),
        }
    }

    fn enum_number(&self, id: EnumId, token: &Token) -> Result<Option<i32>> {
        let enum_type = self.schema.enumeration(id);
        match token {
            Token::Null if enum_type.is_null_value() => Ok(Some(0)),
            Token::Str(name) => match enum_type.number_of(name) {
                Some(number) => Ok(Some(number)),
                None if self.config.ignore_unknown_fields => Ok(None),
                None => Err(Error::unknown_enum_value(enum_type.full_name(), name.as_str())),
            },
            Token::Signed(_) | Token::Unsigned(_) | Token::Float(_) => {
                Ok(Some(int_token(token, "enum", i32::MIN, i32::MAX)?))
            }
            other => Err(unexpected(enum_type.full_name(), "enum name or number", other)),
        }
    }

    /// Reports a singular scalar or enum member; `null` leaves it absent
    fn scalar_field(&mut self, field: &Field, token: Token) -> Result<()> {
        if token.is_null() && !self.accepts_null(field) {
            return Ok(());
        }
        match self.singular_value(field, &token)? {
            Some(value) => emit_scalar(field, &value, &mut *self.visitor),
            None => Ok(()),
        }
    }

    /// Reads a message given as a string, number, boolean or `null`
    fn message_token(
        &mut self,
        message: &MessageType,
        field: Option<&Field>,
        depth: usize,
        null_ok: bool,
        token: Token,
    ) -> Result<()> {
        let wkt = message.well_known();
        let name = message.full_name();
        if token.is_null() && wkt != Some(WellKnownType::Value) {
            if null_ok {
                return Ok(());
            }
            return Err(unexpected(name, expected_form(wkt), &token));
        }

        match wkt {
            Some(wkt @ (WellKnownType::Duration | WellKnownType::Timestamp)) => {
                let Token::Str(text) = &token else {
                    return Err(unexpected(name, "string", &token));
                };
                let (seconds, nanos) = if wkt == WellKnownType::Duration {
                    parse_duration(text)?
                } else {
                    parse_timestamp(text)?
                };
                self.open(field, depth)?;
                if seconds != 0 {
                    self.visitor.visit_int64(wkt_field(message, 1)?, seconds)?;
                }
                if nanos != 0 {
                    self.visitor.visit_int32(wkt_field(message, 2)?, nanos)?;
                }
            }
            Some(WellKnownType::FieldMask) => {
                let Token::Str(text) = &token else {
                    return Err(unexpected(name, "string", &token));
                };
                let paths = parse_field_mask(text)?;
                self.open(field, depth)?;
                visit_repeated(
                    &mut *self.visitor,
                    wkt_field(message, 1)?,
                    paths.iter().map(|p| Scalar::String(p.as_str())),
                )?;
            }
            Some(WellKnownType::Value) => {
                self.open(field, depth)?;
                match &token {
                    Token::Null => self.visitor.visit_enum(wkt_field(message, 1)?, 0)?,
                    Token::Signed(v) => self.visitor.visit_double(wkt_field(message, 2)?, *v as f64)?,
                    Token::Unsigned(v) => {
                        self.visitor.visit_double(wkt_field(message, 2)?, *v as f64)?
                    }
                    Token::Float(v) => self.visitor.visit_double(wkt_field(message, 2)?, *v)?,
                    Token::Str(s) => self.visitor.visit_string(wkt_field(message, 3)?, s)?,
                    Token::Bool(b) => self.visitor.visit_bool(wkt_field(message, 4)?, *b)?,
                    Token::Array | Token::Object => {
                        return Err(Error::internal("container reached the scalar Value path"))
                    }
                }
            }
            Some(wrapper) if wrapper.is_wrapper() => {
                let kind = wrapper
                    .wrapped_kind()
                    .ok_or_else(|| Error::internal(format!("{} is not a wrapper", name)))?;
                let value = scalar_value(kind, &token)?;
                self.open(field, depth)?;
                if !is_default(&value) {
                    emit_scalar(wkt_field(message, 1)?, &value, &mut *self.visitor)?;
                }
            }
            _ => return Err(unexpected(name, expected_form(wkt), &token)),
        }
        self.close(field)
    }

    /// Reads the members of a plain message object
    fn read_fields<'de, A>(&mut self, message: &'a MessageType, map: &mut A, depth: usize) -> StdResult<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            let field = message
                .field_by_json_name(&key)
                .or_else(|| message.field_by_name(&key));
            let Some(field) = field else {
                if self.config.ignore_unknown_fields {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
                return Err(self.fail(Error::unknown_field(message.full_name(), key)));
            };
            if !seen.insert(field.number()) {
                return Err(self.fail(Error::duplicate_field(message.full_name(), field.name())));
            }

            if field.is_map() {
                map.next_value_seed(MapSeed {
                    cx: &mut *self,
                    field,
                    depth,
                })?;
            } else if field.is_repeated() {
                map.next_value_seed(ListSeed {
                    cx: &mut *self,
                    field,
                    depth,
                })?;
            } else if let FieldType::Message(id) = field.field_type() {
                let target = self.schema().message(id);
                map.next_value_seed(MessageSeed {
                    cx: &mut *self,
                    message: target,
                    field: Some(field),
                    depth: depth + 1,
                    null_ok: true,
                })?;
            } else {
                let token = map.next_value::<Token>()?;
                let result = self.scalar_field(field, token);
                self.check(result)?;
            }
        }
        Ok(())
    }

    /// Reads the elements of a repeated field
    fn read_list<'de, A>(&mut self, field: &'a Field, seq: &mut A, depth: usize) -> StdResult<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        if let FieldType::Message(id) = field.field_type() {
            let target = self.schema().message(id);
            while seq
                .next_element_seed(MessageSeed {
                    cx: &mut *self,
                    message: target,
                    field: Some(field),
                    depth: depth + 1,
                    null_ok: false,
                })?
                .is_some()
            {}
            return Ok(());
        }

        let mut packed = false;
        while let Some(token) = seq.next_element::<Token>()? {
            if token.is_null() && !self.accepts_null(field) {
                return Err(self.fail(Error::invalid_json(field.name(), "null list element")));
            }
            let value = self.singular_value(field, &token);
            let Some(value) = self.check(value)? else {
                continue;
            };
            if !packed && field.is_packed() {
                packed = true;
                let result = self.visitor.enter_packed(field);
                self.check(result)?;
            }
            let result = emit_scalar(field, &value, &mut *self.visitor);
            self.check(result)?;
        }
        if packed {
            let result = self.visitor.leave_packed(field);
            self.check(result)?;
        }
        Ok(())
    }

    /// Reads the members of a map object, one entry per member
    fn read_map_entries<'de, A>(&mut self, field: &'a Field, map: &mut A, depth: usize) -> StdResult<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let entry = self.message_of(field);
        let entry = self.check(entry)?;
        let (Some(key_field), Some(value_field)) = (entry.map_key(), entry.map_value()) else {
            return Err(self.fail(Error::unsupported(format!(
                "'{}' is not a map entry",
                entry.full_name()
            ))));
        };

        let mut keys = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            if !keys.insert(key.clone()) {
                return Err(self.fail(Error::invalid_json(
                    field.name(),
                    format!("duplicate map key '{}'", key),
                )));
            }
            let key_value = map_key(key_field, &key);
            let key_value = self.check(key_value)?;

            if let FieldType::Message(id) = value_field.field_type() {
                let target = self.schema().message(id);
                let result = self
                    .visitor
                    .enter(field)
                    .and_then(|()| emit_scalar(key_field, &key_value, &mut *self.visitor));
                self.check(result)?;
                map.next_value_seed(MessageSeed {
                    cx: &mut *self,
                    message: target,
                    field: Some(value_field),
                    depth: depth + 1,
                    null_ok: false,
                })?;
                let result = self.visitor.leave(field);
                self.check(result)?;
                continue;
            }

            let token = map.next_value::<Token>()?;
            if token.is_null() && !self.accepts_null(value_field) {
                return Err(self.fail(Error::invalid_json(
                    field.name(),
                    format!("null value for map key '{}'", key),
                )));
            }
            let value = self.singular_value(value_field, &token);
            // an ignored enum name drops the whole entry
            let Some(value) = self.check(value)? else {
                continue;
            };
            let result = self.emit_entry(field, key_field, &key_value, value_field, &value);
            self.check(result)?;
        }
        Ok(())
    }

    fn emit_entry(
        &mut self,
        field: &Field,
        key_field: &Field,
        key: &Value,
        value_field: &Field,
        value: &Value,
    ) -> Result<()> {
        self.visitor.enter(field)?;
        emit_scalar(key_field, key, &mut *self.visitor)?;
        emit_scalar(value_field, value, &mut *self.visitor)?;
        self.visitor.leave(field)
    }
}

macro_rules! forward_tokens {
    () => {
        fn visit_unit<E: de::Error>(self) -> StdResult<(), E> {
            self.token(Token::Null)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> StdResult<(), E> {
            self.token(Token::Bool(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> StdResult<(), E> {
            self.token(Token::Signed(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> StdResult<(), E> {
            self.token(Token::Unsigned(v))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> StdResult<(), E> {
            self.token(Token::Float(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> StdResult<(), E> {
            self.token(Token::Str(v.to_string()))
        }
    };
}

macro_rules! seed_by_any {
    ($seed:ident) => {
        impl<'de, V: ProtoVisitor + ?Sized> DeserializeSeed<'de> for $seed<'_, '_, V> {
            type Value = ();

            fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> StdResult<(), D::Error> {
                deserializer.deserialize_any(self)
            }
        }
    };
}

/// Reads one message value, bracketing it with `field` unless it is the root
struct MessageSeed<'c, 'a, V: ?Sized> {
    cx: &'c mut Context<'a, V>,
    message: &'a MessageType,
    field: Option<&'a Field>,
    depth: usize,
    null_ok: bool,
}

impl<V: ProtoVisitor + ?Sized> MessageSeed<'_, '_, V> {
    fn token<E: de::Error>(self, token: Token) -> StdResult<(), E> {
        let result = self
            .cx
            .message_token(self.message, self.field, self.depth, self.null_ok, token);
        self.cx.check(result)
    }

    fn mismatch<E: de::Error>(self, found: Token) -> StdResult<(), E> {
        let error = unexpected(
            self.message.full_name(),
            expected_form(self.message.well_known()),
            &found,
        );
        Err(self.cx.fail(error))
    }
}

seed_by_any!(MessageSeed);

impl<'de, V: ProtoVisitor + ?Sized> Visitor<'de> for MessageSeed<'_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a JSON value for {}", self.message.full_name())
    }

    forward_tokens!();

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> StdResult<(), A::Error> {
        let wkt = self.message.well_known();
        if !matches!(
            wkt,
            None | Some(WellKnownType::Empty | WellKnownType::Struct | WellKnownType::Value)
        ) {
            return self.mismatch(Token::Object);
        }
        let (cx, message, field, depth) = (self.cx, self.message, self.field, self.depth);
        let result = cx.open(field, depth);
        cx.check(result)?;
        match wkt {
            Some(WellKnownType::Struct) => {
                let fields = wkt_field(message, 1);
                let fields = cx.check(fields)?;
                cx.read_map_entries(fields, &mut map, depth)?;
            }
            Some(WellKnownType::Value) => {
                let inner = wkt_field(message, 5).and_then(|f| Ok((f, cx.message_of(f)?)));
                let (struct_field, structure) = cx.check(inner)?;
                let result = cx.open(Some(struct_field), depth + 1);
                cx.check(result)?;
                let fields = wkt_field(structure, 1);
                let fields = cx.check(fields)?;
                cx.read_map_entries(fields, &mut map, depth + 1)?;
                let result = cx.close(Some(struct_field));
                cx.check(result)?;
            }
            _ => cx.read_fields(message, &mut map, depth)?,
        }
        let result = cx.close(field);
        cx.check(result)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> StdResult<(), A::Error> {
        let wkt = self.message.well_known();
        if !matches!(wkt, Some(WellKnownType::ListValue | WellKnownType::Value)) {
            return self.mismatch(Token::Array);
        }
        let (cx, message, field, depth) = (self.cx, self.message, self.field, self.depth);
        let result = cx.open(field, depth);
        cx.check(result)?;
        if wkt == Some(WellKnownType::ListValue) {
            let values = wkt_field(message, 1);
            let values = cx.check(values)?;
            cx.read_list(values, &mut seq, depth)?;
        } else {
            let inner = wkt_field(message, 6).and_then(|f| Ok((f, cx.message_of(f)?)));
            let (list_field, list) = cx.check(inner)?;
            let result = cx.open(Some(list_field), depth + 1);
            cx.check(result)?;
            let values = wkt_field(list, 1);
            let values = cx.check(values)?;
            cx.read_list(values, &mut seq, depth + 1)?;
            let result = cx.close(Some(list_field));
            cx.check(result)?;
        }
        let result = cx.close(field);
        cx.check(result)
    }
}

/// Reads the array of a repeated field; `null` leaves it empty
struct ListSeed<'c, 'a, V: ?Sized> {
    cx: &'c mut Context<'a, V>,
    field: &'a Field,
    depth: usize,
}

impl<V: ProtoVisitor + ?Sized> ListSeed<'_, '_, V> {
    fn token<E: de::Error>(self, token: Token) -> StdResult<(), E> {
        if token.is_null() {
            return Ok(());
        }
        Err(self.cx.fail(unexpected(self.field.name(), "array", &token)))
    }
}

seed_by_any!(ListSeed);

impl<'de, V: ProtoVisitor + ?Sized> Visitor<'de> for ListSeed<'_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an array for field '{}'", self.field.name())
    }

    forward_tokens!();

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> StdResult<(), A::Error> {
        Err(self.cx.fail(unexpected(self.field.name(), "array", &Token::Object)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> StdResult<(), A::Error> {
        self.cx.read_list(self.field, &mut seq, self.depth)
    }
}

/// Reads the object of a map field; `null` leaves it empty
struct MapSeed<'c, 'a, V: ?Sized> {
    cx: &'c mut Context<'a, V>,
    field: &'a Field,
    depth: usize,
}

impl<V: ProtoVisitor + ?Sized> MapSeed<'_, '_, V> {
    fn token<E: de::Error>(self, token: Token) -> StdResult<(), E> {
        if token.is_null() {
            return Ok(());
        }
        Err(self.cx.fail(unexpected(self.field.name(), "object", &token)))
    }
}

seed_by_any!(MapSeed);

impl<'de, V: ProtoVisitor + ?Sized> Visitor<'de> for MapSeed<'_, '_, V> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object for field '{}'", self.field.name())
    }

    forward_tokens!();

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> StdResult<(), A::Error> {
        Err(self.cx.fail(unexpected(self.field.name(), "object", &Token::Array)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> StdResult<(), A::Error> {
        self.cx.read_map_entries(self.field, &mut map, self.depth)
    }
}

fn expected_form(wkt: Option<WellKnownType>) -> &'static str {
    match wkt {
        Some(WellKnownType::Duration | WellKnownType::Timestamp | WellKnownType::FieldMask) => {
            "string"
        }
        Some(WellKnownType::ListValue) => "array",
        Some(WellKnownType::Value) => "JSON value",
        Some(wrapper) => wrapper.wrapped_kind().map_or("object", |kind| kind.as_str()),
        None => "object",
    }
}

fn wkt_field(message: &MessageType, number: u32) -> Result<&Field> {
    message.field(number).ok_or_else(|| {
        Error::schema(format!(
            "well-known type '{}' lacks field {}",
            message.full_name(),
            number
        ))
    })
}

fn unexpected(context: &str, expected: &str, found: &Token) -> Error {
    Error::invalid_json(context, format!("expected {}, found {}", expected, found.kind()))
}

fn emit_scalar<V: ProtoVisitor + ?Sized>(field: &Field, value: &Value, visitor: &mut V) -> Result<()> {
    match value.as_scalar() {
        Some(scalar) => scalar.visit(field, visitor),
        None => Err(Error::internal(format!(
            "field '{}' expects a scalar",
            field.name()
        ))),
    }
}

fn is_default(value: &Value) -> bool {
    match value {
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) | Value::Enum(v) => *v == 0,
        Value::UInt32(v) | Value::Fixed32(v) => *v == 0,
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => *v == 0,
        Value::UInt64(v) | Value::Fixed64(v) => *v == 0,
        Value::Float(v) => v.to_bits() == 0,
        Value::Double(v) => v.to_bits() == 0,
        Value::Bool(v) => !*v,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        Value::Message(_) => false,
    }
}

/// Parses a map key from its JSON object member name
fn map_key(field: &Field, key: &str) -> Result<Value> {
    match field.scalar() {
        Some(ScalarKind::String) => Ok(Value::String(key.to_string())),
        Some(ScalarKind::Bool) => match key {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Error::invalid_json("bool map key", format!("'{}'", key))),
        },
        Some(kind) => scalar_value(kind, &Token::Str(key.to_string())),
        None => Err(Error::schema(format!(
            "map key field '{}' is not a scalar",
            field.name()
        ))),
    }
}

/// Converts a JSON token to a scalar of `kind`
fn scalar_value(kind: ScalarKind, token: &Token) -> Result<Value> {
    Ok(match kind {
        ScalarKind::Int32 => Value::Int32(int_token(token, "int32", i32::MIN, i32::MAX)?),
        ScalarKind::SInt32 => Value::SInt32(int_token(token, "sint32", i32::MIN, i32::MAX)?),
        ScalarKind::SFixed32 => Value::SFixed32(int_token(token, "sfixed32", i32::MIN, i32::MAX)?),
        ScalarKind::UInt32 => Value::UInt32(int_token(token, "uint32", u32::MIN, u32::MAX)?),
        ScalarKind::Fixed32 => Value::Fixed32(int_token(token, "fixed32", u32::MIN, u32::MAX)?),
        ScalarKind::Int64 => Value::Int64(int_token(token, "int64", i64::MIN, i64::MAX)?),
        ScalarKind::SInt64 => Value::SInt64(int_token(token, "sint64", i64::MIN, i64::MAX)?),
        ScalarKind::SFixed64 => Value::SFixed64(int_token(token, "sfixed64", i64::MIN, i64::MAX)?),
        ScalarKind::UInt64 => Value::UInt64(int_token(token, "uint64", u64::MIN, u64::MAX)?),
        ScalarKind::Fixed64 => Value::Fixed64(int_token(token, "fixed64", u64::MIN, u64::MAX)?),
        ScalarKind::Double => Value::Double(float_token(token, "double")?),
        ScalarKind::Float => {
            let value = float_token(token, "float")?;
            if value.is_finite() && value.abs() > f32::MAX as f64 {
                return Err(Error::out_of_range("float", value));
            }
            Value::Float(value as f32)
        }
        ScalarKind::Bool => match token {
            Token::Bool(b) => Value::Bool(*b),
            other => return Err(unexpected("bool", "boolean", other)),
        },
        ScalarKind::String => match token {
            Token::Str(s) => Value::String(s.clone()),
            other => return Err(unexpected("string", "string", other)),
        },
        ScalarKind::Bytes => match token {
            Token::Str(s) => Value::Bytes(decode_base64(s)?),
            other => return Err(unexpected("bytes", "base64 string", other)),
        },
    })
}

fn int_token<T>(token: &Token, target: &'static str, min: T, max: T) -> Result<T>
where
    T: Into<i128> + TryFrom<i128>,
{
    let value = match token {
        Token::Signed(v) => *v as i128,
        Token::Unsigned(v) => *v as i128,
        Token::Float(v) => integer_from_float(*v, target)?,
        Token::Str(s) => integer_from_str(s, target)?,
        other => return Err(unexpected(target, "integer", other)),
    };
    in_range(value, target, min, max)
}

fn in_range<T>(value: i128, target: &'static str, min: T, max: T) -> Result<T>
where
    T: Into<i128> + TryFrom<i128>,
{
    if value < min.into() || value > max.into() {
        return Err(Error::out_of_range(target, value));
    }
    T::try_from(value).map_err(|_| Error::out_of_range(target, value))
}

/// Parses an integer written in decimal, exponent or fraction form
/// (`"12"`, `"1.2e1"`, `"120e-1"`) without going through a float
fn integer_from_str(s: &str, target: &'static str) -> Result<i128> {
    if let Ok(v) = s.parse::<i128>() {
        return Ok(v);
    }
    let invalid = || Error::invalid_json(target, format!("'{}' is not a number", s));

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (mantissa, exponent) = match body.find(|c| c == 'e' || c == 'E') {
        Some(at) => (
            &body[..at],
            body[at + 1..].parse::<i32>().map_err(|_| invalid())?,
        ),
        None => (body, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let mut digits = format!("{}{}", whole, fraction);
    let mut scale = exponent as i64 - fraction.len() as i64;
    while scale < 0 && digits.ends_with('0') {
        digits.pop();
        scale += 1;
    }
    if scale < 0 {
        return Err(Error::invalid_json(target, format!("'{}' is not an integer", s)));
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() as i64 + scale > 39 {
        return Err(Error::out_of_range(target, s));
    }
    let mut value: i128 = digits.parse().map_err(|_| Error::out_of_range(target, s))?;
    for _ in 0..scale {
        value = value
            .checked_mul(10)
            .ok_or_else(|| Error::out_of_range(target, s))?;
    }
    Ok(if negative { -value } else { value })
}

/// Accepts floats with no fractional part, such as `4.0` or `1e3`.
///
/// A JSON number with a fraction or exponent arrives as an `f64`, so only
/// magnitudes below 2^53 are known to be exact.
fn integer_from_float(v: f64, target: &'static str) -> Result<i128> {
    if !v.is_finite() {
        return Err(Error::out_of_range(target, v));
    }
    if v.fract() != 0.0 {
        return Err(Error::invalid_json(target, format!("{} is not an integer", v)));
    }
    if v.abs() >= MAX_EXACT_FLOAT {
        return Err(Error::out_of_range(target, v));
    }
    Ok(v as i128)
}

fn float_token(token: &Token, target: &'static str) -> Result<f64> {
    match token {
        Token::Signed(v) => Ok(*v as f64),
        Token::Unsigned(v) => Ok(*v as f64),
        Token::Float(v) => Ok(*v),
        Token::Str(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            text => {
                if !text
                    .bytes()
                    .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'.' | b'e' | b'E' | b'+'))
                {
                    return Err(Error::invalid_json(target, format!("'{}' is not a number", text)));
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| Error::invalid_json(target, format!("'{}' is not a number", text)))?;
                if value.is_infinite() {
                    return Err(Error::out_of_range(target, text));
                }
                Ok(value)
            }
        },
        other => Err(unexpected(target, "number", other)),
    }
}

/// Decodes standard Base64, falling back to the URL-safe alphabet; padding
/// is optional in both
fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let padded = text.ends_with('=');
    let (standard, url_safe) = if padded {
        (&STANDARD, &URL_SAFE)
    } else {
        (&STANDARD_NO_PAD, &URL_SAFE_NO_PAD)
    };
    standard
        .decode(text)
        .or_else(|_| url_safe.decode(text))
        .map_err(|e| Error::InvalidBase64 {
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SchemaBuilder};
    use crate::value::{DynamicMessage, FieldValue, MessageBuilder};
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MessageId) {
        let mut builder = SchemaBuilder::new().with_well_known_types();
        let id = builder.message("test.Sample");
        let color = builder.enumeration("test.Color");
        builder.enum_value(color, "RED", 0).enum_value(color, "BLUE", 1);
        let duration = FieldType::Message(builder.message("google.protobuf.Duration"));
        let structure = FieldType::Message(builder.message("google.protobuf.Struct"));
        builder
            .add_field(id, FieldSpec::scalar(1, "string_field", ScalarKind::String))
            .add_field(id, FieldSpec::scalar(2, "long_field", ScalarKind::Int64))
            .add_field(id, FieldSpec::scalar(3, "small", ScalarKind::UInt32))
            .add_field(id, FieldSpec::scalar(4, "ratio", ScalarKind::Float))
            .add_field(id, FieldSpec::scalar(5, "ids", ScalarKind::Int32).repeated())
            .add_field(id, FieldSpec::scalar(6, "blob", ScalarKind::Bytes))
            .add_field(id, FieldSpec::new(7, "color", FieldType::Enum(color)))
            .add_field(id, FieldSpec::new(8, "timeout", duration))
            .add_field(id, FieldSpec::new(9, "extra", structure))
            .add_field(id, FieldSpec::new(10, "child", FieldType::Message(id)));
        builder.add_map_field(
            id,
            11,
            "map_field",
            ScalarKind::String,
            FieldType::Scalar(ScalarKind::Int32),
        );
        (builder.build().unwrap(), id)
    }

    fn read_with(json: &str, config: JsonReaderConfig) -> Result<DynamicMessage> {
        let (schema, id) = schema();
        let mut builder = MessageBuilder::new(&schema);
        JsonReader::new(&schema)
            .with_config(config)
            .read(id, json, &mut builder)?;
        builder.finish()
    }

    fn read(json: &str) -> Result<DynamicMessage> {
        read_with(json, JsonReaderConfig::new())
    }

    #[test]
    fn test_basic_scenario() {
        let message = read(r#"{"stringField":"hi","longField":"42"}"#).unwrap();
        assert_eq!(message.get_single(1), Some(&Value::String("hi".into())));
        assert_eq!(message.get_single(2), Some(&Value::Int64(42)));

        let message = read(r#"{"string_field":"hi","long_field":42}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(42)));
    }

    #[test]
    fn test_map_scenario() {
        let message = read(r#"{"mapField":{"key1":1}}"#).unwrap();
        assert_eq!(
            message.get(11),
            Some(&FieldValue::Map(vec![(
                Value::String("key1".into()),
                Value::Int32(1)
            )]))
        );
        assert!(read(r#"{"mapField":{"k":1,"k":2}}"#).is_err());
        assert!(read(r#"{"mapField":{"k":null}}"#).is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_fields() {
        assert!(matches!(
            read(r#"{"longField":"1","long_field":"2"}"#),
            Err(Error::DuplicateField { .. })
        ));
        assert!(matches!(
            read(r#"{"nope":1}"#),
            Err(Error::UnknownField { .. })
        ));
        let message = read_with(
            r#"{"nope":{"deep":[1]},"color":"GREEN","stringField":"x"}"#,
            JsonReaderConfig::new().ignore_unknown_fields(true),
        )
        .unwrap();
        assert_eq!(message.get(7), None);
        assert_eq!(message.get_single(1), Some(&Value::String("x".into())));
    }

    #[test]
    fn test_integer_forms() {
        let message = read(r#"{"longField":4.0,"small":"4294967295","ids":[1,"2",3e0]}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(4)));
        assert_eq!(message.get_single(3), Some(&Value::UInt32(u32::MAX)));
        assert_eq!(
            message.get(5),
            Some(&FieldValue::List(vec![
                Value::Int32(1),
                Value::Int32(2),
                Value::Int32(3)
            ]))
        );

        assert!(read(r#"{"longField":4.5}"#).is_err());
        assert!(matches!(
            read(r#"{"small":4294967296}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            read(r#"{"ids":[2147483648]}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(read(r#"{"longField":"12abc"}"#).is_err());
    }

    #[test]
    fn test_float_forms() {
        let message = read(r#"{"ratio":"NaN"}"#).unwrap();
        assert!(matches!(message.get_single(4), Some(Value::Float(v)) if v.is_nan()));
        let message = read(r#"{"ratio":"-Infinity"}"#).unwrap();
        assert_eq!(message.get_single(4), Some(&Value::Float(f32::NEG_INFINITY)));
        let message = read(r#"{"ratio":"1.5"}"#).unwrap();
        assert_eq!(message.get_single(4), Some(&Value::Float(1.5)));

        assert!(matches!(
            read(r#"{"ratio":3.5e38}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            read(r#"{"ratio":"1e400"}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(read(r#"{"ratio":"inf"}"#).is_err());
    }

    #[test]
    fn test_bytes_and_enums() {
        let message = read(r#"{"blob":"-_8","color":"BLUE"}"#).unwrap();
        assert_eq!(message.get_single(6), Some(&Value::Bytes(vec![0xFB, 0xFF])));
        assert_eq!(message.get_single(7), Some(&Value::Enum(1)));

        let message = read(r#"{"blob":"+/8=","color":7}"#).unwrap();
        assert_eq!(message.get_single(6), Some(&Value::Bytes(vec![0xFB, 0xFF])));
        assert_eq!(message.get_single(7), Some(&Value::Enum(7)));

        assert!(matches!(
            read(r#"{"blob":"!!"}"#),
            Err(Error::InvalidBase64 { .. })
        ));
        assert!(matches!(
            read(r#"{"color":"GREEN"}"#),
            Err(Error::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn test_nulls_mean_absent() {
        let message = read(r#"{"stringField":null,"ids":null,"child":null}"#).unwrap();
        assert!(message.is_empty());
        assert!(read(r#"{"ids":[null]}"#).is_err());
    }

    #[test]
    fn test_duration_bounds() {
        let message = read(r#"{"timeout":"1.123456789s"}"#).unwrap();
        let timeout = message.get_single(8).and_then(Value::as_message).unwrap();
        assert_eq!(timeout.get_single(1), Some(&Value::Int64(1)));
        assert_eq!(timeout.get_single(2), Some(&Value::Int32(123_456_789)));

        let err = read(r#"{"timeout":"315576000001s"}"#).unwrap_err();
        assert!(matches!(err, Error::WellKnownDecode { .. }));
        assert!(err.is_decode());
    }

    #[test]
    fn test_struct_values() {
        let message = read(r#"{"extra":{"a":null,"b":[1,"x",true,{}]}}"#).unwrap();
        let extra = message.get_single(9).and_then(Value::as_message).unwrap();
        let Some(FieldValue::Map(entries)) = extra.get(1) else {
            panic!("expected struct fields");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, Value::String("a".into()));
        let null = entries[0].1.as_message().unwrap();
        assert_eq!(null.get_single(1), Some(&Value::Enum(0)));
        let list = entries[1].1.as_message().unwrap();
        let list = list.get_single(6).and_then(Value::as_message).unwrap();
        match list.get(1) {
            Some(FieldValue::List(items)) => assert_eq!(items.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recursion_limit() {
        let json = r#"{"child":{"child":{"child":{}}}}"#;
        assert!(matches!(
            read_with(json, JsonReaderConfig::new().max_depth(2)),
            Err(Error::RecursionLimit { limit: 2 })
        ));
        assert!(read_with(json, JsonReaderConfig::new().max_depth(3)).is_ok());
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(read("[1]"), Err(Error::InvalidJson { .. })));
        assert!(matches!(read("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_large_integers_are_exact_or_rejected() {
        assert!(matches!(
            read(r#"{"longField":9007199254740993.0}"#),
            Err(Error::OutOfRange { .. })
        ));
        let message = read(r#"{"longField":9007199254740993}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(9_007_199_254_740_993)));

        let message = read(r#"{"longField":"9007199254740993.0"}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(9_007_199_254_740_993)));
        let message = read(r#"{"longField":"90071992547409930e-1"}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(9_007_199_254_740_993)));
        let message = read(r#"{"longField":"1000e-3","small":"4.2e1"}"#).unwrap();
        assert_eq!(message.get_single(2), Some(&Value::Int64(1)));
        assert_eq!(message.get_single(3), Some(&Value::UInt32(42)));

        assert!(matches!(
            read(r#"{"longField":"1.5"}"#),
            Err(Error::InvalidJson { .. })
        ));
        assert!(matches!(
            read(r#"{"longField":"9223372036854775808"}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            read(r#"{"longField":"1e400"}"#),
            Err(Error::OutOfRange { .. })
        ));
        assert!(read(r#"{"longField":"1e"}"#).is_err());
    }

    #[test]
    fn test_members_are_reported_while_parsing() {
        use crate::visitor::{RecordingVisitor, VisitEvent};

        let (schema, id) = schema();
        let mut recorder = RecordingVisitor::new();
        let err = JsonReader::new(&schema)
            .read(id, r#"{"stringField":"a","longField":"#, &mut recorder)
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(
            recorder.into_events(),
            vec![
                VisitEvent::Init("test.Sample".into()),
                VisitEvent::Scalar {
                    field: 1,
                    value: Value::String("a".into())
                },
            ]
        );
    }

    #[test]
    fn test_errors_inside_nested_values_keep_their_kind() {
        assert!(matches!(
            read(r#"{"child":{"child":{"nope":1}}}"#),
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            read(r#"{"mapField":{"k":"x"}}"#),
            Err(Error::InvalidJson { .. })
        ));
        assert!(matches!(
            read(r#"{"ids":{}}"#),
            Err(Error::InvalidJson { .. })
        ));
        assert!(matches!(
            read(r#"{"timeout":{}}"#),
            Err(Error::InvalidJson { .. })
        ));
    }
}
