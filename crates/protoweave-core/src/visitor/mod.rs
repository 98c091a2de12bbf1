//! The streaming visitor protocol.
//!
//! Every reader drives a [`ProtoVisitor`] and every sink implements one:
//! the binary reader and [`Emit`] implementations produce calls, while the
//! binary writer, the JSON writer and the message builder consume them. A
//! traversal is bracketed by [`ProtoVisitor::init`] and
//! [`ProtoVisitor::destroy`]; embedded messages and map entries by
//! [`ProtoVisitor::enter`] and [`ProtoVisitor::leave`]; packed runs by
//! [`ProtoVisitor::enter_packed`] and [`ProtoVisitor::leave_packed`].
//!
//! ## Implementing a visitor
//!
//! All per-kind scalar methods forward to [`ProtoVisitor::visit_scalar`] by
//! default, so a sink can handle every scalar in one place and override
//! individual kinds only where it cares.
//!
//! ```
//! use protoweave_core::schema::Field;
//! use protoweave_core::visitor::{ProtoVisitor, Scalar};
//! use protoweave_core::Result;
//!
//! #[derive(Default)]
//! struct CountingVisitor {
//!     scalars: usize,
//!     depth: usize,
//! }
//!
//! impl ProtoVisitor for CountingVisitor {
//!     fn visit_scalar(&mut self, _field: &Field, _value: Scalar<'_>) -> Result<()> {
//!         self.scalars += 1;
//!         Ok(())
//!     }
//!
//!     fn enter(&mut self, _field: &Field) -> Result<()> {
//!         self.depth += 1;
//!         Ok(())
//!     }
//!
//!     fn leave(&mut self, _field: &Field) -> Result<()> {
//!         self.depth -= 1;
//!         Ok(())
//!     }
//! }
//! ```

mod chain;
mod record;

pub use chain::ChainVisitor;
pub use record::{RecordingVisitor, VisitEvent};

use crate::error::{Error, Result};
use crate::schema::{Field, MessageId, MessageType, Schema};
use crate::wire::WireType;

/// One scalar value together with its logical kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
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
    String(&'a str),
    /// `bytes`
    Bytes(&'a [u8]),
}

impl<'a> Scalar<'a> {
    /// The wire type this value is framed with
    pub fn wire_type(&self) -> WireType {
        match self {
            Scalar::Int32(_)
            | Scalar::UInt32(_)
            | Scalar::SInt32(_)
            | Scalar::Int64(_)
            | Scalar::UInt64(_)
            | Scalar::SInt64(_)
            | Scalar::Bool(_)
            | Scalar::Enum(_) => WireType::Varint,
            Scalar::Fixed32(_) | Scalar::SFixed32(_) | Scalar::Float(_) => WireType::I32,
            Scalar::Fixed64(_) | Scalar::SFixed64(_) | Scalar::Double(_) => WireType::I64,
            Scalar::String(_) | Scalar::Bytes(_) => WireType::Len,
        }
    }

    /// Name of the logical kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Int32(_) => "int32",
            Scalar::UInt32(_) => "uint32",
            Scalar::SInt32(_) => "sint32",
            Scalar::Int64(_) => "int64",
            Scalar::UInt64(_) => "uint64",
            Scalar::SInt64(_) => "sint64",
            Scalar::Fixed32(_) => "fixed32",
            Scalar::SFixed32(_) => "sfixed32",
            Scalar::Fixed64(_) => "fixed64",
            Scalar::SFixed64(_) => "sfixed64",
            Scalar::Float(_) => "float",
            Scalar::Double(_) => "double",
            Scalar::Bool(_) => "bool",
            Scalar::Enum(_) => "enum",
            Scalar::String(_) => "string",
            Scalar::Bytes(_) => "bytes",
        }
    }

    /// Delivers this value to the matching per-kind method of `visitor`
    pub fn visit<V: ProtoVisitor + ?Sized>(self, field: &Field, visitor: &mut V) -> Result<()> {
        match self {
            Scalar::Int32(v) => visitor.visit_int32(field, v),
            Scalar::UInt32(v) => visitor.visit_uint32(field, v),
            Scalar::SInt32(v) => visitor.visit_sint32(field, v),
            Scalar::Int64(v) => visitor.visit_int64(field, v),
            Scalar::UInt64(v) => visitor.visit_uint64(field, v),
            Scalar::SInt64(v) => visitor.visit_sint64(field, v),
            Scalar::Fixed32(v) => visitor.visit_fixed32(field, v),
            Scalar::SFixed32(v) => visitor.visit_sfixed32(field, v),
            Scalar::Fixed64(v) => visitor.visit_fixed64(field, v),
            Scalar::SFixed64(v) => visitor.visit_sfixed64(field, v),
            Scalar::Float(v) => visitor.visit_float(field, v),
            Scalar::Double(v) => visitor.visit_double(field, v),
            Scalar::Bool(v) => visitor.visit_bool(field, v),
            Scalar::Enum(v) => visitor.visit_enum(field, v),
            Scalar::String(v) => visitor.visit_string(field, v),
            Scalar::Bytes(v) => visitor.visit_bytes(field, v),
        }
    }
}

macro_rules! repeated_visit {
    ($($(#[$doc:meta])* $name:ident($ty:ty) => $variant:ident;)*) => {
        $(
            $(#[$doc])*
            fn $name<I>(&mut self, field: &Field, values: I) -> Result<()>
            where
                I: IntoIterator<Item = $ty>,
                Self: Sized,
            {
                visit_repeated(self, field, values.into_iter().map(Scalar::$variant))
            }
        )*
    };
}

/// A sink for one streaming traversal of a message.
///
/// Calls arrive in field order as read or emitted. Embedded messages and
/// map entries are bracketed by [`enter`](ProtoVisitor::enter) and
/// [`leave`](ProtoVisitor::leave) with the same field, properly nested.
/// Packed runs contain only scalar calls for the bracketing field.
pub trait ProtoVisitor {
    /// Begins a traversal of a message of type `message`
    fn init(&mut self, message: &MessageType) -> Result<()> {
        let _ = message;
        Ok(())
    }

    /// Ends the traversal started by [`ProtoVisitor::init`]
    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fallback for every scalar kind not overridden individually
    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        Err(Error::unsupported(format!(
            "visitor does not accept {} values (field {})",
            value.kind_name(),
            field.number()
        )))
    }

    /// Visits an `int32` value
    fn visit_int32(&mut self, field: &Field, value: i32) -> Result<()> {
        self.visit_scalar(field, Scalar::Int32(value))
    }

    /// Visits a `uint32` value
    fn visit_uint32(&mut self, field: &Field, value: u32) -> Result<()> {
        self.visit_scalar(field, Scalar::UInt32(value))
    }

    /// Visits a `sint32` value
    fn visit_sint32(&mut self, field: &Field, value: i32) -> Result<()> {
        self.visit_scalar(field, Scalar::SInt32(value))
    }

    /// Visits an `int64` value; unknown varint fields arrive here too
    fn visit_int64(&mut self, field: &Field, value: i64) -> Result<()> {
        self.visit_scalar(field, Scalar::Int64(value))
    }

    /// Visits a `uint64` value
    fn visit_uint64(&mut self, field: &Field, value: u64) -> Result<()> {
        self.visit_scalar(field, Scalar::UInt64(value))
    }

    /// Visits a `sint64` value
    fn visit_sint64(&mut self, field: &Field, value: i64) -> Result<()> {
        self.visit_scalar(field, Scalar::SInt64(value))
    }

    /// Visits a `fixed32` value; unknown I32 fields arrive here too
    fn visit_fixed32(&mut self, field: &Field, value: u32) -> Result<()> {
        self.visit_scalar(field, Scalar::Fixed32(value))
    }

    /// Visits an `sfixed32` value
    fn visit_sfixed32(&mut self, field: &Field, value: i32) -> Result<()> {
        self.visit_scalar(field, Scalar::SFixed32(value))
    }

    /// Visits a `fixed64` value; unknown I64 fields arrive here too
    fn visit_fixed64(&mut self, field: &Field, value: u64) -> Result<()> {
        self.visit_scalar(field, Scalar::Fixed64(value))
    }

    /// Visits an `sfixed64` value
    fn visit_sfixed64(&mut self, field: &Field, value: i64) -> Result<()> {
        self.visit_scalar(field, Scalar::SFixed64(value))
    }

    /// Visits a `float` value
    fn visit_float(&mut self, field: &Field, value: f32) -> Result<()> {
        self.visit_scalar(field, Scalar::Float(value))
    }

    /// Visits a `double` value
    fn visit_double(&mut self, field: &Field, value: f64) -> Result<()> {
        self.visit_scalar(field, Scalar::Double(value))
    }

    /// Visits a `bool` value
    fn visit_bool(&mut self, field: &Field, value: bool) -> Result<()> {
        self.visit_scalar(field, Scalar::Bool(value))
    }

    /// Visits an enum number, known to the enum type or not
    fn visit_enum(&mut self, field: &Field, value: i32) -> Result<()> {
        self.visit_scalar(field, Scalar::Enum(value))
    }

    /// Visits a `string` value
    fn visit_string(&mut self, field: &Field, value: &str) -> Result<()> {
        self.visit_scalar(field, Scalar::String(value))
    }

    /// Visits a `bytes` value; unknown LEN fields arrive here too
    fn visit_bytes(&mut self, field: &Field, value: &[u8]) -> Result<()> {
        self.visit_scalar(field, Scalar::Bytes(value))
    }

    /// Opens an embedded message or map entry
    fn enter(&mut self, field: &Field) -> Result<()>;

    /// Closes the embedded message or map entry opened for `field`
    fn leave(&mut self, field: &Field) -> Result<()>;

    /// Opens a packed run of `field`
    fn enter_packed(&mut self, field: &Field) -> Result<()> {
        let _ = field;
        Ok(())
    }

    /// Closes the packed run of `field`
    fn leave_packed(&mut self, field: &Field) -> Result<()> {
        let _ = field;
        Ok(())
    }

    /// Visits the values of a repeated scalar field.
    ///
    /// Packed fields are bracketed by `enter_packed`/`leave_packed`; an
    /// empty sequence produces no calls at all.
    fn visit_repeated<'v, I>(&mut self, field: &Field, values: I) -> Result<()>
    where
        I: IntoIterator<Item = Scalar<'v>>,
        Self: Sized,
    {
        visit_repeated(self, field, values)
    }

    repeated_visit! {
        /// Visits repeated `int32` values
        visit_int32_iter(i32) => Int32;
        /// Visits repeated `uint32` values
        visit_uint32_iter(u32) => UInt32;
        /// Visits repeated `sint32` values
        visit_sint32_iter(i32) => SInt32;
        /// Visits repeated `int64` values
        visit_int64_iter(i64) => Int64;
        /// Visits repeated `uint64` values
        visit_uint64_iter(u64) => UInt64;
        /// Visits repeated `sint64` values
        visit_sint64_iter(i64) => SInt64;
        /// Visits repeated `fixed32` values
        visit_fixed32_iter(u32) => Fixed32;
        /// Visits repeated `sfixed32` values
        visit_sfixed32_iter(i32) => SFixed32;
        /// Visits repeated `fixed64` values
        visit_fixed64_iter(u64) => Fixed64;
        /// Visits repeated `sfixed64` values
        visit_sfixed64_iter(i64) => SFixed64;
        /// Visits repeated `float` values
        visit_float_iter(f32) => Float;
        /// Visits repeated `double` values
        visit_double_iter(f64) => Double;
        /// Visits repeated `bool` values
        visit_bool_iter(bool) => Bool;
        /// Visits repeated enum numbers
        visit_enum_iter(i32) => Enum;
    }

    /// Visits repeated `string` values
    fn visit_string_iter<'v, I>(&mut self, field: &Field, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'v str>,
        Self: Sized,
    {
        visit_repeated(self, field, values.into_iter().map(Scalar::String))
    }

    /// Visits repeated `bytes` values
    fn visit_bytes_iter<'v, I>(&mut self, field: &Field, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'v [u8]>,
        Self: Sized,
    {
        visit_repeated(self, field, values.into_iter().map(Scalar::Bytes))
    }

    /// Brackets one embedded message, visiting its content with `body`
    fn visit_embedded<F>(&mut self, field: &Field, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
        Self: Sized,
    {
        visit_embedded(self, field, body)
    }

    /// Brackets each of several embedded messages
    fn visit_embedded_iter<T, I, F>(&mut self, field: &Field, items: I, body: F) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut Self, T) -> Result<()>,
        Self: Sized,
    {
        visit_embedded_iter(self, field, items, body)
    }

    /// Brackets each map entry, visiting key and value with `body`
    fn visit_map<K, W, I, F>(&mut self, field: &Field, entries: I, body: F) -> Result<()>
    where
        I: IntoIterator<Item = (K, W)>,
        F: FnMut(&mut Self, K, W) -> Result<()>,
        Self: Sized,
    {
        visit_map(self, field, entries, body)
    }
}

impl<V: ProtoVisitor + ?Sized> ProtoVisitor for &mut V {
    fn init(&mut self, message: &MessageType) -> Result<()> {
        (**self).init(message)
    }

    fn destroy(&mut self) -> Result<()> {
        (**self).destroy()
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        value.visit(field, &mut **self)
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        (**self).enter(field)
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        (**self).leave(field)
    }

    fn enter_packed(&mut self, field: &Field) -> Result<()> {
        (**self).enter_packed(field)
    }

    fn leave_packed(&mut self, field: &Field) -> Result<()> {
        (**self).leave_packed(field)
    }
}

/// Visits repeated scalar values, honouring the field's packed flag
pub fn visit_repeated<'v, V, I>(visitor: &mut V, field: &Field, values: I) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
    I: IntoIterator<Item = Scalar<'v>>,
{
    let mut values = values.into_iter().peekable();
    if values.peek().is_none() {
        return Ok(());
    }
    let packed = field.is_packed();
    if packed {
        visitor.enter_packed(field)?;
    }
    for value in values {
        value.visit(field, visitor)?;
    }
    if packed {
        visitor.leave_packed(field)?;
    }
    Ok(())
}

/// Brackets one embedded message around `body`
pub fn visit_embedded<V, F>(visitor: &mut V, field: &Field, body: F) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
    F: FnOnce(&mut V) -> Result<()>,
{
    visitor.enter(field)?;
    body(visitor)?;
    visitor.leave(field)
}

/// Brackets each embedded message of a repeated field around `body`
pub fn visit_embedded_iter<V, T, I, F>(visitor: &mut V, field: &Field, items: I, mut body: F) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
    I: IntoIterator<Item = T>,
    F: FnMut(&mut V, T) -> Result<()>,
{
    for item in items {
        visitor.enter(field)?;
        body(visitor, item)?;
        visitor.leave(field)?;
    }
    Ok(())
}

/// Brackets each map entry around `body`, which visits key and value
pub fn visit_map<V, K, W, I, F>(visitor: &mut V, field: &Field, entries: I, mut body: F) -> Result<()>
where
    V: ProtoVisitor + ?Sized,
    I: IntoIterator<Item = (K, W)>,
    F: FnMut(&mut V, K, W) -> Result<()>,
{
    for (key, value) in entries {
        visitor.enter(field)?;
        body(visitor, key, value)?;
        visitor.leave(field)?;
    }
    Ok(())
}

/// A message that can replay itself as visitor calls.
///
/// `emit` produces the field calls only; [`visit_message`] adds the
/// `init`/`destroy` bracket. Generated message types implement this, as
/// does [`DynamicMessage`](crate::value::DynamicMessage).
pub trait Emit {
    /// The message type being emitted
    fn message_type(&self) -> MessageId;

    /// Emits every field of the message to `visitor`
    fn emit<V: ProtoVisitor + ?Sized>(&self, schema: &Schema, visitor: &mut V) -> Result<()>;
}

/// Runs one full traversal of `message` through `visitor`
pub fn visit_message<E, V>(schema: &Schema, message: &E, visitor: &mut V) -> Result<()>
where
    E: Emit + ?Sized,
    V: ProtoVisitor + ?Sized,
{
    visitor.init(schema.message(message.message_type()))?;
    message.emit(schema, visitor)?;
    visitor.destroy()
}
