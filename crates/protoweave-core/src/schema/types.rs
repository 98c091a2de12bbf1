//! Field type identifiers.

use crate::wire::WireType;
use std::fmt;

/// Index of a [`MessageType`](super::MessageType) inside its [`Schema`](super::Schema)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub(crate) u32);

impl MessageId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an [`EnumType`](super::EnumType) inside its [`Schema`](super::Schema)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub(crate) u32);

impl EnumId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scalar field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `int32`: varint, sign-extended to 64 bits when negative
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `sint32`: zigzag varint
    SInt32,
    /// `sint64`: zigzag varint
    SInt64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
}

impl ScalarKind {
    /// All scalar kinds, in descriptor order
    pub const ALL: [ScalarKind; 15] = [
        ScalarKind::Double,
        ScalarKind::Float,
        ScalarKind::Int64,
        ScalarKind::UInt64,
        ScalarKind::Int32,
        ScalarKind::Fixed64,
        ScalarKind::Fixed32,
        ScalarKind::Bool,
        ScalarKind::String,
        ScalarKind::Bytes,
        ScalarKind::UInt32,
        ScalarKind::SFixed32,
        ScalarKind::SFixed64,
        ScalarKind::SInt32,
        ScalarKind::SInt64,
    ];

    /// The wire type values of this kind are framed with
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarKind::Int32
            | ScalarKind::Int64
            | ScalarKind::UInt32
            | ScalarKind::UInt64
            | ScalarKind::SInt32
            | ScalarKind::SInt64
            | ScalarKind::Bool => WireType::Varint,
            ScalarKind::Fixed32 | ScalarKind::SFixed32 | ScalarKind::Float => WireType::I32,
            ScalarKind::Fixed64 | ScalarKind::SFixed64 | ScalarKind::Double => WireType::I64,
            ScalarKind::String | ScalarKind::Bytes => WireType::Len,
        }
    }

    /// Returns true if repeated values of this kind may be packed
    pub const fn is_packable(self) -> bool {
        !matches!(self, ScalarKind::String | ScalarKind::Bytes)
    }

    /// Returns true for the 64-bit integral kinds, which JSON writes as strings
    pub const fn is_64bit_integral(self) -> bool {
        matches!(
            self,
            ScalarKind::Int64
                | ScalarKind::UInt64
                | ScalarKind::SInt64
                | ScalarKind::Fixed64
                | ScalarKind::SFixed64
        )
    }

    /// Returns true if this kind is allowed as a map key
    pub const fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            ScalarKind::Float | ScalarKind::Double | ScalarKind::Bytes
        )
    }

    /// Returns the `.proto` keyword for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::UInt64 => "uint64",
            ScalarKind::SInt32 => "sint32",
            ScalarKind::SInt64 => "sint64",
            ScalarKind::Fixed32 => "fixed32",
            ScalarKind::Fixed64 => "fixed64",
            ScalarKind::SFixed32 => "sfixed32",
            ScalarKind::SFixed64 => "sfixed64",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Bool => "bool",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A scalar value
    Scalar(ScalarKind),
    /// An enum value, carried as a varint
    Enum(EnumId),
    /// An embedded message
    Message(MessageId),
    /// A field absent from the schema; only its wire type is known
    Unknown(WireType),
}

impl FieldType {
    /// The wire type values of this type are framed with.
    ///
    /// The mapping is total: every type has exactly one wire type.
    pub const fn wire_type(self) -> WireType {
        match self {
            FieldType::Scalar(kind) => kind.wire_type(),
            FieldType::Enum(_) => WireType::Varint,
            FieldType::Message(_) => WireType::Len,
            FieldType::Unknown(wire_type) => wire_type,
        }
    }

    /// Returns true if repeated values of this type may be packed
    pub const fn is_packable(self) -> bool {
        match self {
            FieldType::Scalar(kind) => kind.is_packable(),
            FieldType::Enum(_) => true,
            FieldType::Message(_) | FieldType::Unknown(_) => false,
        }
    }
}
