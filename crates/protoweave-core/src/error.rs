//! Error types for the protoweave-core library.
//!
//! Every failure raised by the codec is an [`Error`]. Failures are never
//! recovered from internally: a read or write either completes or aborts with
//! the first error it encounters. Use [`Error::kind`] to tell malformed input
//! apart from unencodable values and schema/visitor programming errors.

use thiserror::Error;

/// Result type alias for protoweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or invalid input (binary or JSON)
    Decode,
    /// A value that cannot be represented in the target format
    Encode,
    /// Invalid schema construction or descriptor import
    Schema,
    /// A visitor or schema mismatch that indicates a programming error
    Unsupported,
    /// Underlying I/O failure
    Io,
}

/// Comprehensive error type for all protoweave operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Input ended in the middle of a value
    #[error("truncated input at offset {offset}: needed {needed} more byte(s)")]
    Truncated {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes missing
        needed: usize,
    },

    /// Varint whose continuation bit never clears within 10 bytes
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// Wire type other than VARINT, I64, LEN or I32
    #[error("invalid wire type {value} at offset {offset}")]
    InvalidWireType {
        /// The raw wire type bits
        value: u8,
        /// Byte offset of the tag
        offset: usize,
    },

    /// Field number outside `1..=2^29-1`
    #[error("invalid field number {number} at offset {offset}")]
    InvalidFieldNumber {
        /// The offending field number
        number: u64,
        /// Byte offset of the tag
        offset: usize,
    },

    /// Length prefix that runs past the enclosing window
    #[error("length {length} at offset {offset} exceeds the {available} byte(s) available")]
    LengthOverrun {
        /// Declared length
        length: u64,
        /// Bytes left in the enclosing window
        available: usize,
        /// Byte offset of the payload
        offset: usize,
    },

    /// String field that is not valid UTF-8
    #[error("invalid UTF-8 in string field at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the string payload
        offset: usize,
    },

    /// Nesting deeper than the configured limit
    #[error("message nesting exceeds the recursion limit of {limit}")]
    RecursionLimit {
        /// The configured limit
        limit: usize,
    },

    /// Syntactically invalid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed JSON that does not match the expected shape
    #[error("invalid JSON value for {context}: {details}")]
    InvalidJson {
        /// Message or field being read
        context: String,
        /// What was wrong
        details: String,
    },

    /// JSON object key that names no field (strict mode)
    #[error("unknown field '{name}' in message '{message}'")]
    UnknownField {
        /// Full message name
        message: String,
        /// The JSON key
        name: String,
    },

    /// The same field appears more than once in a JSON object
    #[error("duplicate field '{name}' in message '{message}'")]
    DuplicateField {
        /// Full message name
        message: String,
        /// The JSON key of the repeated occurrence
        name: String,
    },

    /// Enum name that the enum type does not declare
    #[error("unknown value '{value}' for enum '{enum_name}'")]
    UnknownEnumValue {
        /// Full enum name
        enum_name: String,
        /// The rejected name
        value: String,
    },

    /// Numeric value outside the range of its target type
    #[error("value {value} is out of range for {target}")]
    OutOfRange {
        /// Target type name
        target: &'static str,
        /// Textual form of the rejected value
        value: String,
    },

    /// Invalid Base64 in a bytes field
    #[error("invalid base64 in bytes field: {details}")]
    InvalidBase64 {
        /// Decoder message
        details: String,
    },

    /// Well-known type value that cannot be decoded
    #[error("invalid {type_name} value: {details}")]
    WellKnownDecode {
        /// Full name of the well-known type
        type_name: &'static str,
        /// What was wrong
        details: String,
    },

    /// Well-known type value that cannot be encoded
    #[error("cannot encode {type_name}: {details}")]
    WellKnownEncode {
        /// Full name of the well-known type
        type_name: &'static str,
        /// What was wrong
        details: String,
    },

    /// Encoder capacity mis-computed by the size pass
    #[error("encode buffer overflow: capacity {capacity}, required {required}")]
    BufferOverflow {
        /// Pre-computed capacity
        capacity: usize,
        /// Bytes required by the write
        required: usize,
    },

    /// Invalid schema construction
    #[error("invalid schema: {0}")]
    Schema(String),

    /// Failed to parse a FileDescriptorSet
    #[error("failed to parse FileDescriptorSet: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build a descriptor pool with prost-reflect
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// A field that recurs after other fields, which a streaming sink cannot
    /// merge in place
    #[error("field {field} of '{message}' is split across the stream")]
    NonCanonicalOrder {
        /// Full message name
        message: String,
        /// The recurring field number
        field: u32,
    },

    /// Visitor or schema mismatch
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new truncated-input error
    pub fn truncated(offset: usize, needed: usize) -> Self {
        Self::Truncated { offset, needed }
    }

    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new invalid wire type error
    pub fn invalid_wire_type(value: u8, offset: usize) -> Self {
        Self::InvalidWireType { value, offset }
    }

    /// Creates a new invalid field number error
    pub fn invalid_field_number(number: u64, offset: usize) -> Self {
        Self::InvalidFieldNumber { number, offset }
    }

    /// Creates a new length overrun error
    pub fn length_overrun(length: u64, available: usize, offset: usize) -> Self {
        Self::LengthOverrun {
            length,
            available,
            offset,
        }
    }

    /// Creates a new JSON shape error
    pub fn invalid_json(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidJson {
            context: context.into(),
            details: details.into(),
        }
    }

    /// Creates a new unknown field error
    pub fn unknown_field(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownField {
            message: message.into(),
            name: name.into(),
        }
    }

    /// Creates a new duplicate field error
    pub fn duplicate_field(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateField {
            message: message.into(),
            name: name.into(),
        }
    }

    /// Creates a new unknown enum value error
    pub fn unknown_enum_value(enum_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnknownEnumValue {
            enum_name: enum_name.into(),
            value: value.into(),
        }
    }

    /// Creates a new out-of-range error
    pub fn out_of_range(target: &'static str, value: impl ToString) -> Self {
        Self::OutOfRange {
            target,
            value: value.to_string(),
        }
    }

    /// Creates a new well-known type decode error
    pub fn well_known_decode(type_name: &'static str, details: impl Into<String>) -> Self {
        Self::WellKnownDecode {
            type_name,
            details: details.into(),
        }
    }

    /// Creates a new well-known type encode error
    pub fn well_known_encode(type_name: &'static str, details: impl Into<String>) -> Self {
        Self::WellKnownEncode {
            type_name,
            details: details.into(),
        }
    }

    /// Creates a new non-canonical order error
    pub fn non_canonical_order(message: impl Into<String>, field: u32) -> Self {
        Self::NonCanonicalOrder {
            message: message.into(),
            field,
        }
    }

    /// Creates a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classifies this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Truncated { .. }
            | Self::MalformedVarint { .. }
            | Self::InvalidWireType { .. }
            | Self::InvalidFieldNumber { .. }
            | Self::LengthOverrun { .. }
            | Self::InvalidUtf8 { .. }
            | Self::RecursionLimit { .. }
            | Self::Json(_)
            | Self::InvalidJson { .. }
            | Self::UnknownField { .. }
            | Self::DuplicateField { .. }
            | Self::UnknownEnumValue { .. }
            | Self::OutOfRange { .. }
            | Self::InvalidBase64 { .. }
            | Self::WellKnownDecode { .. } => ErrorKind::Decode,
            Self::WellKnownEncode { .. } | Self::BufferOverflow { .. } => ErrorKind::Encode,
            Self::Schema(_) | Self::DescriptorParse(_) | Self::DescriptorBuild(_) => {
                ErrorKind::Schema
            }
            Self::NonCanonicalOrder { .. } | Self::Unsupported(_) | Self::Internal(_) => {
                ErrorKind::Unsupported
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if the input being read was malformed
    pub fn is_decode(&self) -> bool {
        self.kind() == ErrorKind::Decode
    }

    /// Returns true if a value could not be encoded
    pub fn is_encode(&self) -> bool {
        self.kind() == ErrorKind::Encode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_field("pkg.Message", "bogus");
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("pkg.Message"));

        let err = Error::length_overrun(300, 12, 4);
        assert_eq!(
            err.to_string(),
            "length 300 at offset 4 exceeds the 12 byte(s) available"
        );
    }

    #[test]
    fn test_error_kind() {
        assert!(Error::malformed_varint(0).is_decode());
        assert!(Error::out_of_range("int32", 1u64 << 40).is_decode());
        assert!(Error::well_known_encode("google.protobuf.Duration", "x").is_encode());
        assert!(!Error::well_known_decode("google.protobuf.Duration", "x").is_encode());
        assert_eq!(Error::schema("dup").kind(), ErrorKind::Schema);
        assert_eq!(Error::internal("bug").kind(), ErrorKind::Unsupported);
        assert_eq!(
            Error::non_canonical_order("pkg.Message", 3).kind(),
            ErrorKind::Unsupported
        );
    }
}
