//! Built-in variant types and typed values

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// OPC UA built-in type of a variant body.
///
/// The discriminants are the wire codes used in the `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VariantType {
    Null = 0,
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    XmlElement = 16,
    NodeId = 17,
    ExpandedNodeId = 18,
    StatusCode = 19,
    QualifiedName = 20,
    LocalizedText = 21,
    ExtensionObject = 22,
    DataValue = 23,
    Variant = 24,
    DiagnosticInfo = 25,
}

/// One row of the type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    pub variant_type: VariantType,
    pub name: &'static str,
    pub description: &'static str,
}

const fn entry(variant_type: VariantType, name: &'static str, description: &'static str) -> TypeEntry {
    TypeEntry {
        variant_type,
        name,
        description,
    }
}

/// The closed type table, indexed by wire code.
pub const TYPE_TABLE: [TypeEntry; 26] = [
    entry(VariantType::Null, "Null", "An empty value"),
    entry(VariantType::Boolean, "Boolean", "A two-state logical value (true or false)"),
    entry(VariantType::SByte, "SByte", "An integer value between -128 and 127 inclusive"),
    entry(VariantType::Byte, "Byte", "An integer value between 0 and 255 inclusive"),
    entry(VariantType::Int16, "Int16", "An integer value between -32768 and 32767 inclusive"),
    entry(VariantType::UInt16, "UInt16", "An integer value between 0 and 65535 inclusive"),
    entry(
        VariantType::Int32,
        "Int32",
        "An integer value between -2147483648 and 2147483647 inclusive",
    ),
    entry(
        VariantType::UInt32,
        "UInt32",
        "An integer value between 0 and 4294967295 inclusive",
    ),
    entry(
        VariantType::Int64,
        "Int64",
        "An integer value between -9223372036854775808 and 9223372036854775807 inclusive",
    ),
    entry(
        VariantType::UInt64,
        "UInt64",
        "An integer value between 0 and 18446744073709551615 inclusive",
    ),
    entry(VariantType::Float, "Float", "An IEEE single precision (32 bit) floating point value"),
    entry(VariantType::Double, "Double", "An IEEE double precision (64 bit) floating point value"),
    entry(VariantType::String, "String", "A sequence of Unicode characters"),
    entry(VariantType::DateTime, "DateTime", "An instance in time"),
    entry(VariantType::Guid, "Guid", "A 16-byte value that can be used as a globally unique identifier"),
    entry(VariantType::ByteString, "ByteString", "A sequence of octets"),
    entry(VariantType::XmlElement, "XmlElement", "An XML element"),
    entry(VariantType::NodeId, "NodeId", "An identifier for a node in the address space of a server"),
    entry(
        VariantType::ExpandedNodeId,
        "ExpandedNodeId",
        "A NodeId that allows the namespace URI to be specified instead of an index",
    ),
    entry(
        VariantType::StatusCode,
        "StatusCode",
        "A numeric identifier for an error or condition associated with a value or an operation",
    ),
    entry(VariantType::QualifiedName, "QualifiedName", "A name qualified by a namespace"),
    entry(
        VariantType::LocalizedText,
        "LocalizedText",
        "Human readable text with an optional locale identifier",
    ),
    entry(
        VariantType::ExtensionObject,
        "ExtensionObject",
        "A structure that contains an application specific data type",
    ),
    entry(
        VariantType::DataValue,
        "DataValue",
        "A data value with an associated status code and timestamps",
    ),
    entry(VariantType::Variant, "Variant", "A union of all of the types specified above"),
    entry(
        VariantType::DiagnosticInfo,
        "DiagnosticInfo",
        "A structure that contains detailed error and diagnostic information associated with a status code",
    ),
];

impl VariantType {
    /// Look up a type by wire code
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| TYPE_TABLE.get(idx))
            .map(|e| e.variant_type)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        TYPE_TABLE[self as usize].name
    }

    pub fn description(self) -> &'static str {
        TYPE_TABLE[self as usize].description
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a type table lookup.
///
/// Unknown codes produce the all-`None` triple rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TypeInfo {
    pub id: Option<u8>,
    #[serde(rename = "type")]
    pub type_name: Option<&'static str>,
    pub description: Option<&'static str>,
}

/// Map a wire type code to its `(id, type, description)` triple
pub fn type_info(code: i64) -> TypeInfo {
    match VariantType::from_code(code) {
        Some(t) => TypeInfo {
            id: Some(t.code()),
            type_name: Some(t.name()),
            description: Some(t.description()),
        },
        None => TypeInfo::default(),
    }
}

/// Body of a variant, one arm per primitive JSON shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantBody {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    /// Structured bodies (LocalizedText, ExtensionObject, arrays, ...)
    Structured(Value),
}

impl VariantBody {
    pub fn is_null(&self) -> bool {
        matches!(self, VariantBody::Null)
    }

    fn fits_signed(&self, min: i64, max: i64) -> bool {
        match self {
            VariantBody::Integer(v) => (min..=max).contains(v),
            VariantBody::Unsigned(v) => i64::try_from(*v).is_ok_and(|v| v <= max),
            _ => false,
        }
    }

    fn fits_unsigned(&self, max: u64) -> bool {
        match self {
            VariantBody::Integer(v) => u64::try_from(*v).is_ok_and(|v| v <= max),
            VariantBody::Unsigned(v) => *v <= max,
            _ => false,
        }
    }
}

impl From<bool> for VariantBody {
    fn from(v: bool) -> Self {
        VariantBody::Boolean(v)
    }
}

impl From<i64> for VariantBody {
    fn from(v: i64) -> Self {
        VariantBody::Integer(v)
    }
}

impl From<f64> for VariantBody {
    fn from(v: f64) -> Self {
        VariantBody::Float(v)
    }
}

impl From<&str> for VariantBody {
    fn from(v: &str) -> Self {
        VariantBody::String(v.to_string())
    }
}

impl From<String> for VariantBody {
    fn from(v: String) -> Self {
        VariantBody::String(v)
    }
}

/// A typed value as sent to the gateway: `{"Type": <code>, "Body": <body>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(rename = "Type")]
    pub type_code: u8,
    #[serde(rename = "Body", default)]
    pub body: VariantBody,
}

impl Variant {
    pub fn new(variant_type: VariantType, body: impl Into<VariantBody>) -> Self {
        Self {
            type_code: variant_type.code(),
            body: body.into(),
        }
    }

    pub fn double(value: f64) -> Self {
        Self::new(VariantType::Double, value)
    }

    pub fn variant_type(&self) -> Option<VariantType> {
        VariantType::from_code(i64::from(self.type_code))
    }

    /// Check that the body matches the declared type code.
    ///
    /// A null body is accepted for every type; status-only values carry it.
    pub fn validate(&self) -> Result<(), CoreError> {
        let variant_type = self
            .variant_type()
            .ok_or(CoreError::UnknownTypeCode(i64::from(self.type_code)))?;

        if self.body.is_null() {
            return Ok(());
        }

        let body = &self.body;
        let ok = match variant_type {
            VariantType::Null => false,
            VariantType::Boolean => matches!(body, VariantBody::Boolean(_)),
            VariantType::SByte => body.fits_signed(i8::MIN.into(), i8::MAX.into()),
            VariantType::Int16 => body.fits_signed(i16::MIN.into(), i16::MAX.into()),
            VariantType::Int32 => body.fits_signed(i32::MIN.into(), i32::MAX.into()),
            VariantType::Int64 => body.fits_signed(i64::MIN, i64::MAX),
            VariantType::Byte => body.fits_unsigned(u8::MAX.into()),
            VariantType::UInt16 => body.fits_unsigned(u16::MAX.into()),
            VariantType::UInt32 => body.fits_unsigned(u32::MAX.into()),
            VariantType::UInt64 => body.fits_unsigned(u64::MAX),
            VariantType::Float | VariantType::Double => matches!(
                body,
                VariantBody::Float(_) | VariantBody::Integer(_) | VariantBody::Unsigned(_)
            ),
            VariantType::String
            | VariantType::DateTime
            | VariantType::Guid
            | VariantType::ByteString
            | VariantType::XmlElement => matches!(body, VariantBody::String(_)),
            _ => true,
        };

        if ok {
            Ok(())
        } else {
            Err(CoreError::BodyTypeMismatch {
                type_name: variant_type.name(),
                body: serde_json::to_string(body).unwrap_or_default(),
            })
        }
    }
}

/// Status code attached to a value or returned for an operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl StatusCode {
    pub fn new(code: i64, symbol: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            symbol: Some(symbol.into()),
        }
    }

    /// The `Good` status (code 0)
    pub fn good() -> Self {
        Self::new(0, "Good")
    }

    /// Code only, as sent in write bodies
    pub fn from_code(code: i64) -> Self {
        Self {
            code: Some(code),
            symbol: None,
        }
    }

    pub fn is_good(&self) -> bool {
        self.code == Some(0)
    }
}
