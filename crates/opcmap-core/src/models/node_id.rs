//! Node identifiers

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Kind of identifier carried by a [`NodeId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum IdType {
    /// Numeric identifier (0)
    Numeric,
    /// String identifier (1)
    String,
    /// GUID identifier (2)
    Guid,
    /// Opaque (byte string) identifier (3)
    Opaque,
}

impl IdType {
    /// Wire code of this id type
    pub fn code(self) -> u8 {
        match self {
            IdType::Numeric => 0,
            IdType::String => 1,
            IdType::Guid => 2,
            IdType::Opaque => 3,
        }
    }
}

impl TryFrom<u8> for IdType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(IdType::Numeric),
            1 => Ok(IdType::String),
            2 => Ok(IdType::Guid),
            3 => Ok(IdType::Opaque),
            other => Err(CoreError::InvalidNodeId(format!(
                "IdType {} is not one of 0..=3",
                other
            ))),
        }
    }
}

impl From<IdType> for u8 {
    fn from(id_type: IdType) -> Self {
        id_type.code()
    }
}

/// Identifier of a node in the server address space.
///
/// The `(Id, Namespace, IdType)` triple is the stable key for any
/// server-side node. Serialized with the gateway's PascalCase field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeId {
    /// Identifier, always carried as text (numeric ids are stringified)
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Namespace index
    pub namespace: u32,
    /// Identifier kind
    pub id_type: IdType,
}

impl NodeId {
    pub fn new(id: impl Into<String>, namespace: u32, id_type: IdType) -> Self {
        Self {
            id: id.into(),
            namespace,
            id_type,
        }
    }

    /// Shorthand for a string identifier
    pub fn string(id: impl Into<String>, namespace: u32) -> Self {
        Self::new(id, namespace, IdType::String)
    }

    /// Shorthand for a numeric identifier
    pub fn numeric(id: u64, namespace: u32) -> Self {
        Self::new(id.to_string(), namespace, IdType::Numeric)
    }

    /// Build a node id from a loosely-typed mapping such as
    /// `{"Id": "SOMEID", "Namespace": 1, "IdType": 2}`.
    ///
    /// `Id` may be a string or a number; `Namespace` must be an unsigned
    /// integer and `IdType` one of the four id-type codes.
    pub fn from_mapping(map: &Map<String, Value>) -> Result<Self, CoreError> {
        let id = match map.get("Id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(CoreError::InvalidNodeId(format!(
                    "Id must be a string or number, got {}",
                    other
                )))
            }
            None => return Err(CoreError::InvalidNodeId("missing Id".to_string())),
        };

        let namespace = map
            .get("Namespace")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                CoreError::InvalidNodeId("Namespace must be an unsigned integer".to_string())
            })?;

        let id_type = map
            .get("IdType")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| CoreError::InvalidNodeId("IdType must be an integer".to_string()))
            .and_then(IdType::try_from)?;

        Ok(Self {
            id,
            namespace,
            id_type,
        })
    }

    /// Build a node id from any JSON value; only objects are accepted
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Self::from_mapping(map),
            other => Err(CoreError::InvalidNodeId(format!(
                "unsupported variable list element: {}",
                other
            ))),
        }
    }
}

impl TryFrom<&Value> for NodeId {
    type Error = CoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.id_type {
            IdType::Numeric => "i",
            IdType::String => "s",
            IdType::Guid => "g",
            IdType::Opaque => "b",
        };
        write!(f, "ns={};{}={}", self.namespace, prefix, self.id)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "node Id must be a string or number, got {}",
            other
        ))),
    }
}
