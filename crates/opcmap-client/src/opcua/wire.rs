//! Lenient decoding of gateway response envelopes
//!
//! Every field is optional: absent or malformed parts become `None` and
//! surface as null columns instead of failing the read.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use opcmap_core::type_info;

use crate::error::{ClientError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireVariant {
    #[serde(rename = "Type")]
    pub type_code: Option<i64>,
    pub body: Option<Value>,
}

impl WireVariant {
    pub fn type_name(&self) -> Option<String> {
        self.type_code
            .and_then(|code| type_info(code).type_name)
            .map(String::from)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireStatus {
    pub code: Option<i64>,
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireLiveValue {
    pub server_timestamp: Option<String>,
    pub value: Option<WireVariant>,
    pub status_code: Option<WireStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireDataValue {
    pub value: Option<WireVariant>,
    pub status_code: Option<WireStatus>,
    pub source_timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireHistoryResult {
    pub node_id: Option<Value>,
    pub data_values: Option<Vec<Value>>,
}

/// Decode one element, falling back to an all-`None` value
pub(crate) fn lenient<T: DeserializeOwned + Default>(value: &Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

/// The envelope object: the first element of a list, or a bare object
pub(crate) fn envelope(content: Value) -> Option<Map<String, Value>> {
    match content {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        },
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Fail with the server message when `Success` is explicitly `false`
pub(crate) fn check_success(envelope: &Map<String, Value>) -> Result<()> {
    if envelope.get("Success") == Some(&Value::Bool(false)) {
        return Err(ClientError::Protocol(server_message(
            envelope,
            "Request was not successful",
        )));
    }
    Ok(())
}

/// `ErrorMessage` from the envelope, or `fallback`
pub(crate) fn server_message(envelope: &Map<String, Value>, fallback: &str) -> String {
    envelope
        .get("ErrorMessage")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// A mandatory array field of the envelope
pub(crate) fn required_array<'a>(
    envelope: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Vec<Value>> {
    envelope.get(field).and_then(Value::as_array).ok_or_else(|| {
        ClientError::Protocol(server_message(
            envelope,
            &format!("No {} returned from the server", field),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_accepts_list_and_object() {
        let from_list = envelope(json!([{"Success": true}])).unwrap();
        let from_object = envelope(json!({"Success": true})).unwrap();
        assert_eq!(from_list, from_object);
        assert!(envelope(json!([])).is_none());
        assert!(envelope(json!("text")).is_none());
    }

    #[test]
    fn test_check_success_message() {
        let env = envelope(json!({"Success": false, "ErrorMessage": "Bad node"})).unwrap();
        match check_success(&env) {
            Err(ClientError::Protocol(msg)) => assert_eq!(msg, "Bad node"),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
        let env = envelope(json!({"Values": []})).unwrap();
        assert!(check_success(&env).is_ok());
    }

    #[test]
    fn test_lenient_decoding() {
        let value: WireLiveValue = lenient(&json!({
            "ServerTimestamp": "2022-01-01T12:00:00Z",
            "Value": {"Type": 99, "Body": 1}
        }));
        assert_eq!(value.server_timestamp.as_deref(), Some("2022-01-01T12:00:00Z"));
        let variant = value.value.unwrap();
        assert_eq!(variant.type_name(), None);
        assert!(value.status_code.is_none());

        let broken: WireLiveValue = lenient(&json!("not an object"));
        assert!(broken.server_timestamp.is_none());
    }

    #[test]
    fn test_required_array() {
        let env = envelope(json!({"Success": true})).unwrap();
        match required_array(&env, "StatusCodes") {
            Err(ClientError::Protocol(msg)) => {
                assert_eq!(msg, "No StatusCodes returned from the server")
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }
}
