//! Live and historical writes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use opcmap_core::{HistoryPoint, NodeId, StatusCode};

use super::wire::{check_success, envelope, lenient, required_array};
use super::OpcUaClient;
use crate::error::{ClientError, Result};
use crate::transport::{Payload, TimeoutProfile};

const VALUES_SET: &str = "values/set";
const HISTORICAL_WRITE: &str = "values/historicalwrite";

/// Message of the ordering check on historical writes
pub const OUT_OF_ORDER_MESSAGE: &str = "Time for variables not in correct order";

/// One live write: a node and the value to set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteVariable {
    pub node_id: NodeId,
    pub value: HistoryPoint,
}

/// A live write request extended with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteResult {
    #[serde(flatten)]
    pub request: WriteVariable,
    pub write_success: bool,
    pub status_code: Option<StatusCode>,
}

/// How a historical write treats existing points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PerformInsertReplace {
    Insert = 1,
    Replace = 2,
}

impl From<PerformInsertReplace> for u8 {
    fn from(mode: PerformInsertReplace) -> Self {
        mode as u8
    }
}

impl TryFrom<u8> for PerformInsertReplace {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(PerformInsertReplace::Insert),
            2 => Ok(PerformInsertReplace::Replace),
            other => Err(format!("Invalid PerformInsertReplace code {}", other)),
        }
    }
}

/// Points to insert or replace in the history of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoricalWriteRequest {
    pub node_id: NodeId,
    pub perform_insert_replace: PerformInsertReplace,
    pub update_values: Vec<HistoryPoint>,
}

impl HistoricalWriteRequest {
    /// True when `UpdateValues` is strictly ascending by source timestamp
    pub fn is_ordered(&self) -> bool {
        self.update_values
            .windows(2)
            .all(|w| w[0].source_timestamp < w[1].source_timestamp)
    }
}

/// Non-good status of a historical write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteError {
    pub code: i64,
    pub symbol: Option<String>,
}

/// A historical write request extended with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoricalWriteResult {
    #[serde(flatten)]
    pub request: HistoricalWriteRequest,
    pub write_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_error: Option<WriteError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUpdateResult {
    status_code: Option<StatusCode>,
}

impl OpcUaClient {
    /// Set live values; results follow the input order.
    ///
    /// Returns `None` when the gateway answers with an empty body.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn write_values(&self, requests: &[WriteVariable]) -> Result<Option<Vec<WriteResult>>> {
        for request in requests {
            request.value.value.validate()?;
        }

        let mut body = self.body_template();
        body.insert("NodeIdValues".to_string(), json!(requests));

        let payload = self
            .http
            .post(VALUES_SET, &body, TimeoutProfile::Normal)
            .await?;
        let Some(content) = response_content(payload)? else {
            return Ok(None);
        };
        let env = envelope(content).ok_or_else(|| {
            ClientError::Protocol("Unexpected response shape for values/set".to_string())
        })?;
        check_success(&env)?;
        let codes = required_array(&env, "StatusCodes")?;

        let results = requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                let status_code: Option<StatusCode> = codes.get(i).map(lenient);
                WriteResult {
                    request: request.clone(),
                    write_success: status_code.as_ref().is_some_and(StatusCode::is_good),
                    status_code,
                }
            })
            .collect();
        Ok(Some(results))
    }

    /// Insert or replace history points.
    ///
    /// Every request must list its points in strictly ascending timestamp
    /// order; otherwise nothing is sent.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn write_historical_values(
        &self,
        requests: &[HistoricalWriteRequest],
    ) -> Result<Option<Vec<HistoricalWriteResult>>> {
        for request in requests {
            if !request.is_ordered() {
                return Err(ClientError::Validation(OUT_OF_ORDER_MESSAGE.to_string()));
            }
            for point in &request.update_values {
                point.value.validate()?;
            }
        }

        let mut body = self.body_template();
        body.insert("HistoryUpdateDataDetails".to_string(), json!(requests));

        let payload = self
            .http
            .post(HISTORICAL_WRITE, &body, TimeoutProfile::Extended)
            .await?;
        let Some(content) = response_content(payload)? else {
            return Ok(None);
        };
        let env = envelope(content).ok_or_else(|| {
            ClientError::Protocol("Unexpected response shape for values/historicalwrite".to_string())
        })?;
        check_success(&env)?;
        let updates = required_array(&env, "HistoryUpdateResults")?;

        let results = requests
            .iter()
            .enumerate()
            .map(|(i, request)| match updates.get(i) {
                Some(update) => {
                    let status = lenient::<WireUpdateResult>(update).status_code;
                    historical_result(request.clone(), status)
                }
                None => unacknowledged_result(request.clone()),
            })
            .collect();
        if updates.len() < requests.len() {
            warn!(
                expected = requests.len(),
                received = updates.len(),
                "Fewer HistoryUpdateResults than requests"
            );
        }
        Ok(Some(results))
    }
}

fn historical_result(request: HistoricalWriteRequest, status: Option<StatusCode>) -> HistoricalWriteResult {
    let code = status.as_ref().and_then(|s| s.code);
    let write_error = match code {
        Some(code) if code != 0 => Some(WriteError {
            code,
            symbol: status.and_then(|s| s.symbol),
        }),
        _ => None,
    };
    HistoricalWriteResult {
        request,
        write_success: write_error.is_none(),
        write_error,
    }
}

/// A request the server returned no result entry for
fn unacknowledged_result(request: HistoricalWriteRequest) -> HistoricalWriteResult {
    HistoricalWriteResult {
        request,
        write_success: false,
        write_error: None,
    }
}

/// `None` for an empty body; non-JSON text is a protocol failure
fn response_content(payload: Payload) -> Result<Option<Value>> {
    match payload {
        Payload::Json(Value::Null) => Ok(None),
        Payload::Json(content) => Ok(Some(content)),
        Payload::NonJson(text) if text.trim().is_empty() => Ok(None),
        Payload::NonJson(text) => {
            debug!(len = text.len(), "Non-JSON write response");
            Err(ClientError::Protocol(format!(
                "Unexpected non-JSON response: {}",
                text
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use opcmap_core::Variant;

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn request(stamps: &[&str]) -> HistoricalWriteRequest {
        HistoricalWriteRequest {
            node_id: NodeId::string("Site.Power", 2),
            perform_insert_replace: PerformInsertReplace::Insert,
            update_values: stamps
                .iter()
                .map(|s| HistoryPoint::new(Variant::double(1.0), ts(s)))
                .collect(),
        }
    }

    #[test]
    fn test_ordering_check() {
        assert!(request(&["2022-09-13T13:00:00Z", "2022-09-13T14:00:00Z"]).is_ordered());
        assert!(!request(&["2022-09-13T14:00:00Z", "2022-09-13T13:00:00Z"]).is_ordered());
        assert!(!request(&["2022-09-13T13:00:00Z", "2022-09-13T13:00:00Z"]).is_ordered());
        assert!(request(&[]).is_ordered());
    }

    #[test]
    fn test_historical_request_wire_shape() {
        let encoded = serde_json::to_value(request(&["2022-09-13T13:00:00Z"])).unwrap();
        assert_eq!(encoded["PerformInsertReplace"], json!(1));
        assert_eq!(encoded["NodeId"]["Id"], json!("Site.Power"));
        assert_eq!(
            encoded["UpdateValues"][0]["SourceTimestamp"],
            json!("2022-09-13T13:00:00Z")
        );
    }

    #[test]
    fn test_historical_result_status() {
        let ok = historical_result(request(&[]), None);
        assert!(ok.write_success);
        assert!(ok.write_error.is_none());

        let good = historical_result(request(&[]), Some(StatusCode::good()));
        assert!(good.write_success);

        let bad = historical_result(
            request(&[]),
            Some(StatusCode::new(2_158_690_304, "BadNodeIdUnknown")),
        );
        assert!(!bad.write_success);
        assert_eq!(
            bad.write_error,
            Some(WriteError {
                code: 2_158_690_304,
                symbol: Some("BadNodeIdUnknown".to_string())
            })
        );
    }

    #[test]
    fn test_unacknowledged_result_fails() {
        let result = unacknowledged_result(request(&["2022-09-13T13:00:00Z"]));
        assert!(!result.write_success);
        assert!(result.write_error.is_none());
    }

    #[test]
    fn test_response_content() {
        assert_eq!(response_content(Payload::Json(Value::Null)).unwrap(), None);
        assert_eq!(response_content(Payload::NonJson("  ".into())).unwrap(), None);
        assert!(response_content(Payload::NonJson("<html>".into())).is_err());
    }

    #[test]
    fn test_perform_insert_replace_codes() {
        assert_eq!(u8::from(PerformInsertReplace::Replace), 2);
        assert!(PerformInsertReplace::try_from(3).is_err());
    }
}
