//! Realtime and historical reads

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use opcmap_core::{HistoryRow, LiveValue, NodeId, OutputForm, ReadOutput};

use super::wire::{
    check_success, envelope, lenient, required_array, WireDataValue, WireHistoryResult,
    WireLiveValue,
};
use super::OpcUaClient;
use crate::error::{ClientError, Result};
use crate::transport::{Payload, TimeoutProfile};

const VALUES_GET: &str = "values/get";
const HISTORICAL_AGGREGATED: &str = "values/historicalaggregated";
pub(super) const HISTORICAL_RAW: &str = "values/historicalraw";

/// Paging key of a raw history read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Limit {
    pub start_index: u64,
    pub num_records: u64,
}

impl Limit {
    /// A limit when both halves are given, none when neither is; one half
    /// alone is rejected
    pub fn from_parts(start_index: Option<u64>, num_records: Option<u64>) -> Result<Option<Self>> {
        match (start_index, num_records) {
            (Some(start_index), Some(num_records)) => Ok(Some(Self {
                start_index,
                num_records,
            })),
            (None, None) => Ok(None),
            _ => Err(ClientError::Validation(
                "limit_start_index and limit_num_records must be given together".to_string(),
            )),
        }
    }
}

impl OpcUaClient {
    /// Read current values, one result per input node in input order.
    ///
    /// When the envelope carries no usable `Values`, every node comes back
    /// with empty value columns.
    #[instrument(skip(self, variables), fields(count = variables.len()))]
    pub async fn get_values(&self, variables: &[NodeId]) -> Result<Vec<LiveValue>> {
        let mut body = self.body_template();
        body.insert("NodeIds".to_string(), json!(variables));

        let payload = self
            .http
            .post(VALUES_GET, &body, TimeoutProfile::Normal)
            .await?;

        let Some(env) = payload.into_json().and_then(envelope) else {
            return Ok(variables.iter().cloned().map(LiveValue::empty).collect());
        };
        check_success(&env)?;

        let values = match env.get("Values") {
            Some(Value::Array(values)) => values,
            _ => {
                debug!("Response carried no Values");
                return Ok(variables.iter().cloned().map(LiveValue::empty).collect());
            }
        };

        Ok(variables
            .iter()
            .enumerate()
            .map(|(i, node_id)| match values.get(i) {
                Some(raw) => live_value(node_id.clone(), lenient(raw)),
                None => LiveValue::empty(node_id.clone()),
            })
            .collect())
    }

    /// Aggregated history over `[start, end]` in buckets of `interval_ms`
    #[instrument(skip(self, variables), fields(count = variables.len()))]
    pub async fn get_historical_aggregated_values(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_ms: u64,
        aggregate_name: &str,
        variables: &[NodeId],
        form: OutputForm,
    ) -> Result<ReadOutput<HistoryRow>> {
        let mut body = self.history_body(start, end);
        body.insert("ProcessingInterval".to_string(), json!(interval_ms));
        body.insert("AggregateName".to_string(), json!(aggregate_name));
        body.insert(
            "ReadValueIds".to_string(),
            Value::Array(
                variables
                    .iter()
                    .map(|v| json!({ "NodeId": v, "AggregateName": aggregate_name }))
                    .collect(),
            ),
        );

        let payload = self
            .http
            .post(HISTORICAL_AGGREGATED, &body, TimeoutProfile::Extended)
            .await?;
        let rows = history_rows(payload, variables)?;
        Ok(ReadOutput::project(rows, form))
    }

    /// Raw history over `[start, end]`, optionally paged by `Limit`.
    ///
    /// Paging needs both `limit_start_index` and `limit_num_records`; passing
    /// only one is a validation error and nothing is sent.
    #[instrument(skip(self, variables), fields(count = variables.len()))]
    pub async fn get_raw_historical_values(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        variables: &[NodeId],
        limit_start_index: Option<u64>,
        limit_num_records: Option<u64>,
        form: OutputForm,
    ) -> Result<ReadOutput<HistoryRow>> {
        let limit = Limit::from_parts(limit_start_index, limit_num_records)?;
        let rows = self.raw_history_rows(start, end, variables, limit).await?;
        Ok(ReadOutput::project(rows, form))
    }

    /// One raw history request, decoded to rows
    pub(super) async fn raw_history_request(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        variables: &[NodeId],
        limit: Option<Limit>,
    ) -> Result<Vec<HistoryRow>> {
        let mut body = self.history_body(start, end);
        body.insert(
            "ReadValueIds".to_string(),
            Value::Array(variables.iter().map(|v| json!({ "NodeId": v })).collect()),
        );
        if let Some(limit) = limit {
            body.insert("Limit".to_string(), json!(limit));
        }

        let payload = self
            .http
            .post(HISTORICAL_RAW, &body, TimeoutProfile::Extended)
            .await?;
        history_rows(payload, variables)
    }

    fn history_body(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Map<String, Value> {
        let mut body = self.body_template();
        body.insert("StartTime".to_string(), json!(iso_utc(start)));
        body.insert("EndTime".to_string(), json!(iso_utc(end)));
        body
    }
}

/// ISO-8601 with a `Z` suffix
pub(super) fn iso_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn live_value(node_id: NodeId, wire: WireLiveValue) -> LiveValue {
    let (value, value_type) = match wire.value {
        Some(variant) => (variant.body.clone(), variant.type_name()),
        None => (None, None),
    };
    let (status_code, status_symbol) = match wire.status_code {
        Some(status) => (status.code, status.symbol),
        None => (None, None),
    };
    LiveValue {
        node_id,
        timestamp: wire.server_timestamp,
        value,
        value_type,
        status_code,
        status_symbol,
    }
}

/// Flatten `HistoryReadResults -> DataValues` into rows.
///
/// The per-node status is dropped; per-point status is kept. Points of one
/// node are ordered by timestamp when every timestamp parses.
pub(super) fn history_rows(payload: Payload, variables: &[NodeId]) -> Result<Vec<HistoryRow>> {
    let env = match payload {
        Payload::Json(content) => envelope(content),
        Payload::NonJson(_) => None,
    }
    .ok_or_else(|| ClientError::Protocol("No content returned from the server".to_string()))?;

    check_success(&env)?;
    let results = required_array(&env, "HistoryReadResults")?;

    let mut rows = Vec::new();
    for (i, raw) in results.iter().enumerate() {
        let result: WireHistoryResult = lenient(raw);
        let node_id = match result
            .node_id
            .as_ref()
            .and_then(|v| NodeId::from_value(v).ok())
            .or_else(|| variables.get(i).cloned())
        {
            Some(node_id) => node_id,
            None => {
                warn!(index = i, "Skipping history result without a NodeId");
                continue;
            }
        };

        let mut node_rows: Vec<HistoryRow> = result
            .data_values
            .unwrap_or_default()
            .iter()
            .map(|dv| history_row(node_id.clone(), lenient(dv)))
            .collect();
        sort_by_timestamp(&mut node_rows);
        rows.extend(node_rows);
    }

    debug!(rows = rows.len(), "Decoded history");
    Ok(rows)
}

fn history_row(node_id: NodeId, wire: WireDataValue) -> HistoryRow {
    let (value, value_type) = match wire.value {
        Some(variant) => (variant.body.clone(), variant.type_name()),
        None => (None, None),
    };
    let (status_code, status_symbol) = match wire.status_code {
        Some(status) => (status.code, status.symbol),
        None => (None, None),
    };
    HistoryRow {
        node_id,
        timestamp: wire.source_timestamp,
        value,
        value_type,
        status_code,
        status_symbol,
    }
}

fn sort_by_timestamp(rows: &mut [HistoryRow]) {
    let parsed: Option<Vec<DateTime<Utc>>> = rows
        .iter()
        .map(|r| {
            r.timestamp
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc))
        })
        .collect();
    let Some(keys) = parsed else {
        return;
    };
    if keys.windows(2).all(|w| w[0] <= w[1]) {
        return;
    }

    let mut keyed: Vec<(DateTime<Utc>, HistoryRow)> =
        keys.into_iter().zip(rows.iter().cloned()).collect();
    keyed.sort_by_key(|(ts, _)| *ts);
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
}
