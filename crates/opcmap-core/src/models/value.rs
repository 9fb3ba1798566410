//! Read results and history points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node_id::NodeId;
use super::table::TableRow;
use super::variant::{StatusCode, Variant};

/// Result of a realtime read: the requested node extended with its value.
///
/// Every field except the node is `None` when the server did not return it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveValue {
    #[serde(flatten)]
    pub node_id: NodeId,
    pub timestamp: Option<String>,
    pub value: Option<Value>,
    pub value_type: Option<String>,
    pub status_code: Option<i64>,
    pub status_symbol: Option<String>,
}

impl LiveValue {
    /// The requested node with every value column empty
    pub fn empty(node_id: NodeId) -> Self {
        Self {
            node_id,
            timestamp: None,
            value: None,
            value_type: None,
            status_code: None,
            status_symbol: None,
        }
    }
}

impl TableRow for LiveValue {
    fn columns() -> &'static [&'static str] {
        &[
            "Id",
            "Namespace",
            "IdType",
            "Timestamp",
            "Value",
            "ValueType",
            "StatusCode",
            "StatusSymbol",
        ]
    }

    fn cells(&self) -> Vec<Value> {
        vec![
            Value::from(self.node_id.id.clone()),
            Value::from(self.node_id.namespace),
            Value::from(self.node_id.id_type.code()),
            opt(self.timestamp.clone()),
            self.value.clone().unwrap_or(Value::Null),
            opt(self.value_type.clone()),
            opt(self.status_code),
            opt(self.status_symbol.clone()),
        ]
    }
}

/// One flattened point of a historical read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryRow {
    pub node_id: NodeId,
    pub timestamp: Option<String>,
    pub value: Option<Value>,
    pub value_type: Option<String>,
    pub status_code: Option<i64>,
    pub status_symbol: Option<String>,
}

impl TableRow for HistoryRow {
    fn columns() -> &'static [&'static str] {
        &[
            "NodeId.IdType",
            "NodeId.Id",
            "NodeId.Namespace",
            "Timestamp",
            "Value",
            "ValueType",
            "StatusCode",
            "StatusSymbol",
        ]
    }

    fn cells(&self) -> Vec<Value> {
        vec![
            Value::from(self.node_id.id_type.code()),
            Value::from(self.node_id.id.clone()),
            Value::from(self.node_id.namespace),
            opt(self.timestamp.clone()),
            self.value.clone().unwrap_or(Value::Null),
            opt(self.value_type.clone()),
            opt(self.status_code),
            opt(self.status_symbol.clone()),
        ]
    }
}

/// A timestamped value as written to history (or live)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryPoint {
    pub value: Variant,
    pub source_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<StatusCode>,
}

impl HistoryPoint {
    pub fn new(value: Variant, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            source_timestamp,
            status_code: Some(StatusCode::from_code(0)),
        }
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

fn opt<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node_id::IdType;
    use serde_json::json;

    #[test]
    fn test_live_value_flattens_node() {
        let mut row = LiveValue::empty(NodeId::new("SOMEID", 1, IdType::Guid));
        row.value = Some(json!(1.2));
        row.value_type = Some("Float".to_string());

        let encoded = serde_json::to_value(&row).unwrap();
        assert_eq!(
            encoded,
            json!({
                "Id": "SOMEID",
                "Namespace": 1,
                "IdType": 2,
                "Timestamp": null,
                "Value": 1.2,
                "ValueType": "Float",
                "StatusCode": null,
                "StatusSymbol": null
            })
        );
    }

    #[test]
    fn test_history_point_wire_shape() {
        let ts = "2022-09-13T13:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let point = HistoryPoint::new(Variant::double(3.0), ts);
        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            json!({
                "Value": {"Type": 11, "Body": 3.0},
                "SourceTimestamp": "2022-09-13T13:00:00Z",
                "StatusCode": {"Code": 0}
            })
        );
    }
}
