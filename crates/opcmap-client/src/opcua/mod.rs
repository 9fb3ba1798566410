//! OPC UA REST gateway client
//!
//! Realtime reads, aggregated and raw history, live and historical writes.
//! Every request body starts from the same template carrying the target
//! OPC UA endpoint and, when configured, the client namespace array.

mod paging;
mod read;
mod wire;
mod write;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::auth::TokenProvider;
use crate::error::{ClientError, Result};
use crate::session::AuthorizedTransport;
use crate::transport::HttpTransport;

pub use paging::split_windows;
pub use read::Limit;
pub use write::{
    HistoricalWriteRequest, HistoricalWriteResult, PerformInsertReplace, WriteError, WriteResult,
    WriteVariable, OUT_OF_ORDER_MESSAGE,
};

/// Scheme required for the OPC UA server URL
pub const OPCUA_SCHEME: &str = "opc.tcp";

/// Authentication type sent in the connection block (anonymous gateway auth)
const AUTHENTICATION_TYPE: u8 = 1;

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// Base URL of the REST gateway
    pub rest_url: String,
    /// `opc.tcp://` URL of the OPC UA server behind the gateway
    pub opcua_url: String,
    /// Ordered namespace array sent as `ClientNamespaces`
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
    #[serde(default)]
    pub raw_history: RawHistoryConfig,
}

impl OpcUaConfig {
    pub fn new(rest_url: impl Into<String>, opcua_url: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into(),
            opcua_url: opcua_url.into(),
            namespaces: None,
            raw_history: RawHistoryConfig::default(),
        }
    }
}

/// Fan-out settings for windowed raw history reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistoryConfig {
    /// Width of one sub-range request in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Sub-range requests in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries of a sub-range after a 5xx response
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Back-off base in milliseconds (`base * 2^attempt`)
    #[serde(default)]
    pub retry_base_ms: u64,
}

fn default_window_secs() -> u64 {
    86_400
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for RawHistoryConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_base_ms: 0,
        }
    }
}

/// Client for the OPC UA REST gateway
#[derive(Debug, Clone)]
pub struct OpcUaClient {
    http: AuthorizedTransport,
    opcua_url: String,
    namespaces: Option<Vec<String>>,
    raw_history: RawHistoryConfig,
}

impl OpcUaClient {
    /// Create a client; fails when the OPC UA URL is not `opc.tcp://`
    pub fn new(config: OpcUaConfig) -> Result<Self> {
        validate_opcua_url(&config.opcua_url)?;
        Ok(Self {
            http: AuthorizedTransport::new(HttpTransport::new(&config.rest_url)?, None),
            opcua_url: config.opcua_url,
            namespaces: config.namespaces,
            raw_history: config.raw_history,
        })
    }

    /// Attach a token provider used for every subsequent request
    pub fn with_auth(mut self, auth: Arc<dyn TokenProvider>) -> Self {
        self.http.set_auth(auth);
        self
    }

    pub fn rest_url(&self) -> &Url {
        self.http.transport().base_url()
    }

    pub fn opcua_url(&self) -> &str {
        &self.opcua_url
    }

    pub fn raw_history_config(&self) -> &RawHistoryConfig {
        &self.raw_history
    }

    /// Fresh copy of the per-instance body template
    fn body_template(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            "Connection".to_string(),
            json!({ "Url": self.opcua_url, "AuthenticationType": AUTHENTICATION_TYPE }),
        );
        if let Some(namespaces) = &self.namespaces {
            body.insert("ClientNamespaces".to_string(), json!(namespaces));
        }
        body
    }
}

fn validate_opcua_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| ClientError::Validation(format!("Invalid OPC UA URL '{}': {}", raw, e)))?;
    if url.scheme() != OPCUA_SCHEME {
        return Err(ClientError::Validation(format!(
            "OPC UA URL must use the {}:// scheme, got '{}'",
            OPCUA_SCHEME,
            url.scheme()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpcUaConfig {
        OpcUaConfig::new("http://localhost:13371/api", "opc.tcp://localhost:4840")
    }

    #[test]
    fn test_client_creation() {
        let client = OpcUaClient::new(config()).unwrap();
        assert_eq!(client.rest_url().as_str(), "http://localhost:13371/api/");
        assert_eq!(client.opcua_url(), "opc.tcp://localhost:4840");
    }

    #[test]
    fn test_rejects_non_opc_tcp_scheme() {
        let mut cfg = config();
        cfg.opcua_url = "http://localhost:4840".to_string();
        assert!(matches!(
            OpcUaClient::new(cfg),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_body_template() {
        let client = OpcUaClient::new(config()).unwrap();
        let body = client.body_template();
        assert_eq!(
            body["Connection"],
            json!({"Url": "opc.tcp://localhost:4840", "AuthenticationType": 1})
        );
        assert!(!body.contains_key("ClientNamespaces"));

        let mut cfg = config();
        cfg.namespaces = Some(vec!["http://opcfoundation.org/UA/".into(), "urn:site".into()]);
        let client = OpcUaClient::new(cfg).unwrap();
        assert_eq!(
            client.body_template()["ClientNamespaces"],
            json!(["http://opcfoundation.org/UA/", "urn:site"])
        );
    }

    #[test]
    fn test_raw_history_defaults() {
        let cfg: RawHistoryConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.window_secs, 86_400);
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.retry_base_ms, 0);
    }
}
