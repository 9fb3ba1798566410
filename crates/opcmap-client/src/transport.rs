//! HTTP transport shared by every REST client
//!
//! Plain `GET`/`POST` with JSON decoding. Auth and retries are layered
//! above this in [`crate::session`].

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ClientError, Result};

/// Connection timeout for every request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Read timeout of the normal profile
pub const NORMAL_READ_TIMEOUT: Duration = Duration::from_secs(27);
/// Read timeout of the extended profile (auth and bulk history)
pub const EXTENDED_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Read-timeout tier of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutProfile {
    #[default]
    Normal,
    Extended,
}

impl TimeoutProfile {
    pub fn read_timeout(self) -> Duration {
        match self {
            TimeoutProfile::Normal => NORMAL_READ_TIMEOUT,
            TimeoutProfile::Extended => EXTENDED_READ_TIMEOUT,
        }
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body declared as JSON (an empty body decodes to `null`)
    Json(Value),
    /// Any other body, kept as raw text
    NonJson(String),
}

impl Payload {
    pub fn json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::NonJson(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::NonJson(_) => None,
        }
    }

    /// JSON value, with non-JSON bodies wrapped as `{"kind": "non-json", "content": ...}`
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(v) => v,
            Payload::NonJson(content) => json!({ "kind": "non-json", "content": content }),
        }
    }
}

/// Append a trailing `/` unless one is already present
pub fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Stateless HTTP transport bound to one base URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for `base_url` (a trailing `/` is added if missing)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Create a transport reusing an existing connection pool
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(&normalize_base_url(base_url))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an endpoint onto the base URL; leading slashes are ignored
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }

    #[instrument(skip(self, headers), fields(base = %self.base_url))]
    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        headers: &HeaderMap,
        profile: TimeoutProfile,
    ) -> Result<Payload> {
        let url = self.endpoint_url(endpoint)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(params)
            .headers(headers.clone())
            .timeout(profile.read_timeout())
            .send()
            .await?;
        Self::read_payload(response).await
    }

    #[instrument(skip(self, body, headers), fields(base = %self.base_url))]
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        params: &[(&str, String)],
        headers: &HeaderMap,
        profile: TimeoutProfile,
    ) -> Result<Payload> {
        let url = self.endpoint_url(endpoint)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .query(params)
            .headers(headers.clone())
            .json(body)
            .timeout(profile.read_timeout())
            .send()
            .await?;
        Self::read_payload(response).await
    }

    async fn read_payload(response: reqwest::Response) -> Result<Payload> {
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let body = response.text().await?;

        if status.as_u16() >= 400 {
            return Err(ClientError::transport(status.as_u16(), body));
        }

        if !is_json {
            return Ok(Payload::NonJson(body));
        }
        if body.trim().is_empty() {
            return Ok(Payload::Json(Value::Null));
        }
        serde_json::from_str(&body)
            .map(Payload::Json)
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}
