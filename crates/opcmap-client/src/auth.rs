//! Identity-provider session handling
//!
//! Two-step self-service login: acquire a flow id, then exchange the
//! flow id plus credentials for a session token with an expiry.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::error::{ClientError, Result};
use crate::transport::{HttpTransport, Payload, TimeoutProfile};

const LOGIN_FLOW_ENDPOINT: &str = "self-service/login/api";
const LOGIN_ENDPOINT: &str = "self-service/login";

/// Capability used by the REST clients: hand out a bearer token and
/// refresh it when the server reports the session as expired.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current session token, if one has been acquired
    fn session_token(&self) -> Option<String>;

    /// True when no token is held, the expiry is unknown, or it has passed
    fn is_expired(&self) -> bool;

    /// Acquire a fresh session token
    async fn refresh(&self) -> Result<()>;
}

/// Identity-provider connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity provider
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A session token and its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Expired when the expiry is unknown or lies strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now > expiry,
            None => true,
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Self-service login client for the identity provider
pub struct AuthClient {
    transport: HttpTransport,
    username: String,
    password: String,
    session: RwLock<Option<AuthSession>>,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(&config.base_url)?,
            username: config.username,
            password: config.password,
            session: RwLock::new(None),
        })
    }

    /// Current session, if any
    pub fn session(&self) -> Option<AuthSession> {
        self.session.read().clone()
    }

    /// Step 1: `GET self-service/login/api` and extract the flow `id`
    #[instrument(skip(self))]
    pub async fn acquire_flow_id(&self) -> Result<String> {
        let payload = self
            .transport
            .get(LOGIN_FLOW_ENDPOINT, &[], &json_headers(), TimeoutProfile::Extended)
            .await
            .map_err(provider_error)?;
        let content = payload_object(payload)?;

        check_provider_content(&content)?;

        match content.get("id") {
            Some(Value::String(id)) => {
                debug!("Acquired login flow");
                Ok(id.clone())
            }
            _ => Err(ClientError::Auth(
                "No valid id returned for the login flow".to_string(),
            )),
        }
    }

    /// Step 2: `POST self-service/login?flow=<id>` with the password credentials
    #[instrument(skip(self, flow_id))]
    pub async fn exchange_flow_for_token(&self, flow_id: &str) -> Result<AuthSession> {
        let body = json!({
            "method": "password",
            "identifier": self.username,
            "password": self.password,
        });
        let payload = self
            .transport
            .post(
                LOGIN_ENDPOINT,
                &body,
                &[("flow", flow_id.to_string())],
                &json_headers(),
                TimeoutProfile::Extended,
            )
            .await
            .map_err(provider_error)?;
        let content = payload_object(payload)?;

        check_provider_content(&content)?;

        let token = content
            .get("session_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Auth("No session token returned".to_string()))?
            .to_string();

        let expires_at = content
            .get("session")
            .and_then(|s| s.get("expires_at"))
            .and_then(Value::as_str)
            .and_then(parse_expiry);

        let session = AuthSession { token, expires_at };
        *self.session.write() = Some(session.clone());
        info!(expires_at = ?session.expires_at, "Acquired session token");
        Ok(session)
    }
}

#[async_trait]
impl TokenProvider for AuthClient {
    fn session_token(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.token.clone())
    }

    fn is_expired(&self) -> bool {
        match self.session.read().as_ref() {
            Some(session) => session.is_expired_at(Utc::now()),
            None => true,
        }
    }

    async fn refresh(&self) -> Result<()> {
        let flow_id = self.acquire_flow_id().await?;
        self.exchange_flow_for_token(&flow_id).await?;
        Ok(())
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.transport.base_url().as_str())
            .field("username", &self.username)
            .field("session", &*self.session.read())
            .finish()
    }
}

/// Parse an RFC 3339 expiry, tolerating more than six fractional digits
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&truncate_fraction(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Cut fractional seconds to microseconds, keeping the zone designator
fn truncate_fraction(raw: &str) -> Cow<'_, str> {
    let Some(dot) = raw.find('.') else {
        return Cow::Borrowed(raw);
    };
    let frac_start = dot + 1;
    let digits = raw[frac_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits <= 6 {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..frac_start + 6]);
    out.push_str(&raw[frac_start + digits..]);
    Cow::Owned(out)
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    headers
}

fn payload_object(payload: Payload) -> Result<serde_json::Map<String, Value>> {
    match payload.into_value() {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::Auth(format!(
            "Unexpected identity provider response: {}",
            other
        ))),
    }
}

/// `Success == false` or an `error` object means the flow failed
fn check_provider_content(content: &serde_json::Map<String, Value>) -> Result<()> {
    if content.get("Success") == Some(&Value::Bool(false)) {
        let message = content
            .get("ErrorMessage")
            .and_then(Value::as_str)
            .unwrap_or("Login flow was not successful");
        return Err(ClientError::Auth(message.to_string()));
    }
    if let Some(error) = content.get("error") {
        return Err(ClientError::Auth(provider_message(error)));
    }
    Ok(())
}

fn provider_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
}

/// Error bodies from the provider carry the reason in `error.message`
fn provider_error(err: ClientError) -> ClientError {
    match err {
        ClientError::Transport { status, body } => {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").map(provider_message))
                .unwrap_or(body);
            ClientError::Auth(format!("identity provider returned {}: {}", status, message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_expiry_nanoseconds() {
        let parsed = parse_expiry("2022-12-04T07:31:28.767407252Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2022, 12, 4, 7, 31, 28).unwrap()
            + chrono::Duration::microseconds(767407);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_expiry_offset_designator() {
        let parsed = parse_expiry("2022-12-04T08:31:28.123456789+01:00").unwrap();
        assert_eq!(parsed.format("%H:%M:%S%.6f").to_string(), "07:31:28.123456");
    }

    #[test]
    fn test_parse_expiry_plain() {
        assert!(parse_expiry("2022-12-04T07:31:28Z").is_some());
        assert!(parse_expiry("not a date").is_none());
    }

    #[test]
    fn test_truncate_fraction() {
        assert_eq!(truncate_fraction("2022-01-01T00:00:00.1Z"), "2022-01-01T00:00:00.1Z");
        assert_eq!(
            truncate_fraction("2022-01-01T00:00:00.123456789Z"),
            "2022-01-01T00:00:00.123456Z"
        );
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let no_expiry = AuthSession {
            token: "t".into(),
            expires_at: None,
        };
        assert!(no_expiry.is_expired_at(now));

        let past = AuthSession {
            token: "t".into(),
            expires_at: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(past.is_expired_at(now));

        let future = AuthSession {
            token: "t".into(),
            expires_at: Some(now + chrono::Duration::hours(1)),
        };
        assert!(!future.is_expired_at(now));
    }

    #[test]
    fn test_new_client_is_expired() {
        let client = AuthClient::new(AuthConfig {
            base_url: "http://localhost:4433".into(),
            username: "user".into(),
            password: "secret".into(),
        })
        .unwrap();
        assert!(client.is_expired());
        assert!(client.session_token().is_none());
        assert!(!format!("{:?}", client).contains("secret"));
    }

    #[test]
    fn test_check_provider_content() {
        let ok = json!({"id": "abc"}).as_object().cloned().unwrap();
        assert!(check_provider_content(&ok).is_ok());

        let failed = json!({"Success": false, "ErrorMessage": "bad"})
            .as_object()
            .cloned()
            .unwrap();
        match check_provider_content(&failed) {
            Err(ClientError::Auth(msg)) => assert_eq!(msg, "bad"),
            other => panic!("Expected Auth error, got {:?}", other),
        }

        let error = json!({"error": {"code": 410, "message": "flow expired"}})
            .as_object()
            .cloned()
            .unwrap();
        match check_provider_content(&error) {
            Err(ClientError::Auth(msg)) => assert_eq!(msg, "flow expired"),
            other => panic!("Expected Auth error, got {:?}", other),
        }
    }
}
