//! Authorized request layer
//!
//! Wraps [`HttpTransport`] with the bearer-token policy: refresh before the
//! request when the token is expired, and refresh-then-retry exactly once
//! when the server answers with a 401/410-class error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::auth::TokenProvider;
use crate::error::{ClientError, Result};
use crate::transport::{HttpTransport, Payload, TimeoutProfile};

/// HTTP transport plus an optional shared token provider
#[derive(Clone)]
pub struct AuthorizedTransport {
    transport: HttpTransport,
    auth: Option<Arc<dyn TokenProvider>>,
}

impl AuthorizedTransport {
    pub fn new(transport: HttpTransport, auth: Option<Arc<dyn TokenProvider>>) -> Self {
        Self { transport, auth }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn set_auth(&mut self, auth: Arc<dyn TokenProvider>) {
        self.auth = Some(auth);
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        profile: TimeoutProfile,
    ) -> Result<Payload> {
        self.send(|headers| async move {
            self.transport
                .get(endpoint, params, &headers, profile)
                .await
        })
        .await
    }

    pub async fn post<B: Serialize + ?Sized + Sync>(
        &self,
        endpoint: &str,
        body: &B,
        profile: TimeoutProfile,
    ) -> Result<Payload> {
        self.send(|headers| async move {
            self.transport
                .post(endpoint, body, &[], &headers, profile)
                .await
        })
        .await
    }

    async fn send<F, Fut>(&self, request: F) -> Result<Payload>
    where
        F: Fn(HeaderMap) -> Fut,
        Fut: Future<Output = Result<Payload>>,
    {
        let Some(auth) = &self.auth else {
            return request(base_headers()).await;
        };

        if auth.is_expired() {
            auth.refresh().await?;
        }

        let first = request(bearer_headers(auth.as_ref())?).await;
        if !needs_refresh(&first) {
            return first;
        }

        warn!("Session rejected by server, refreshing token and retrying once");
        auth.refresh().await?;

        let second = request(bearer_headers(auth.as_ref())?).await;
        if needs_refresh(&second) {
            return match second {
                Err(e) => Err(e),
                Ok(_) => Err(ClientError::Auth(
                    "Session still rejected after token refresh".to_string(),
                )),
            };
        }
        second
    }
}

impl fmt::Debug for AuthorizedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedTransport")
            .field("base_url", &self.transport.base_url().as_str())
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn bearer_headers(auth: &dyn TokenProvider) -> Result<HeaderMap> {
    let mut headers = base_headers();
    if let Some(token) = auth.session_token() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::Auth(format!("Invalid session token: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// 401/410 as HTTP status, or as an `error.code` in a JSON body
fn needs_refresh(result: &Result<Payload>) -> bool {
    match result {
        Err(e) => e.is_auth_expired(),
        Ok(Payload::Json(content)) => body_signals_expired(content),
        Ok(Payload::NonJson(_)) => false,
    }
}

fn body_signals_expired(content: &Value) -> bool {
    let envelope = match content {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    envelope
        .and_then(|e| e.get("error"))
        .and_then(|e| e.get("code"))
        .and_then(Value::as_i64)
        .is_some_and(|code| code == 401 || code == 410)
}
