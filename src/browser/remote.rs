//! Remote browser provider: REST session lifecycle plus CDP connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{BrowserProvider, BrowserSession, ProxyDirective, SessionRequest};
use crate::config::{ConfigError, ProviderConfig};
use crate::scrape::error::{is_quota_message, QUOTA_ERROR_CODE};
use crate::scrape::AttemptError;

/// Response fields that may carry the CDP WebSocket endpoint, in lookup order.
const ENDPOINT_FIELDS: &[&str] = &[
    "webSocketDebuggerUrl",
    "browserWSEndpoint",
    "wsUrl",
    "websocketUrl",
    "browserUrl",
    "endpoint",
    "connectUrl",
];

const ID_FIELDS: &[&str] = &["id", "sessionId", "taskId"];

const TUNNEL_FAILURE: &str = "TUNNEL_CONNECTION_FAILED";

/// A created remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Option<String>,
    pub ws_endpoint: String,
}

/// REST client for creating and releasing provider sessions.
pub struct SessionApi {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    connect_url: String,
}

impl SessionApi {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            connect_url: config.connect_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a session with the request's name, TTL and egress.
    pub async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionInfo, AttemptError> {
        let mut body = json!({
            "sessionName": request.session_name,
            "sessionTTL": request.ttl.as_secs(),
        });
        match &request.proxy {
            Some(ProxyDirective::Url(url)) => body["proxy"] = json!({ "url": url }),
            Some(ProxyDirective::Country(country)) => {
                body["proxy"] = json!({ "country": country })
            }
            None => {}
        }

        let response = self
            .client
            .post(format!("{}/sessions", self.api_url))
            .header("x-api-token", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::session(format!("Session request failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            AttemptError::session(format!("Failed to read session response: {}", e))
        })?;

        parse_session_response(status, &text, &self.connect_url)
    }

    /// Ask the provider to release a session before its TTL runs out.
    pub async fn release_session(&self, session_id: &str) -> Result<(), AttemptError> {
        let response = self
            .client
            .post(format!("{}/sessions/{}", self.api_url, session_id))
            .header("x-api-token", &self.api_key)
            .json(&json!({ "status": "REQUEST_RELEASE" }))
            .send()
            .await
            .map_err(|e| AttemptError::session(format!("Session release failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AttemptError::session(format!(
                "Session release returned HTTP {}",
                response.status().as_u16()
            )));
        }

        debug!("Released session {}", session_id);
        Ok(())
    }
}

/// Interpret a create-session response.
///
/// HTTP errors and `{code, message}` envelopes with a non-200 code become
/// classified attempt errors. Otherwise the endpoint is looked up under
/// several field names at the top level and under `data`. A non-WebSocket
/// endpoint, or a bare session id, is joined onto `connect_url`.
pub fn parse_session_response(
    status: u16,
    body: &str,
    connect_url: &str,
) -> Result<SessionInfo, AttemptError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let (code, message) = match &parsed {
            Some(value) => envelope_error(value),
            None => (None, None),
        };
        let message = message.unwrap_or_else(|| truncate(body, 200));
        return Err(classify_provider_error(
            code.or(Some(i64::from(status))),
            &format!("HTTP {} - {}", status, message),
        ));
    }

    let value = parsed.ok_or_else(|| {
        AttemptError::session(format!("Invalid session response: {}", truncate(body, 200)))
    })?;

    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if code != 200 {
            let (_, message) = envelope_error(&value);
            return Err(classify_provider_error(
                Some(code),
                &message.unwrap_or_else(|| format!("Code {}", code)),
            ));
        }
    }

    let scopes: Vec<&Value> = std::iter::once(&value).chain(value.get("data")).collect();

    let id = scopes
        .iter()
        .find_map(|scope| first_string(scope, ID_FIELDS))
        .or_else(|| value.get("data").and_then(Value::as_str).map(str::to_string));
    let endpoint = scopes
        .iter()
        .find_map(|scope| first_string(scope, ENDPOINT_FIELDS));

    let ws_endpoint = match (endpoint, &id) {
        (Some(endpoint), _) if is_websocket(&endpoint) => endpoint,
        (_, Some(id)) => format!("{}/{}", connect_url.trim_end_matches('/'), id),
        (Some(endpoint), None) => {
            return Err(AttemptError::session(format!(
                "Session endpoint is not a WebSocket URL and no session id was returned: {}",
                endpoint
            )))
        }
        (None, None) => {
            return Err(AttemptError::session(
                "No browser endpoint in session response",
            ))
        }
    };

    Ok(SessionInfo { id, ws_endpoint })
}

/// Map a provider error onto an attempt error.
pub fn classify_provider_error(code: Option<i64>, message: &str) -> AttemptError {
    if code == Some(QUOTA_ERROR_CODE) || is_quota_message(message) {
        return AttemptError::quota(format!("Insufficient balance ({})", message));
    }

    if message.contains(TUNNEL_FAILURE) {
        return AttemptError::session(format!("Proxy tunnel connection failed: {}", message));
    }

    match code {
        Some(code) => {
            AttemptError::session(format!("Provider error (code {}): {}", code, message))
        }
        None => AttemptError::session(format!("Provider error: {}", message)),
    }
}

fn envelope_error(value: &Value) -> (Option<i64>, Option<String>) {
    let code = value
        .get("code")
        .or_else(|| value.get("statusCode"))
        .and_then(Value::as_i64);
    let message = ["error", "message", "msg"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    (code, message)
}

fn first_string(scope: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        scope
            .get(*field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn is_websocket(endpoint: &str) -> bool {
    endpoint.starts_with("ws://") || endpoint.starts_with("wss://")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Per-command timeout for the CDP connection of a session.
///
/// A navigation is a single protocol command, so the command timeout has to
/// cover the whole navigation budget or it cuts navigations short.
pub fn handler_timeout(request_timeout: Duration, navigation_timeout: Duration) -> Duration {
    request_timeout.max(navigation_timeout)
}

/// Provider backed by the REST session API and a CDP connection.
pub struct RemoteBrowserProvider {
    api: Arc<SessionApi>,
    request_timeout: Duration,
}

impl RemoteBrowserProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api: Arc::new(SessionApi::new(config)?),
            request_timeout: config.request_timeout(),
        })
    }

    #[cfg(feature = "browser")]
    async fn release_quietly(&self, info: &SessionInfo) {
        if let Some(id) = &info.id {
            if let Err(e) = self.api.release_session(id).await {
                warn!("Failed to release session {}: {}", id, e);
            }
        }
    }
}

#[async_trait]
impl BrowserProvider for RemoteBrowserProvider {
    #[cfg(feature = "browser")]
    async fn open_session(
        &self,
        request: &SessionRequest,
    ) -> Result<Box<dyn BrowserSession>, AttemptError> {
        let info = self.api.create_session(request).await?;
        info!(
            "Created session {} ({})",
            info.id.as_deref().unwrap_or(&request.session_name),
            request.session_name
        );

        match super::cdp::CdpSession::connect(
            self.api.clone(),
            &info,
            &request.session_name,
            handler_timeout(self.request_timeout, request.navigation_timeout),
        )
        .await
        {
            Ok(session) => Ok(Box::new(session)),
            Err(e) => {
                self.release_quietly(&info).await;
                Err(e)
            }
        }
    }

    #[cfg(not(feature = "browser"))]
    async fn open_session(
        &self,
        _request: &SessionRequest,
    ) -> Result<Box<dyn BrowserSession>, AttemptError> {
        Err(AttemptError::session(
            "Browser support not compiled. Rebuild with: cargo build --features browser",
        ))
    }
}
