//! Remote headless-browser abstraction.
//!
//! A [`BrowserProvider`] opens one remote session per attempt. Each session
//! hands out pages driven over CDP. The real implementation lives in
//! [`remote`]; tests substitute an in-memory provider.

mod remote;

#[cfg(feature = "browser")]
mod cdp;

pub use remote::{
    handler_timeout, parse_session_response, RemoteBrowserProvider, SessionApi, SessionInfo,
};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SessionSettings;
use crate::proxy::EgressPlan;
use crate::scrape::AttemptError;

/// Egress instruction sent with a create-session request.
#[derive(Clone, PartialEq, Eq)]
pub enum ProxyDirective {
    /// Route through an explicit proxy URL (credentials embedded).
    Url(String),
    /// Ask the provider for a residential exit in this country.
    Country(String),
}

impl fmt::Debug for ProxyDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(<redacted>)"),
            Self::Country(country) => f.debug_tuple("Country").field(country).finish(),
        }
    }
}

/// Everything the provider needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub session_name: String,
    pub ttl: Duration,
    pub proxy: Option<ProxyDirective>,
    /// Upper bound the attempt puts on a single navigation. Protocol
    /// timeouts on the connection must not be shorter.
    pub navigation_timeout: Duration,
}

impl SessionRequest {
    /// Build a request for one attempt under the given plan.
    pub fn for_plan(plan: &EgressPlan, settings: &SessionSettings) -> Self {
        let proxy = match plan {
            EgressPlan::Direct => None,
            EgressPlan::Residential { country } => Some(ProxyDirective::Country(country.clone())),
            EgressPlan::Dedicated(endpoint) => Some(ProxyDirective::Url(endpoint.connection_url())),
        };

        Self {
            session_name: format!("scrape-{}", uuid::Uuid::new_v4()),
            ttl: settings.ttl(),
            proxy,
            navigation_timeout: settings.navigation_timeout(),
        }
    }
}

/// Page viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl From<&SessionSettings> for Viewport {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            width: settings.viewport_width,
            height: settings.viewport_height,
        }
    }
}

/// Main-document response observed during navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub url: String,
}

impl NavigationResponse {
    /// Build from a raw protocol status, rejecting anything that is not an
    /// HTTP status code.
    pub fn from_raw(status: i64, url: impl Into<String>) -> Result<Self, AttemptError> {
        match u16::try_from(status) {
            Ok(code) if (100..=599).contains(&code) => Ok(Self {
                status: code,
                url: url.into(),
            }),
            _ => Err(AttemptError::navigation(format!(
                "Invalid HTTP status {} in navigation response",
                status
            ))),
        }
    }
}

/// Opens remote browser sessions.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Create a session with the requested egress and connect to it.
    ///
    /// If the connection step fails after the remote session was created,
    /// the provider releases it before returning the error.
    async fn open_session(
        &self,
        request: &SessionRequest,
    ) -> Result<Box<dyn BrowserSession>, AttemptError>;
}

/// One connected remote browser.
#[async_trait]
pub trait BrowserSession: Send {
    fn id(&self) -> &str;

    async fn new_page(&mut self) -> Result<Box<dyn BrowserPage>, AttemptError>;

    /// Disconnect and release the remote session. Safe to call twice.
    async fn close(&mut self) -> Result<(), AttemptError>;
}

/// One browser tab.
#[async_trait]
pub trait BrowserPage: Send {
    async fn configure(
        &mut self,
        viewport: Viewport,
        user_agent: &str,
    ) -> Result<(), AttemptError>;

    /// Navigate and wait for the DOM to be parsed.
    ///
    /// `Ok(None)` means the navigation finished without a document response.
    async fn navigate(&mut self, url: &str) -> Result<Option<NavigationResponse>, AttemptError>;

    async fn content(&mut self) -> Result<String, AttemptError>;

    async fn title(&mut self) -> Option<String>;

    /// Value of `meta[name="description"]`, if present and readable.
    async fn meta_description(&mut self) -> Option<String>;

    async fn current_url(&mut self) -> Option<String>;

    /// Close the tab. Safe to call twice.
    async fn close(&mut self) -> Result<(), AttemptError>;
}
