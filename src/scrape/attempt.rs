//! One scrape attempt: a single remote session under a single egress plan.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, BrowserProvider, BrowserSession, SessionRequest, Viewport};
use crate::config::SessionSettings;
use crate::content::{extract_description, extract_title};
use crate::normalize::NormalizedUrl;
use crate::proxy::EgressPlan;

use super::error::AttemptError;

/// A rendered document read back from the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPage {
    pub html: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub status_code: u16,
}

/// Result of one attempt. Failures are values here; the orchestrator decides
/// whether to keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Captured(CapturedPage),
    Failed(AttemptError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Captured(_))
    }
}

/// Run a single attempt against `url` with the given egress.
///
/// The page and session are closed on every path, page first. If this
/// future is dropped mid-flight, the guard schedules the same close on the
/// current runtime instead.
pub async fn run_attempt(
    provider: &dyn BrowserProvider,
    settings: &SessionSettings,
    url: &NormalizedUrl,
    plan: &EgressPlan,
) -> AttemptOutcome {
    run_attempt_counted(provider, settings, url, plan, &AtomicU64::new(0)).await
}

/// [`run_attempt`], bumping `sessions_opened` as soon as the provider hands
/// back a connected session.
pub(crate) async fn run_attempt_counted(
    provider: &dyn BrowserProvider,
    settings: &SessionSettings,
    url: &NormalizedUrl,
    plan: &EgressPlan,
    sessions_opened: &AtomicU64,
) -> AttemptOutcome {
    match capture(provider, settings, url, plan, sessions_opened).await {
        Ok(page) => AttemptOutcome::Captured(page),
        Err(e) => AttemptOutcome::Failed(e),
    }
}

async fn capture(
    provider: &dyn BrowserProvider,
    settings: &SessionSettings,
    url: &NormalizedUrl,
    plan: &EgressPlan,
    sessions_opened: &AtomicU64,
) -> Result<CapturedPage, AttemptError> {
    let request = SessionRequest::for_plan(plan, settings);
    let mut session = SessionGuard::new(provider.open_session(&request).await?);
    sessions_opened.fetch_add(1, Ordering::Relaxed);
    info!(session = session.id(), %plan, "Opened browser session");

    // Inner fn so the session is closed whatever happens in between
    let result = capture_in_session(&mut session, settings, url).await;
    session.close().await;
    result
}

async fn capture_in_session(
    session: &mut SessionGuard,
    settings: &SessionSettings,
    url: &NormalizedUrl,
) -> Result<CapturedPage, AttemptError> {
    session.open_page().await?;

    let result = read_page(session.page()?, settings, url).await;
    session.close_page().await;
    result
}

async fn read_page(
    page: &mut dyn BrowserPage,
    settings: &SessionSettings,
    url: &NormalizedUrl,
) -> Result<CapturedPage, AttemptError> {
    page.configure(Viewport::from(settings), &settings.user_agent).await?;

    let response = tokio::time::timeout(
        settings.navigation_timeout(),
        page.navigate(url.as_str()),
    )
    .await
    .map_err(|_| {
        AttemptError::navigation(format!(
            "Navigation timed out after {}s for {}",
            settings.navigation_timeout_secs, url
        ))
    })??
    .ok_or_else(|| AttemptError::navigation("no response received"))?;

    debug!(status = response.status, "Navigation response for {}", url);
    tokio::time::sleep(settings.settle()).await;

    let html = page.content().await?;
    if html.chars().count() < settings.min_html_len {
        return Err(AttemptError::empty_content("no HTML content found"));
    }

    let title = match page.title().await {
        Some(title) => title,
        None => extract_title(&html).unwrap_or_default(),
    };
    let description = match page.meta_description().await {
        Some(description) => Some(description),
        None => extract_description(&html),
    };
    let final_url = match page.current_url().await {
        Some(current) => current,
        None if !response.url.is_empty() => response.url.clone(),
        None => url.to_string(),
    };

    debug!(bytes = html.len(), "Captured {}", final_url);

    Ok(CapturedPage {
        html,
        title,
        description,
        url: final_url,
        status_code: response.status,
    })
}

/// Owns a session and its open page until they are explicitly closed.
///
/// Teardown always closes the page before the session, including the
/// background teardown scheduled when the guard is dropped.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
    page: Option<Box<dyn BrowserPage>>,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
            page: None,
        }
    }

    fn id(&self) -> &str {
        self.session.as_deref().map(|s| s.id()).unwrap_or_default()
    }

    async fn open_page(&mut self) -> Result<(), AttemptError> {
        let session = self
            .session
            .as_deref_mut()
            .ok_or_else(|| AttemptError::page_setup("session already closed"))?;
        self.page = Some(session.new_page().await?);
        Ok(())
    }

    fn page(&mut self) -> Result<&mut dyn BrowserPage, AttemptError> {
        match self.page.as_deref_mut() {
            Some(page) => Ok(page),
            None => Err(AttemptError::page_setup("page already closed")),
        }
    }

    async fn close_page(&mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }

    async fn close(&mut self) {
        self.close_page().await;
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Failed to close session {}: {}", session.id(), e);
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let page = self.page.take();
        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Attempt dropped; releasing session {} in background", session.id());
                handle.spawn(async move {
                    if let Some(mut page) = page {
                        if let Err(e) = page.close().await {
                            debug!("Background page close failed: {}", e);
                        }
                    }
                    if let Err(e) = session.close().await {
                        warn!("Background close of session {} failed: {}", session.id(), e);
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to release session {}; it will expire by TTL",
                session.id()
            ),
        }
    }
}
