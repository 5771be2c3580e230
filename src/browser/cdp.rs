//! CDP-backed session and page over chromiumoxide.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::remote::{SessionApi, SessionInfo};
use super::{BrowserPage, BrowserSession, NavigationResponse, Viewport};
use crate::scrape::AttemptError;

pub(crate) struct CdpSession {
    api: Arc<SessionApi>,
    id: String,
    remote_id: Option<String>,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl CdpSession {
    pub(crate) async fn connect(
        api: Arc<SessionApi>,
        info: &SessionInfo,
        session_name: &str,
        request_timeout: Duration,
    ) -> Result<Self, AttemptError> {
        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout,
            ..Default::default()
        };

        let (browser, mut handler) =
            Browser::connect_with_config(info.ws_endpoint.as_str(), handler_config)
                .await
                .map_err(|e| {
                    AttemptError::session(format!("Failed to connect to remote browser: {}", e))
                })?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let id = info.id.clone().unwrap_or_else(|| session_name.to_string());
        info!("Connected to session {}", id);

        Ok(Self {
            api,
            id,
            remote_id: info.id.clone(),
            browser: Some(browser),
            handler: Some(handler),
        })
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&mut self) -> Result<Box<dyn BrowserPage>, AttemptError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| AttemptError::page_setup("session already closed"))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AttemptError::page_setup(format!("Failed to open page: {}", e)))?;

        Ok(Box::new(CdpPage { page: Some(page) }))
    }

    async fn close(&mut self) -> Result<(), AttemptError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            debug!("Browser close for session {} failed: {}", self.id, e);
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        match self.remote_id.take() {
            Some(remote_id) => self.api.release_session(&remote_id).await,
            None => {
                warn!("Session {} has no provider id; relying on TTL expiry", self.id);
                Ok(())
            }
        }
    }
}

pub(crate) struct CdpPage {
    page: Option<Page>,
}

impl CdpPage {
    fn page(&self) -> Result<&Page, AttemptError> {
        self.page
            .as_ref()
            .ok_or_else(|| AttemptError::page_setup("page already closed"))
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn configure(
        &mut self,
        viewport: Viewport,
        user_agent: &str,
    ) -> Result<(), AttemptError> {
        let page = self.page()?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| AttemptError::page_setup(format!("Failed to set viewport: {}", e)))?;

        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(|e| AttemptError::page_setup(format!("Failed to set user agent: {}", e)))?;

        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<Option<NavigationResponse>, AttemptError> {
        let page = self.page()?;
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| AttemptError::navigation(format!("Invalid URL: {}", e)))?;

        let failed = |e: chromiumoxide::error::CdpError| {
            AttemptError::navigation(format!("Navigation failed for {}: {}", url, e))
        };

        let result = page.execute(nav_params).await.map_err(failed)?;

        if let Some(error_text) = result.result.error_text.as_ref() {
            return Err(AttemptError::navigation(format!(
                "Navigation failed for {}: {}",
                url, error_text
            )));
        }

        let request = page.wait_for_navigation_response().await.map_err(failed)?;

        request
            .and_then(|req| req.response.clone())
            .map(|response| NavigationResponse::from_raw(response.status, response.url))
            .transpose()
    }

    async fn content(&mut self) -> Result<String, AttemptError> {
        self.page()?
            .content()
            .await
            .map_err(|e| {
                AttemptError::empty_content(format!("Failed to read page content: {}", e))
            })
    }

    async fn title(&mut self) -> Option<String> {
        let page = self.page().ok()?;
        page.get_title().await.ok().flatten()
    }

    async fn meta_description(&mut self) -> Option<String> {
        let page = self.page().ok()?;
        let element = page.find_element("meta[name=\"description\"]").await.ok()?;
        element.attribute("content").await.ok().flatten()
    }

    async fn current_url(&mut self) -> Option<String> {
        let page = self.page().ok()?;
        page.url().await.ok().flatten()
    }

    async fn close(&mut self) -> Result<(), AttemptError> {
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| AttemptError::page_setup(format!("Failed to close page: {}", e))),
            None => Ok(()),
        }
    }
}
