//! In-memory browser provider for driving the scraper without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use egress_scraper::browser::{NavigationResponse, ProxyDirective, Viewport};
use egress_scraper::{
    AttemptError, BrowserPage, BrowserProvider, BrowserSession, ProxyRegistry, Scraper,
    SessionRequest, SessionSettings,
};

/// What one session does when driven.
#[derive(Debug, Clone)]
pub enum Script {
    /// Session creation itself fails.
    FailOpen(AttemptError),
    FailNewPage,
    FailConfigure,
    FailNavigate(String),
    /// Navigation completes without a document response.
    NoResponse,
    /// Navigation never completes.
    HangNavigate,
    /// Document comes back shorter than the minimum length.
    ShortHtml,
    Succeed {
        status: u16,
        html: String,
        title: Option<String>,
    },
}

impl Script {
    pub fn ok(html: impl Into<String>) -> Self {
        Self::Succeed {
            status: 200,
            html: html.into(),
            title: Some("Browser Title".to_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Provider that plays back one [`Script`] per session request.
pub struct MockProvider {
    scripts: Mutex<VecDeque<Script>>,
    pub counters: Arc<Counters>,
    requests: Mutex<Vec<SessionRequest>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            counters: Arc::new(Counters::default()),
            requests: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Proxy directives in request order.
    pub fn proxies(&self) -> Vec<Option<ProxyDirective>> {
        self.requests().into_iter().map(|r| r.proxy).collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        Counters::get(&self.counters.sessions_opened)
    }

    pub fn closed(&self) -> usize {
        Counters::get(&self.counters.sessions_closed)
    }

    pub fn pages_opened(&self) -> usize {
        Counters::get(&self.counters.pages_opened)
    }

    pub fn pages_closed(&self) -> usize {
        Counters::get(&self.counters.pages_closed)
    }
}

#[async_trait]
impl BrowserProvider for MockProvider {
    async fn open_session(
        &self,
        request: &SessionRequest,
    ) -> Result<Box<dyn BrowserSession>, AttemptError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::FailNavigate("unscripted attempt".to_string()));

        if let Script::FailOpen(err) = script {
            return Err(err);
        }

        let index = self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            id: format!("mock-{}", index),
            script,
            counters: self.counters.clone(),
            events: self.events.clone(),
        }))
    }
}

struct MockSession {
    id: String,
    script: Script,
    counters: Arc<Counters>,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BrowserSession for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&mut self) -> Result<Box<dyn BrowserPage>, AttemptError> {
        if matches!(self.script, Script::FailNewPage) {
            return Err(AttemptError::page_setup("target crashed"));
        }
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            session_id: self.id.clone(),
            script: self.script.clone(),
            counters: self.counters.clone(),
            events: self.events.clone(),
        }))
    }

    async fn close(&mut self) -> Result<(), AttemptError> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("{} session closed", self.id));
        Ok(())
    }
}

struct MockPage {
    session_id: String,
    script: Script,
    counters: Arc<Counters>,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn configure(
        &mut self,
        viewport: Viewport,
        user_agent: &str,
    ) -> Result<(), AttemptError> {
        assert_eq!(
            viewport,
            Viewport {
                width: 1920,
                height: 1080
            }
        );
        assert!(user_agent.contains("Mozilla/5.0"));
        match self.script {
            Script::FailConfigure => Err(AttemptError::page_setup("viewport rejected")),
            _ => Ok(()),
        }
    }

    async fn navigate(&mut self, url: &str) -> Result<Option<NavigationResponse>, AttemptError> {
        match &self.script {
            Script::FailNavigate(message) => Err(AttemptError::navigation(message.clone())),
            Script::NoResponse => Ok(None),
            Script::HangNavigate => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
            Script::Succeed { status, .. } => Ok(Some(NavigationResponse {
                status: *status,
                url: url.to_string(),
            })),
            _ => Ok(Some(NavigationResponse {
                status: 200,
                url: url.to_string(),
            })),
        }
    }

    async fn content(&mut self) -> Result<String, AttemptError> {
        match &self.script {
            Script::Succeed { html, .. } => Ok(html.clone()),
            Script::ShortHtml => Ok("<html></html>".to_string()),
            _ => Ok(String::new()),
        }
    }

    async fn title(&mut self) -> Option<String> {
        match &self.script {
            Script::Succeed { title, .. } => title.clone(),
            _ => None,
        }
    }

    async fn meta_description(&mut self) -> Option<String> {
        None
    }

    async fn current_url(&mut self) -> Option<String> {
        None
    }

    async fn close(&mut self) -> Result<(), AttemptError> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("{} page closed", self.session_id));
        Ok(())
    }
}

/// Session settings with no settle delay.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        settle_ms: 0,
        ..SessionSettings::default()
    }
}

pub fn registry(entries: &[(&str, &str)]) -> Arc<ProxyRegistry> {
    Arc::new(ProxyRegistry::load_from_env(entries.iter().copied()))
}

pub fn scraper(provider: &Arc<MockProvider>, entries: &[(&str, &str)]) -> Scraper {
    Scraper::new(provider.clone(), registry(entries), fast_settings())
}

/// A document comfortably above the minimum HTML length.
pub fn page_html(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><title>{}</title>\
         <meta name=\"description\" content=\"About {}\"></head>\
         <body><h1>{}</h1><p>{}</p><p>{}</p></body></html>",
        title,
        title,
        title,
        body,
        "filler ".repeat(20)
    )
}
