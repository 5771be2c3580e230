//! Scrape orchestration: the ordered egress fallback chain.

mod attempt;
pub mod error;

pub use attempt::{run_attempt, AttemptOutcome, CapturedPage};

use attempt::run_attempt_counted;
pub use error::{AttemptError, AttemptErrorKind, ScrapeError};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{BrowserProvider, RemoteBrowserProvider};
use crate::config::{ConfigError, SessionSettings, Settings};
use crate::content::to_markdown;
use crate::normalize::{normalize, NormalizedUrl};
use crate::proxy::{
    classify_host, select_route, EgressPlan, ProxyRegistry, COUNTRY_DE, COUNTRY_US,
};

/// Position of an attempt in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Route chosen for the URL's own country.
    Preferred,
    /// DE target retried through the US dedicated proxy.
    Corridor,
    /// No proxy.
    Baseline,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Corridor => "corridor",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttempt {
    pub strategy: Strategy,
    pub plan: EgressPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub status_code: u16,
}

/// A successful scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeResult {
    pub html: String,
    pub metadata: PageMetadata,
    /// Which step of the chain produced the document.
    pub strategy: Strategy,
}

/// Outcome of [`Scraper::check_exists`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Counters since the scraper was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeStats {
    pub scrapes: u64,
    pub attempts: u64,
    pub sessions_opened: u64,
    pub successes: u64,
    pub rejected_inputs: u64,
    pub quota_aborts: u64,
    pub proxy_countries: Vec<String>,
}

#[derive(Default)]
struct Counters {
    scrapes: AtomicU64,
    attempts: AtomicU64,
    sessions_opened: AtomicU64,
    successes: AtomicU64,
    rejected_inputs: AtomicU64,
    quota_aborts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ordered attempts for `url`.
///
/// The corridor step only exists for DE targets when a US dedicated proxy is
/// registered. The baseline step is always last.
pub fn plan_chain(url: &NormalizedUrl, registry: &ProxyRegistry) -> Vec<PlannedAttempt> {
    let mut chain = vec![PlannedAttempt {
        strategy: Strategy::Preferred,
        plan: select_route(url, registry),
    }];

    if classify_host(&url.host()) == COUNTRY_DE {
        if let Some(us) = registry.get(COUNTRY_US) {
            chain.push(PlannedAttempt {
                strategy: Strategy::Corridor,
                plan: EgressPlan::Dedicated(us.clone()),
            });
        }
    }

    chain.push(PlannedAttempt {
        strategy: Strategy::Baseline,
        plan: EgressPlan::Direct,
    });
    chain
}

/// Runs scrapes through the egress fallback chain.
///
/// Cheap to share behind an `Arc`; concurrent scrapes only share the
/// read-only proxy registry and the counters.
pub struct Scraper {
    provider: Arc<dyn BrowserProvider>,
    registry: Arc<ProxyRegistry>,
    settings: SessionSettings,
    counters: Counters,
}

impl Scraper {
    pub fn new(
        provider: Arc<dyn BrowserProvider>,
        registry: Arc<ProxyRegistry>,
        settings: SessionSettings,
    ) -> Self {
        info!("Scraper ready with {} dedicated proxies", registry.len());
        Self {
            provider,
            registry,
            settings,
            counters: Counters::default(),
        }
    }

    /// Build a scraper backed by the remote provider.
    pub fn from_settings(
        settings: &Settings,
        registry: Arc<ProxyRegistry>,
    ) -> Result<Self, ConfigError> {
        let provider = RemoteBrowserProvider::new(&settings.provider)?;
        Ok(Self::new(
            Arc::new(provider),
            registry,
            settings.session.clone(),
        ))
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    /// The attempts a scrape of `url` would make, in order.
    pub fn plan_chain(&self, url: &NormalizedUrl) -> Vec<PlannedAttempt> {
        plan_chain(url, &self.registry)
    }

    /// Fetch the rendered HTML and metadata of `raw_url`.
    pub async fn scrape(&self, raw_url: &str) -> Result<ScrapeResult, ScrapeError> {
        Counters::bump(&self.counters.scrapes);

        let url = normalize(raw_url).inspect_err(|_| {
            Counters::bump(&self.counters.rejected_inputs);
        })?;

        let chain = self.plan_chain(&url);
        let total = chain.len();
        let mut last_error: Option<AttemptError> = None;

        for (index, step) in chain.into_iter().enumerate() {
            info!(
                "Attempt {}/{} for {}: {} via {}",
                index + 1,
                total,
                url,
                step.strategy,
                step.plan
            );
            Counters::bump(&self.counters.attempts);

            let outcome = run_attempt_counted(
                self.provider.as_ref(),
                &self.settings,
                &url,
                &step.plan,
                &self.counters.sessions_opened,
            )
            .await;

            match outcome {
                AttemptOutcome::Captured(page) => {
                    Counters::bump(&self.counters.successes);
                    info!("Captured {} via {}", url, step.strategy);
                    return Ok(ScrapeResult {
                        html: page.html,
                        metadata: PageMetadata {
                            title: page.title,
                            description: page.description,
                            url: page.url,
                            status_code: page.status_code,
                        },
                        strategy: step.strategy,
                    });
                }
                AttemptOutcome::Failed(err) if !err.retryable() => {
                    Counters::bump(&self.counters.quota_aborts);
                    warn!("Aborting scrape of {}: {}", url, err);
                    return Err(err.into());
                }
                AttemptOutcome::Failed(err) => {
                    warn!("{} attempt for {} failed: {}", step.strategy, url, err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AttemptError::session("no scrape strategy available"))
            .into())
    }

    /// Scrape `raw_url` and return its content as trimmed markdown.
    pub async fn scrape_markdown(&self, raw_url: &str) -> Result<String, ScrapeError> {
        let result = self.scrape(raw_url).await?;
        Ok(to_markdown(&result.html).trim().to_string())
    }

    /// Probe whether `raw_url` serves a document with HTTP 200.
    ///
    /// Never fails: any error reads as a 404.
    pub async fn check_exists(&self, raw_url: &str) -> ExistenceCheck {
        match self.scrape(raw_url).await {
            Ok(result) => ExistenceCheck {
                exists: result.metadata.status_code == 200,
                content: Some(result.html),
                status_code: Some(result.metadata.status_code),
            },
            Err(e) => {
                info!("Existence check for {} failed: {}", raw_url, e);
                ExistenceCheck {
                    exists: false,
                    content: None,
                    status_code: Some(404),
                }
            }
        }
    }

    pub fn stats(&self) -> ScrapeStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ScrapeStats {
            scrapes: load(&self.counters.scrapes),
            attempts: load(&self.counters.attempts),
            sessions_opened: load(&self.counters.sessions_opened),
            successes: load(&self.counters.successes),
            rejected_inputs: load(&self.counters.rejected_inputs),
            quota_aborts: load(&self.counters.quota_aborts),
            proxy_countries: self.registry.countries(),
        }
    }
}
