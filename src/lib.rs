//! egress-scraper - rendered-HTML capture through remote headless browsers.
//!
//! A scrape runs a short, ordered chain of egress strategies against a remote
//! browser provider: the preferred route for the URL's country (dedicated proxy
//! or residential pool), an optional DE→US corridor fallback, and finally a
//! direct connection. The captured document can be turned into markdown,
//! metadata, or a simple existence probe.

pub mod browser;
pub mod config;
pub mod content;
pub mod normalize;
pub mod proxy;
pub mod scrape;

pub use browser::{BrowserPage, BrowserProvider, BrowserSession, SessionRequest};
pub use config::{ProviderConfig, SessionSettings, Settings};
pub use normalize::{normalize, NormalizedUrl};
pub use proxy::{select_route, EgressPlan, ProxyEndpoint, ProxyRegistry};
pub use scrape::{
    plan_chain, AttemptError, AttemptErrorKind, AttemptOutcome, ExistenceCheck, PageMetadata,
    PlannedAttempt, ScrapeError, ScrapeResult, ScrapeStats, Scraper, Strategy,
};
