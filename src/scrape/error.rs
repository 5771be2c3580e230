//! Error types for scrape attempts and the public scrape surface.

use std::fmt;

use thiserror::Error;

/// Provider error code signalling the account has run out of credit.
pub const QUOTA_ERROR_CODE: i64 = 14500;

const INSUFFICIENT_BALANCE: &str = "insufficient balance";

/// Why a single attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptErrorKind {
    SessionCreationFailed,
    QuotaExhausted,
    PageSetupFailed,
    NavigationFailed,
    EmptyContent,
}

impl AttemptErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreationFailed => "session creation failed",
            Self::QuotaExhausted => "quota exhausted",
            Self::PageSetupFailed => "page setup failed",
            Self::NavigationFailed => "navigation failed",
            Self::EmptyContent => "empty content",
        }
    }
}

impl fmt::Display for AttemptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from one session attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AttemptError {
    pub kind: AttemptErrorKind,
    pub message: String,
}

impl AttemptError {
    /// Build an attempt error. Any message mentioning an insufficient balance
    /// is classified as [`AttemptErrorKind::QuotaExhausted`] whatever the
    /// caller's kind, since the provider reports it from several calls.
    pub fn new(kind: AttemptErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_quota_message(&message) {
            AttemptErrorKind::QuotaExhausted
        } else {
            kind
        };
        Self { kind, message }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::SessionCreationFailed, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::QuotaExhausted, message)
    }

    pub fn page_setup(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::PageSetupFailed, message)
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::NavigationFailed, message)
    }

    pub fn empty_content(message: impl Into<String>) -> Self {
        Self::new(AttemptErrorKind::EmptyContent, message)
    }

    /// Whether the fallback chain may continue after this failure.
    pub fn retryable(&self) -> bool {
        self.kind != AttemptErrorKind::QuotaExhausted
    }
}

/// True if a provider message reports an exhausted balance.
pub fn is_quota_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains(INSUFFICIENT_BALANCE)
}

/// Errors returned by [`crate::Scraper`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error("URL is required")]
    EmptyUrl,

    #[error("Invalid URL format: {0}")]
    InvalidUrlFormat(String),

    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

impl ScrapeError {
    /// The attempt failure kind, if this error came from a session attempt.
    pub fn attempt_kind(&self) -> Option<AttemptErrorKind> {
        match self {
            Self::Attempt(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.attempt_kind() == Some(AttemptErrorKind::QuotaExhausted)
    }
}
