//! URL validation and canonicalization for user-supplied input.

use std::fmt;

use url::Url;

use crate::scrape::ScrapeError;

/// An absolute `http`/`https` URL in its canonical serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lower-cased host, or an empty string for host-less URLs.
    pub fn host(&self) -> String {
        self.0
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Normalize raw user input into an absolute URL.
///
/// Input is trimmed, given an `https://` scheme when it has neither `http://`
/// nor `https://`, then parsed. The original input is carried in the error so
/// callers can report exactly what was rejected.
pub fn normalize(input: &str) -> Result<NormalizedUrl, ScrapeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScrapeError::EmptyUrl);
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed =
        Url::parse(&candidate).map_err(|_| ScrapeError::InvalidUrlFormat(input.to_string()))?;

    // Special schemes always carry a host, but the output must be usable for routing
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::InvalidUrlFormat(input.to_string()));
    }

    Ok(NormalizedUrl(parsed))
}
