//! TLD-based egress country classification.

use std::fmt;

use super::{ProxyEndpoint, ProxyRegistry};
use crate::normalize::NormalizedUrl;

pub const COUNTRY_DE: &str = "DE";
pub const COUNTRY_US: &str = "US";

/// Suffixes routed through the US pool. Unknown TLDs also land in US.
const US_SUFFIXES: &[&str] = &[".com", ".org", ".net", ".us", ".edu", ".gov", ".io"];

/// How a single attempt's browser session reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgressPlan {
    /// No proxy at all.
    Direct,
    /// Provider-managed proxy pool tagged with a country.
    Residential { country: String },
    /// A dedicated-IP endpoint from the registry.
    Dedicated(ProxyEndpoint),
}

impl EgressPlan {
    /// Country this plan egresses from, if any.
    pub fn country(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::Residential { country } => Some(country.as_str()),
            Self::Dedicated(endpoint) => Some(endpoint.country_code.as_str()),
        }
    }
}

impl fmt::Display for EgressPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Residential { country } => write!(f, "residential {}", country),
            Self::Dedicated(endpoint) => write!(f, "dedicated {}", endpoint),
        }
    }
}

/// Classify a lower-cased hostname into an egress country.
///
/// Depends only on the hostname; no DNS or geo-IP lookups.
pub fn classify_host(host: &str) -> &'static str {
    if host.ends_with(".de") || host.contains(".de.") {
        return COUNTRY_DE;
    }

    if US_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        return COUNTRY_US;
    }

    COUNTRY_US
}

/// Pick the preferred egress plan for a URL.
///
/// A dedicated proxy for the classified country wins; otherwise the provider's
/// residential pool is asked for that country. The registry is never consulted
/// for a substitute country here.
pub fn select_route(url: &NormalizedUrl, registry: &ProxyRegistry) -> EgressPlan {
    let country = classify_host(&url.host());

    match registry.get(country) {
        Some(endpoint) => EgressPlan::Dedicated(endpoint.clone()),
        None => EgressPlan::Residential {
            country: country.to_string(),
        },
    }
}
