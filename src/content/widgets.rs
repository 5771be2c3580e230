//! Detection of third-party accessibility widget scripts.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Known hosted widget bundles.
pub const KNOWN_WIDGET_URLS: &[&str] = &[
    "https://widget.access-widget.com/widget.min.js",
    "https://widget.webability.io/widget.min.js",
    "https://widget-v2.webability.io/widget.min.js",
];

const GENERIC_WIDGET_FILE: &str = "widget.min.js";

static SCRIPT_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script[^>]*src=["']([^"']+)["'][^>]*>"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetScript {
    pub url: String,
    /// The src contains one of [`KNOWN_WIDGET_URLS`].
    pub is_exact_match: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WidgetDetection {
    pub found: bool,
    pub scripts: Vec<WidgetScript>,
}

/// List widget `<script src>` values in document order, one entry per tag.
pub fn detect_widgets(html: &str) -> WidgetDetection {
    let scripts: Vec<WidgetScript> = SCRIPT_SRC
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|src| src.as_str())
        .filter_map(|src| {
            let is_exact_match = KNOWN_WIDGET_URLS.iter().any(|known| src.contains(known));
            (is_exact_match || src.contains(GENERIC_WIDGET_FILE)).then(|| WidgetScript {
                url: src.to_string(),
                is_exact_match,
            })
        })
        .collect();

    WidgetDetection {
        found: !scripts.is_empty(),
        scripts,
    }
}
