//! Transformations over captured HTML.

mod markdown;
mod metadata;
mod widgets;

pub use markdown::to_markdown;
pub use metadata::{extract_description, extract_title};
pub use widgets::{detect_widgets, WidgetDetection, WidgetScript, KNOWN_WIDGET_URLS};
