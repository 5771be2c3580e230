//! Best-effort HTML to markdown conversion.

use std::sync::LazyLock;

use regex::Regex;

/// Rewrite rules applied in order. Earlier rules shape what later rules see,
/// e.g. `<br>` must be gone before the `<b>` rule runs.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap(), ""),
        (Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap(), ""),
        (Regex::new(r"(?i)<h1[^>]*>(.*?)</h1>").unwrap(), "# ${1}\n\n"),
        (Regex::new(r"(?i)<h2[^>]*>(.*?)</h2>").unwrap(), "## ${1}\n\n"),
        (Regex::new(r"(?i)<h3[^>]*>(.*?)</h3>").unwrap(), "### ${1}\n\n"),
        (Regex::new(r"(?i)<h4[^>]*>(.*?)</h4>").unwrap(), "#### ${1}\n\n"),
        (Regex::new(r"(?i)<h5[^>]*>(.*?)</h5>").unwrap(), "##### ${1}\n\n"),
        (Regex::new(r"(?i)<h6[^>]*>(.*?)</h6>").unwrap(), "###### ${1}\n\n"),
        (Regex::new(r"(?i)<p[^>]*>(.*?)</p>").unwrap(), "${1}\n\n"),
        (Regex::new(r"(?i)<br\s*/?>").unwrap(), "\n"),
        (Regex::new(r"(?i)<strong[^>]*>(.*?)</strong>").unwrap(), "**${1}**"),
        (Regex::new(r"(?i)<b[^>]*>(.*?)</b>").unwrap(), "**${1}**"),
        (Regex::new(r"(?i)<em[^>]*>(.*?)</em>").unwrap(), "*${1}*"),
        (Regex::new(r"(?i)<i[^>]*>(.*?)</i>").unwrap(), "*${1}*"),
        (
            Regex::new(r#"(?i)<a[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap(),
            "[${2}](${1})",
        ),
        (Regex::new(r"(?i)<ul[^>]*>(.*?)</ul>").unwrap(), "${1}"),
        (Regex::new(r"(?i)<ol[^>]*>(.*?)</ol>").unwrap(), "${1}"),
        (Regex::new(r"(?i)<li[^>]*>(.*?)</li>").unwrap(), "- ${1}\n"),
        (Regex::new(r"<[^>]+>").unwrap(), ""),
        (Regex::new(r"\n\s*\n\s*\n").unwrap(), "\n\n"),
    ]
});

/// Convert HTML into lightweight markdown.
///
/// Lossy: inline elements spanning lines are not converted and whatever tags
/// remain are stripped. Output is not trimmed.
pub fn to_markdown(html: &str) -> String {
    RULES
        .iter()
        .fold(html.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        })
}
