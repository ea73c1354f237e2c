//! Text normalization shared by queries and candidates.

use regex::Regex;
use std::sync::LazyLock;

/// File extension stripped before tokenizing.
const PDF_SUFFIX: &str = ".pdf";

/// Runs of anything that is not an ASCII letter or digit.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator regex"));

/// Reduce free text to lowercase ASCII alphanumeric tokens joined by single spaces.
///
/// Total: `None` normalizes like the empty string, and the result never has
/// leading or trailing separators.
pub fn normalize(text: Option<&str>) -> String {
    let lowered = text.unwrap_or_default().to_lowercase().replace(PDF_SUFFIX, " ");
    SEPARATOR_RE
        .replace_all(&lowered, " ")
        .trim()
        .to_string()
}
