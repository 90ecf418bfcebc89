//! Text normalization applied before classification
//!
//! Posts are flattened to a single line with links removed, which is both
//! what the classifier was trained on and what the one-line-per-request
//! subprocess protocol requires.

use regex::Regex;
use std::sync::LazyLock;

/// URL-shaped tokens, up to the next whitespace
static LINKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://|(?:gist\.)?github\.com/)\S+").expect("valid link pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Normalize raw post text
///
/// Removes `http(s)://…`, `github.com/…` and `gist.github.com/…` tokens,
/// collapses whitespace (newlines included) to single spaces and trims.
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let stripped = LINKS.replace_all(text, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}
