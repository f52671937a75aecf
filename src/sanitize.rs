//! Inbound text sanitizer
//!
//! Removes every markup tag (empty allow-list) and strips any leftover
//! angle brackets instead of escaping them. Never fails.

use std::sync::LazyLock;

use regex::Regex;

/// Comments, doctypes, and tags, including unterminated quoted attributes
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|</?[A-Za-z!/?][^<>]*>"#).expect("tag pattern is valid")
});

/// Strip all markup from a chat payload
///
/// The result never contains `<` or `>`, so sanitizing twice is a no-op.
pub fn sanitize(input: &str) -> String {
    let without_tags = TAG.replace_all(input, "");
    without_tags.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}
