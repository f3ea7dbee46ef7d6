//! Locating the instance URL in an issue title.
//!
//! The issue template pre-fills the title with a `<searx instance url>`
//! placeholder, which authors sometimes leave next to the real URL. The
//! placeholder is removed first, then two patterns are tried in order:
//!
//! 1. the first non-empty text enclosed in angle brackets (`<...>`)
//! 2. the first run starting with `http://` or `https://`, up to a `>` or
//!    the end of the title

use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\s*searx\s+instance\s+url\s*>").expect("placeholder regex")
    })
}

fn angle_bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>]*)>").expect("angle bracket regex"))
}

fn bare_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://[^>]*").expect("bare url regex"))
}

/// Extracts the candidate instance URL from an issue title.
///
/// Returns `None` if neither pattern matches; the caller must then not try
/// to normalize anything.
///
/// # Examples
///
/// ```
/// use searx_instances_bot::instances::extract_candidate;
///
/// assert_eq!(
///     extract_candidate("Add <searx instance url> <https://foo.bar/>").as_deref(),
///     Some("https://foo.bar/"),
/// );
/// assert_eq!(extract_candidate("Add https://foo.bar").as_deref(), Some("https://foo.bar"));
/// assert_eq!(extract_candidate("Add <searx instance url>"), None);
/// ```
pub fn extract_candidate(title: &str) -> Option<String> {
    let cleaned = placeholder_re().replace_all(title, "");

    let bracketed = angle_bracket_re()
        .captures_iter(&cleaned)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| !s.is_empty());

    if let Some(candidate) = bracketed {
        return Some(candidate.to_string());
    }

    bare_url_re()
        .find(&cleaned)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
