//! Error classification: permanent vs transient.
//!
//! Handlers return plain errors; the classifier maps the rendered message to
//! a kind by scanning for the configured permanent tokens. Matching is
//! case-insensitive and word-boundary ("dismissing" never matches "missing"),
//! and the token set lives in `QueueConfig`, never inline in handlers.

use crate::types::ErrorKind;

/// Classify a handler error message against the configured permanent tokens.
/// Anything that does not match is transient: I/O, timeouts, 5xx-equivalents.
pub fn classify(message: &str, permanent_tokens: &[String]) -> ErrorKind {
    let haystack = message.to_lowercase();
    for token in permanent_tokens {
        if contains_word(&haystack, &token.to_lowercase()) {
            return ErrorKind::Permanent;
        }
    }
    ErrorKind::Transient
}

/// Word-boundary containment: the match must not be flanked by alphanumeric
/// characters. Multi-word tokens ("not found") are matched as a phrase.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let boundary_before = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
        // Step one char forward to keep searching on a UTF-8 boundary
        from = start
            + haystack[start..]
                .chars()
                .next()
                .map_or(1, |c| c.len_utf8());
    }
    false
}
