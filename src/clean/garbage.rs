use std::sync::LazyLock;

use regex::Regex;

/// Short lowercase words joined by bare commas: the residue left when a
/// selector captures a stylesheet's tag list (`a,abbr,acronym,...`). Either the
/// whole text is such a list, or it opens with a run of three or more.
static TAG_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{1,10}(?:,[a-z]{1,10})+$|^[a-z]{1,10}(?:,[a-z]{1,10}){2,}\b").unwrap()
});

const MAX_LEN: usize = 100;
const MAX_COMMAS: usize = 5;

/// Whether a location candidate is markup residue rather than a place.
///
/// The empty string is not garbage: it is simply a missing value. The verdict
/// depends only on the trimmed text, so the heuristic extraction strategy and
/// the batch cleaning pass agree on every input.
pub fn is_garbage(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    TAG_LIST_RE.is_match(text)
        || text.chars().count() > MAX_LEN
        || text.matches(',').count() > MAX_COMMAS
        || text.chars().any(|c| !is_allowed(c))
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '-' | ',' | '.' | '(' | ')')
}

/// Trimmed text, or empty when the text is garbage. Never salvages part of a
/// garbage value.
pub fn clean_location(text: &str) -> String {
    if is_garbage(text) {
        String::new()
    } else {
        text.trim().to_string()
    }
}
