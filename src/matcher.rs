//! Wildcard URL matching for `@match` rules
//!
//! Patterns are literal URLs with two wildcards: `*` matches any run of
//! characters except `/`, `**` matches any run including `/`. A pattern is
//! anchored at the start unless it begins with `*` and at the end unless it
//! ends with `*`.

use regex::Regex;
use tracing::warn;

/// Check a URL against a set of match patterns
///
/// An empty pattern set matches everything; otherwise any single matching
/// pattern is enough. A pattern that fails to compile is logged and skipped
/// without affecting the remaining patterns.
#[must_use]
pub fn matches(patterns: &[String], url: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }

    patterns
        .iter()
        .any(|pattern| compile(pattern).is_some_and(|re| re.is_match(url)))
}

/// Compile one wildcard pattern into a regex
fn compile(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*");

    let mut source = String::with_capacity(escaped.len() + 2);
    if !pattern.starts_with('*') {
        source.push('^');
    }
    source.push_str(&escaped);
    if !pattern.ends_with('*') {
        source.push('$');
    }

    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("invalid match pattern {pattern:?}: {e}");
            None
        }
    }
}
