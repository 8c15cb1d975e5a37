//! Plugin header parsing
//!
//! Plugins declare metadata in a comment block at the top of their source:
//!
//! ```lua
//! -- ==Plugin==
//! -- @name         Greeter
//! -- @description  Greets every matched page
//! -- @match        https://example.com/*
//! -- @grant        none
//! -- ==/Plugin==
//! ```
//!
//! Directive keys are lower-cased; `match` and `grant` accumulate across
//! repeated lines, all other keys keep their last occurrence. Lines that are
//! not directives are ignored.

use regex::Regex;
use std::sync::LazyLock;

use crate::plugin::PluginMetadata;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)--\s*==Plugin==(.*?)--\s*==/Plugin==").unwrap());

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*--\s*@(\w+)\s+(.+)$").unwrap());

/// Parse the header block out of plugin source text
///
/// Content without a complete header block yields empty metadata; this is
/// not an error, plugins are free to omit the header entirely.
#[must_use]
pub fn parse(content: &str) -> PluginMetadata {
    let mut metadata = PluginMetadata::default();

    let Some(captures) = HEADER_RE.captures(content) else {
        return metadata;
    };

    for line in captures[1].lines() {
        let Some(directive) = DIRECTIVE_RE.captures(line) else {
            continue;
        };
        let key = directive[1].to_lowercase();
        let value = directive[2].trim().to_string();

        match key.as_str() {
            "name" => metadata.name = Some(value),
            "description" => metadata.description = Some(value),
            "icon" => metadata.icon = Some(value),
            "match" => metadata.matches.push(value),
            "grant" => metadata.grants.push(value),
            _ => {
                metadata.extra.insert(key, value);
            }
        }
    }

    metadata
}
