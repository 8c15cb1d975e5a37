//! Export rewriting for module plugins
//!
//! Module plugins mark their public bindings with a leading `export`
//! keyword, which is not Lua. Before execution the host rewrites the source
//! into plain Lua that fills a capture table named `__exports`:
//!
//! - `export default <expr>` becomes `__exports["default"] = <expr>`
//! - `export local x = ...` and `export function f(...)` keep their
//!   declaration (minus the keyword) and have `__exports["<name>"] = <name>`
//!   appended after the source, where top-level bindings are still in scope
//! - `export { a, b as c }` becomes one capture assignment per entry,
//!   supporting the `local as exported` rename form
//!
//! The pass is a single line-oriented scan; declarations spanning several
//! lines survive because captures are appended at the end. Re-exports and
//! nested brace lists are not recognized and pass through unchanged.

use regex::Regex;
use std::sync::LazyLock;

static EXPORT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bexport\b").unwrap());

/// Whether the source contains the `export` keyword at all
///
/// Used both for plugin type detection and as the cheap gate that lets
/// extraction return an empty map without executing anything.
#[must_use]
pub fn has_exports(content: &str) -> bool {
    EXPORT_KEYWORD_RE.is_match(content)
}

/// Rewrite `export` statements into `__exports` capture assignments
#[must_use]
pub fn rewrite(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 64);
    let mut captured: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];

        let Some(statement) = export_statement(trimmed) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let rest = statement.trim_start();
        if let Some(expr) = default_expression(rest) {
            out.push_str(indent);
            out.push_str("__exports[\"default\"] = ");
            out.push_str(expr.trim());
            out.push('\n');
            continue;
        }

        if let Some(entries) = brace_list(rest) {
            for (local, exported) in entries {
                out.push_str(indent);
                out.push_str(&format!("__exports[\"{exported}\"] = {local}\n"));
            }
            continue;
        }

        if let Some(name) = declared_name(rest) {
            captured.push(name.to_string());
            out.push_str(indent);
            out.push_str(rest);
            out.push('\n');
            continue;
        }

        // Unrecognized export shape: leave the line alone
        out.push_str(line);
        out.push('\n');
    }

    for name in captured {
        out.push_str(&format!("__exports[\"{name}\"] = {name}\n"));
    }

    out
}

/// The remainder of a line that starts with the `export` keyword
fn export_statement(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("export")?;
    if rest.starts_with(char::is_whitespace) || rest.starts_with('{') {
        Some(rest)
    } else {
        None
    }
}

/// The expression of an `export default <expr>` statement
fn default_expression(rest: &str) -> Option<&str> {
    let expr = rest.strip_prefix("default")?;
    expr.starts_with(char::is_whitespace).then_some(expr)
}

/// Entries of an `export { a, b as c }` list as (local, exported) pairs
fn brace_list(rest: &str) -> Option<Vec<(&str, &str)>> {
    let inner = rest.strip_prefix('{')?;
    let inner = &inner[..inner.find('}')?];

    let mut entries = Vec::new();
    for entry in inner.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(" as ") {
            Some((local, exported)) => entries.push((local.trim(), exported.trim())),
            None => entries.push((entry, entry)),
        }
    }
    Some(entries)
}

/// The bound name of an exported declaration
fn declared_name(decl: &str) -> Option<&str> {
    let after_keyword = decl
        .strip_prefix("local function ")
        .or_else(|| decl.strip_prefix("function "))
        .or_else(|| decl.strip_prefix("local "))?;

    let after_keyword = after_keyword.trim_start();
    let end = after_keyword
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after_keyword.len());
    let name = &after_keyword[..end];

    let starts_like_identifier = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_like_identifier.then_some(name)
}
