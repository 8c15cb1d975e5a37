use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::exports;

/// Current time in milliseconds, the timestamp unit used across the host
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// How a plugin participates in the host lifecycle
///
/// Script plugins run for their side effects whenever they are enabled and
/// URL-matched. Module plugins are never auto-executed; their exported
/// bindings are retrieved on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Script,
    Module,
}

impl PluginType {
    /// Detect the type from content: an `export` keyword marks a module
    #[must_use]
    pub fn detect(content: &str) -> Self {
        if exports::has_exports(content) {
            PluginType::Module
        } else {
            PluginType::Script
        }
    }
}

impl Default for PluginType {
    fn default() -> Self {
        PluginType::Script
    }
}

/// Metadata parsed from a plugin's header block
///
/// `match` and `grant` accumulate repeated directives in source order; every
/// other directive is a plain string, unknown keys preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    #[serde(rename = "grant", default, skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl PluginMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.icon.is_none()
            && self.matches.is_empty()
            && self.grants.is_empty()
            && self.extra.is_empty()
    }
}

/// A stored plugin record
///
/// This is also the export/import JSON shape: camelCase keys, `id`, `name`,
/// `content`, `enabled` and `allowDelete` required, everything else
/// defaulted on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub enabled: bool,
    pub allow_delete: bool,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: PluginType,
    /// Always the parse of the current `content`; recomputed on every
    /// content change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PluginMetadata>,
    #[serde(default = "now_millis")]
    pub created_at: i64,
    #[serde(default = "now_millis")]
    pub updated_at: i64,
}

impl Plugin {
    /// Match patterns declared in the metadata header, if any
    #[must_use]
    pub fn match_patterns(&self) -> &[String] {
        self.metadata.as_ref().map_or(&[], |m| m.matches.as_slice())
    }
}

/// Payload for creating a plugin; id, timestamps and metadata are assigned
/// by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_delete: bool,
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PluginType>,
}

impl PluginInput {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            icon: None,
            enabled: true,
            allow_delete: true,
            content: content.into(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_allow_delete(mut self, allow_delete: bool) -> Self {
        self.allow_delete = allow_delete;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: PluginType) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_delete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PluginType>,
}

/// Query filters; `id` is exact and short-circuits the other filters,
/// `name` is a case-insensitive substring match against name or description
#[derive(Debug, Clone, Default)]
pub struct PluginQuery {
    pub id: Option<String>,
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

/// Aggregate counts over the current store contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub deletable: usize,
}

/// The fixed positional context bound into every plugin execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub plugin_id: String,
    pub plugin_name: String,
    pub url: String,
    pub timestamp: i64,
}

impl ExecutionContext {
    pub(crate) fn for_plugin(plugin: &Plugin, url: &str) -> Self {
        Self {
            plugin_id: plugin.id.clone(),
            plugin_name: plugin.name.clone(),
            url: url.to_string(),
            timestamp: now_millis(),
        }
    }
}

fn default_true() -> bool {
    true
}
