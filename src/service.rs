//! Plugin business rules
//!
//! The service sits between the facade and the store: it validates input,
//! keeps metadata in sync with content, assigns identity, and orchestrates
//! persistence around every write path. Persistence is best-effort; a failed
//! save is logged and never rolled back.

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::PluginError;
use crate::matcher;
use crate::metadata;
use crate::plugin::{
    now_millis, ExecutionContext, Plugin, PluginInput, PluginQuery, PluginStats, PluginType,
    PluginUpdate,
};
use crate::sandbox::{ExportMap, Sandbox};
use crate::storage::Storage;
use crate::store::PluginStore;

/// Partition of a batch operation into per-item outcomes
#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

// Manual impl avoids the `T: Default` bound the derive would add; the struct
// only holds `Vec`s, which default to empty regardless of `T`.
impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// One failed item of a batch operation
#[derive(Debug)]
pub struct BatchFailure {
    /// Plugin id, or the input name when no id exists yet
    pub subject: String,
    pub error: PluginError,
}

/// Outcome of an import; malformed payloads yield the empty default
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Validation, identity and persistence around the plugin store
pub struct PluginService {
    store: PluginStore,
    storage: Box<dyn Storage>,
    sandbox: Sandbox,
}

impl PluginService {
    pub fn new(storage: Box<dyn Storage>) -> Result<Self, PluginError> {
        Ok(Self {
            store: PluginStore::new(),
            storage,
            sandbox: Sandbox::new()?,
        })
    }

    /// Load the persisted collection into the store
    pub fn init(&mut self) {
        let stored = self.storage.load();
        if !stored.is_empty() {
            debug!("loaded {} persisted plugins", stored.len());
            self.store.replace(stored);
        }
    }

    pub fn store_mut(&mut self) -> &mut PluginStore {
        &mut self.store
    }

    /// Create a plugin from user input
    ///
    /// Metadata-declared `name`, `description` and `icon` override the
    /// input's fields; the type is detected from content unless supplied.
    pub fn add(&mut self, input: PluginInput) -> Result<Plugin, PluginError> {
        validate_content(&input.content)?;

        let parsed = metadata::parse(&input.content);
        let now = now_millis();
        let plugin = Plugin {
            id: Uuid::new_v4().to_string(),
            name: parsed.name.clone().unwrap_or(input.name),
            description: parsed.description.clone().unwrap_or(input.description),
            icon: parsed.icon.clone().or(input.icon),
            enabled: input.enabled,
            allow_delete: input.allow_delete,
            kind: input.kind.unwrap_or_else(|| PluginType::detect(&input.content)),
            content: input.content,
            metadata: Some(parsed),
            created_at: now,
            updated_at: now,
        };

        self.store.push(plugin.clone());
        self.persist();
        Ok(plugin)
    }

    /// Insert a full plugin record, keeping its id and timestamps
    ///
    /// This is the import path: content is re-validated and metadata
    /// recomputed, but identity is preserved so an exported collection
    /// round-trips onto an empty store.
    pub fn insert_existing(&mut self, mut plugin: Plugin) -> Result<Plugin, PluginError> {
        validate_content(&plugin.content)?;
        if plugin.id.trim().is_empty() {
            return Err(PluginError::Invalid("plugin id is empty".to_string()));
        }
        if self.store.get(&plugin.id).is_some() {
            return Err(PluginError::Invalid(format!(
                "duplicate plugin id: {}",
                plugin.id
            )));
        }

        plugin.metadata = Some(metadata::parse(&plugin.content));
        if plugin.updated_at < plugin.created_at {
            plugin.updated_at = plugin.created_at;
        }

        self.store.push(plugin.clone());
        self.persist();
        Ok(plugin)
    }

    /// Apply a partial update
    ///
    /// A content change re-validates, re-parses metadata (whose
    /// `name`/`description`/`icon` again win over the patch) and re-detects
    /// the type unless the patch pins one.
    pub fn update(&mut self, id: &str, patch: PluginUpdate) -> Result<Plugin, PluginError> {
        if self.store.get(id).is_none() {
            return Err(PluginError::NotFound(id.to_string()));
        }

        let mut patch = patch;
        let mut parsed = None;
        if let Some(content) = &patch.content {
            validate_content(content)?;
            let meta = metadata::parse(content);
            if meta.name.is_some() {
                patch.name = meta.name.clone();
            }
            if meta.description.is_some() {
                patch.description = meta.description.clone();
            }
            if meta.icon.is_some() {
                patch.icon = meta.icon.clone();
            }
            if patch.kind.is_none() {
                patch.kind = Some(PluginType::detect(content));
            }
            parsed = Some(meta);
        }

        self.store.patch(id, move |plugin| {
            if let Some(name) = patch.name {
                plugin.name = name;
            }
            if let Some(description) = patch.description {
                plugin.description = description;
            }
            if let Some(icon) = patch.icon {
                plugin.icon = Some(icon);
            }
            if let Some(enabled) = patch.enabled {
                plugin.enabled = enabled;
            }
            if let Some(allow_delete) = patch.allow_delete {
                plugin.allow_delete = allow_delete;
            }
            if let Some(kind) = patch.kind {
                plugin.kind = kind;
            }
            if let Some(content) = patch.content {
                plugin.content = content;
                plugin.metadata = parsed;
            }
        });

        self.persist();
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(id.to_string()))
    }

    /// Remove a plugin, unless it is protected
    pub fn delete(&mut self, id: &str) -> Result<Plugin, PluginError> {
        let plugin = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        if !plugin.allow_delete {
            return Err(PluginError::DeleteForbidden(id.to_string()));
        }

        self.store.remove(id);
        self.persist();
        Ok(plugin)
    }

    /// Flip the enabled flag without touching content or metadata
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<Plugin, PluginError> {
        if !self.store.patch(id, |plugin| plugin.enabled = enabled) {
            return Err(PluginError::NotFound(id.to_string()));
        }
        self.persist();
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(id.to_string()))
    }

    /// Toggle the enabled flag, returning the new state
    pub fn toggle(&mut self, id: &str) -> Result<bool, PluginError> {
        let enabled = self
            .store
            .get(id)
            .map(|plugin| plugin.enabled)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        self.set_enabled(id, !enabled)?;
        Ok(!enabled)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Plugin> {
        self.store.get(id).cloned()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Plugin> {
        self.store.snapshot().to_vec()
    }

    /// Filtered view of the store; an `id` filter short-circuits the rest
    #[must_use]
    pub fn query(&self, query: &PluginQuery) -> Vec<Plugin> {
        let plugins = self.store.snapshot();

        if let Some(id) = &query.id {
            return plugins.iter().filter(|p| &p.id == id).cloned().collect();
        }

        plugins
            .iter()
            .filter(|plugin| {
                if let Some(needle) = &query.name {
                    let needle = needle.to_lowercase();
                    if !plugin.name.to_lowercase().contains(&needle)
                        && !plugin.description.to_lowercase().contains(&needle)
                    {
                        return false;
                    }
                }
                if let Some(enabled) = query.enabled {
                    if plugin.enabled != enabled {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Run one script plugin against a URL
    ///
    /// Returns `Ok(true)` when the plugin actually ran. Module plugins,
    /// disabled plugins and plugins whose match rules reject the URL are
    /// skipped with `Ok(false)`.
    pub fn execute(&self, id: &str, url: &str) -> Result<bool, PluginError> {
        let plugin = self
            .store
            .get(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if plugin.kind != PluginType::Script {
            debug!("plugin {id} is a module, not executing");
            return Ok(false);
        }
        if !plugin.enabled {
            return Ok(false);
        }
        let patterns = plugin.match_patterns();
        if !patterns.is_empty() && !matcher::matches(patterns, url) {
            debug!("plugin {id} does not match {url}");
            return Ok(false);
        }

        let context = ExecutionContext::for_plugin(plugin, url);
        self.sandbox.execute(&plugin.content, &context)?;
        Ok(true)
    }

    /// Recover a module plugin's export map
    ///
    /// Imports are reads, not execution triggers: neither the enabled flag
    /// nor the match rules are consulted.
    pub fn import_exports<'s>(&'s self, id: &str, url: &str) -> Result<ExportMap<'s>, PluginError> {
        let plugin = self
            .store
            .get(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        let context = ExecutionContext::for_plugin(plugin, url);
        self.sandbox.extract_exports(&plugin.content, &context)
    }

    /// Add many plugins; one failure never aborts the rest
    pub fn batch_add(&mut self, inputs: Vec<PluginInput>) -> BatchResult<Plugin> {
        let mut result = BatchResult::default();
        for input in inputs {
            let subject = input.name.clone();
            match self.add(input) {
                Ok(plugin) => result.succeeded.push(plugin),
                Err(error) => result.failed.push(BatchFailure { subject, error }),
            }
        }
        result
    }

    /// Delete many plugins, returning the removed records
    pub fn batch_delete(&mut self, ids: &[String]) -> BatchResult<Plugin> {
        let mut result = BatchResult::default();
        for id in ids {
            match self.delete(id) {
                Ok(plugin) => result.succeeded.push(plugin),
                Err(error) => result.failed.push(BatchFailure {
                    subject: id.clone(),
                    error,
                }),
            }
        }
        result
    }

    /// Update many plugins independently
    pub fn batch_update(&mut self, updates: Vec<(String, PluginUpdate)>) -> BatchResult<Plugin> {
        let mut result = BatchResult::default();
        for (id, patch) in updates {
            match self.update(&id, patch) {
                Ok(plugin) => result.succeeded.push(plugin),
                Err(error) => result.failed.push(BatchFailure { subject: id, error }),
            }
        }
        result
    }

    /// Counts over the current collection, in a single pass
    #[must_use]
    pub fn stats(&self) -> PluginStats {
        self.store
            .snapshot()
            .iter()
            .fold(PluginStats::default(), |mut stats, plugin| {
                stats.total += 1;
                if plugin.enabled {
                    stats.enabled += 1;
                } else {
                    stats.disabled += 1;
                }
                if plugin.allow_delete {
                    stats.deletable += 1;
                }
                stats
            })
    }

    /// Drop every plugin, in memory and in the backing store
    pub fn clear_all(&mut self) {
        self.store.clear();
        if let Err(e) = self.storage.clear() {
            error!("failed to clear plugin storage: {e:#}");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.storage.save(self.store.snapshot()) {
            error!("failed to persist plugins: {e:#}");
        }
    }
}

fn validate_content(content: &str) -> Result<(), PluginError> {
    if content.trim().is_empty() {
        return Err(PluginError::Invalid("plugin content is empty".to_string()));
    }
    Ok(())
}
