//! Plugin center facade
//!
//! The center is the single coordination point an embedder talks to: it owns
//! the configuration, wires the service to injected storage and host
//! capabilities, emits one typed event per mutation and keeps a bounded
//! history of every failure it surfaced.

use std::collections::VecDeque;
use tracing::warn;

use crate::config::{CenterConfig, Mode};
use crate::error::{ErrorRecord, PluginError, ERROR_HISTORY_CAPACITY};
use crate::events::{EventBus, EventCallback, ListenerId, PluginEvent};
use crate::host::{HostContext, StaticHost};
use crate::plugin::{Plugin, PluginInput, PluginQuery, PluginStats, PluginType, PluginUpdate};
use crate::sandbox::ExportMap;
use crate::service::{BatchResult, ImportSummary, PluginService};
use crate::storage::{MemoryStorage, Storage};
use crate::store::SubscriptionId;

type ErrorHandler = Box<dyn Fn(&ErrorRecord)>;

/// Builder for a [`PluginCenter`]
///
/// Capabilities and event listeners are attached before construction, so
/// events emitted while the center boots (config plugins being added, the
/// auto-execute sweep) reach the embedder.
pub struct PluginCenterBuilder {
    config: CenterConfig,
    storage: Option<Box<dyn Storage>>,
    host: Option<Box<dyn HostContext>>,
    listeners: Vec<(PluginEvent, EventCallback)>,
    error_handler: Option<ErrorHandler>,
}

impl PluginCenterBuilder {
    #[must_use]
    pub fn new(config: CenterConfig) -> Self {
        Self {
            config,
            storage: None,
            host: None,
            listeners: Vec::new(),
            error_handler: None,
        }
    }

    /// Persistence backend; defaults to [`MemoryStorage`]
    #[must_use]
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Host context; defaults to a [`StaticHost`] with an empty URL
    #[must_use]
    pub fn host(mut self, host: impl HostContext + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    /// Pre-register an event listener
    #[must_use]
    pub fn on(mut self, event: PluginEvent, callback: impl Fn(&Plugin) + 'static) -> Self {
        self.listeners.push((event, Box::new(callback)));
        self
    }

    /// Pre-register the error handler
    #[must_use]
    pub fn error_handler(mut self, handler: impl Fn(&ErrorRecord) + 'static) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Validate the config, load persisted plugins, merge config plugins and
    /// run the initial auto-execute sweep
    pub fn build(self) -> Result<PluginCenter, PluginError> {
        self.config.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(MemoryStorage::new()));
        let host = self
            .host
            .unwrap_or_else(|| Box::new(StaticHost::new("")));

        let mut service = PluginService::new(storage)?;
        service.init();

        let mut events = EventBus::new();
        for (event, callback) in self.listeners {
            events.on(event, callback);
        }

        let mut center = PluginCenter {
            config: self.config,
            service,
            host,
            events,
            error_handler: self.error_handler,
            error_history: VecDeque::new(),
        };

        let seed = center.config.plugins.clone();
        if !seed.is_empty() {
            center.batch_add(seed);
        }
        if center.config.setting.auto_execute {
            center.execute_all(None);
        }

        Ok(center)
    }
}

/// Coordinates plugin lifecycle, execution, events and error reporting
pub struct PluginCenter {
    config: CenterConfig,
    service: PluginService,
    host: Box<dyn HostContext>,
    events: EventBus,
    error_handler: Option<ErrorHandler>,
    error_history: VecDeque<ErrorRecord>,
}

// Several fields hold trait objects and boxed closures that cannot derive
// `Debug`; this manual impl reports the debuggable fields so `Result`'s
// `unwrap`/`unwrap_err` are usable on `PluginCenter`.
impl std::fmt::Debug for PluginCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCenter")
            .field("config", &self.config)
            .field("error_history", &self.error_history)
            .finish_non_exhaustive()
    }
}

impl PluginCenter {
    #[must_use]
    pub fn builder(config: CenterConfig) -> PluginCenterBuilder {
        PluginCenterBuilder::new(config)
    }

    /// Center with default capabilities (in-memory storage, empty host URL)
    pub fn new(config: CenterConfig) -> Result<Self, PluginError> {
        PluginCenterBuilder::new(config).build()
    }

    // ---- CRUD ----

    pub fn add(&mut self, input: PluginInput) -> Result<Plugin, PluginError> {
        match self.service.add(input) {
            Ok(plugin) => {
                self.events.emit(PluginEvent::Added, &plugin);
                Ok(plugin)
            }
            Err(e) => Err(self.record_error(e, None)),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Plugin> {
        self.service.get(id)
    }

    #[must_use]
    pub fn get_many(&self, query: &PluginQuery) -> Vec<Plugin> {
        self.service.query(query)
    }

    /// The full collection, in insertion order
    #[must_use]
    pub fn plugins(&self) -> Vec<Plugin> {
        self.service.all()
    }

    pub fn update(&mut self, id: &str, patch: PluginUpdate) -> Result<Plugin, PluginError> {
        match self.service.update(id, patch) {
            Ok(plugin) => {
                self.events.emit(PluginEvent::Updated, &plugin);
                Ok(plugin)
            }
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    pub fn delete(&mut self, id: &str) -> Result<(), PluginError> {
        match self.service.delete(id) {
            Ok(removed) => {
                self.events.emit(PluginEvent::Deleted, &removed);
                Ok(())
            }
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    pub fn enable(&mut self, id: &str) -> Result<(), PluginError> {
        match self.service.set_enabled(id, true) {
            Ok(plugin) => {
                self.events.emit(PluginEvent::Enabled, &plugin);
                Ok(())
            }
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    pub fn disable(&mut self, id: &str) -> Result<(), PluginError> {
        match self.service.set_enabled(id, false) {
            Ok(plugin) => {
                self.events.emit(PluginEvent::Disabled, &plugin);
                Ok(())
            }
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    /// Flip the enabled flag, returning the new state
    pub fn toggle(&mut self, id: &str) -> Result<bool, PluginError> {
        match self.service.toggle(id) {
            Ok(enabled) => {
                if let Some(plugin) = self.service.get(id) {
                    let event = if enabled {
                        PluginEvent::Enabled
                    } else {
                        PluginEvent::Disabled
                    };
                    self.events.emit(event, &plugin);
                }
                Ok(enabled)
            }
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    // ---- Execution ----

    /// Execute one script plugin; `Ok(true)` when it actually ran
    ///
    /// Without an explicit URL the host's current URL is the match target.
    pub fn execute(&mut self, id: &str, url: Option<&str>) -> Result<bool, PluginError> {
        let url = self.resolve_url(url);
        match self.service.execute(id, &url) {
            Ok(true) => {
                if let Some(plugin) = self.service.get(id) {
                    self.events.emit(PluginEvent::Executed, &plugin);
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => Err(self.record_error(e, Some(id))),
        }
    }

    /// Run every enabled script plugin against the URL
    ///
    /// One plugin's failure is recorded and logged but never stops the
    /// sweep. Returns the number of plugins that ran.
    pub fn execute_all(&mut self, url: Option<&str>) -> usize {
        let url = self.resolve_url(url);
        let candidates: Vec<String> = self
            .service
            .query(&PluginQuery {
                enabled: Some(true),
                ..PluginQuery::default()
            })
            .into_iter()
            .filter(|plugin| plugin.kind == PluginType::Script)
            .map(|plugin| plugin.id)
            .collect();

        let mut executed = 0;
        for id in candidates {
            match self.service.execute(&id, &url) {
                Ok(true) => {
                    executed += 1;
                    if let Some(plugin) = self.service.get(&id) {
                        self.events.emit(PluginEvent::Executed, &plugin);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("plugin {id} failed during sweep: {e}");
                    self.record_error(e, Some(&id));
                }
            }
        }
        executed
    }

    /// Recover a module plugin's exports without executing it as a script
    pub fn import_exports(&mut self, id: &str) -> Result<ExportMap<'_>, PluginError> {
        let url = self.host.current_url();
        match self.service.import_exports(id, &url) {
            Ok(exports) => Ok(exports),
            // Recorded on the disjoint error fields: the export map borrows
            // the service for the caller's lifetime
            Err(e) => {
                record_failure(&self.error_handler, &mut self.error_history, &e, Some(id));
                Err(e)
            }
        }
    }

    /// Whether a plugin's match rules accept the URL (host URL by default)
    ///
    /// Unknown ids are false; a plugin without match rules accepts any URL.
    #[must_use]
    pub fn check_match(&self, id: &str, url: Option<&str>) -> bool {
        let Some(plugin) = self.service.get(id) else {
            return false;
        };
        let url = self.resolve_url(url);
        crate::matcher::matches(plugin.match_patterns(), &url)
    }

    // ---- Batch operations ----

    pub fn batch_add(&mut self, inputs: Vec<PluginInput>) -> BatchResult<Plugin> {
        let result = self.service.batch_add(inputs);
        for plugin in &result.succeeded {
            self.events.emit(PluginEvent::Added, plugin);
        }
        result
    }

    pub fn batch_delete(&mut self, ids: &[String]) -> BatchResult<Plugin> {
        let result = self.service.batch_delete(ids);
        for plugin in &result.succeeded {
            self.events.emit(PluginEvent::Deleted, plugin);
        }
        result
    }

    pub fn batch_update(&mut self, updates: Vec<(String, PluginUpdate)>) -> BatchResult<Plugin> {
        let result = self.service.batch_update(updates);
        for plugin in &result.succeeded {
            self.events.emit(PluginEvent::Updated, plugin);
        }
        result
    }

    // ---- Events ----

    pub fn on(&mut self, event: PluginEvent, callback: impl Fn(&Plugin) + 'static) -> ListenerId {
        self.events.on(event, Box::new(callback))
    }

    pub fn off(&mut self, event: PluginEvent, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    /// Observe every store mutation with a full snapshot
    pub fn watch(&mut self, callback: impl Fn(&[Plugin]) + 'static) -> SubscriptionId {
        self.service.store_mut().subscribe(Box::new(callback))
    }

    pub fn unwatch(&mut self, id: SubscriptionId) -> bool {
        self.service.store_mut().unsubscribe(id)
    }

    // ---- Export / import ----

    /// The full collection as pretty-printed JSON
    #[must_use]
    pub fn export_all(&self) -> String {
        serde_json::to_string_pretty(&self.service.all()).unwrap_or_else(|e| {
            warn!("plugin export failed: {e}");
            "[]".to_string()
        })
    }

    /// Import a previously exported collection
    ///
    /// Ids are preserved. Malformed JSON or a non-array payload means
    /// "nothing to import" and yields the empty summary; individual bad
    /// records land in the failure count without stopping the rest.
    pub fn import_all(&mut self, json: &str) -> ImportSummary {
        let mut summary = ImportSummary::default();

        let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(json) else {
            warn!("plugin import payload is not a JSON array");
            return summary;
        };

        for item in items {
            match serde_json::from_value::<Plugin>(item) {
                Ok(plugin) => match self.service.insert_existing(plugin) {
                    Ok(inserted) => {
                        summary.imported += 1;
                        self.events.emit(PluginEvent::Added, &inserted);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        summary.errors.push(e.to_string());
                    }
                },
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push(e.to_string());
                }
            }
        }

        summary
    }

    // ---- Statistics, errors, configuration ----

    #[must_use]
    pub fn stats(&self) -> PluginStats {
        self.service.stats()
    }

    pub fn set_error_handler(&mut self, handler: impl Fn(&ErrorRecord) + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    /// The most recent error records, oldest first
    #[must_use]
    pub fn error_history(&self, limit: Option<usize>) -> Vec<ErrorRecord> {
        let records: Vec<ErrorRecord> = self.error_history.iter().cloned().collect();
        match limit {
            Some(limit) if limit < records.len() => records[records.len() - limit..].to_vec(),
            _ => records,
        }
    }

    /// Remove every plugin, in memory and in storage
    pub fn clear_all(&mut self) {
        self.service.clear_all();
    }

    #[must_use]
    pub fn config(&self) -> &CenterConfig {
        &self.config
    }

    pub fn set_mode(&mut self, mode: Mode, mount_id: Option<String>) {
        self.config.setting.mode = mode;
        if mount_id.is_some() {
            self.config.setting.mount_id = mount_id;
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.config.setting.mode
    }

    fn resolve_url(&self, url: Option<&str>) -> String {
        url.map_or_else(|| self.host.current_url(), str::to_string)
    }

    /// Record a failure in the bounded history and hand it to the error
    /// handler, falling back to a logged warning
    fn record_error(&mut self, error: PluginError, plugin_id: Option<&str>) -> PluginError {
        record_failure(&self.error_handler, &mut self.error_history, &error, plugin_id);
        error
    }
}

fn record_failure(
    handler: &Option<ErrorHandler>,
    history: &mut VecDeque<ErrorRecord>,
    error: &PluginError,
    plugin_id: Option<&str>,
) {
    let record = ErrorRecord::new(error, plugin_id);
    match handler {
        Some(handler) => handler(&record),
        None => warn!("plugin center error: {error}"),
    }

    history.push_back(record);
    if history.len() > ERROR_HISTORY_CAPACITY {
        history.pop_front();
    }
}
