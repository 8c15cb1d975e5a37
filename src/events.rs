//! Typed lifecycle events
//!
//! Every externally-visible mutation on the plugin center emits exactly one
//! event. Listeners run in registration order; a panicking listener is
//! caught and logged so it can never take down the caller or the remaining
//! listeners.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::plugin::Plugin;

/// Lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginEvent {
    Added,
    Deleted,
    Updated,
    Enabled,
    Disabled,
    Executed,
}

impl PluginEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PluginEvent::Added => "pluginAdded",
            PluginEvent::Deleted => "pluginDeleted",
            PluginEvent::Updated => "pluginUpdated",
            PluginEvent::Enabled => "pluginEnabled",
            PluginEvent::Disabled => "pluginDisabled",
            PluginEvent::Executed => "pluginExecuted",
        }
    }
}

impl fmt::Display for PluginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub type EventCallback = Box<dyn Fn(&Plugin)>;

/// Per-event listener registry with ordered, failure-isolated fan-out
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<PluginEvent, Vec<(ListenerId, EventCallback)>>,
    next_id: u64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, event: PluginEvent, callback: EventCallback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(event).or_default().push((id, callback));
        id
    }

    /// Remove one listener; false when the handle is not registered for the
    /// event
    pub fn off(&mut self, event: PluginEvent, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(&event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() < before
    }

    pub fn emit(&self, event: PluginEvent, plugin: &Plugin) {
        let Some(listeners) = self.listeners.get(&event) else {
            return;
        };
        for (id, callback) in listeners {
            if catch_unwind(AssertUnwindSafe(|| callback(plugin))).is_err() {
                warn!("{event} listener {id:?} panicked for plugin {}", plugin.id);
            }
        }
    }
}
