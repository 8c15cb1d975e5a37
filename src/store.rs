//! In-memory plugin collection
//!
//! The store is the authoritative ordered sequence of plugin records. It has
//! a single logical writer (the service) and notifies subscribers with a
//! complete post-mutation snapshot after every change.

use tracing::debug;

use crate::plugin::{now_millis, Plugin};

/// Handle returned by [`PluginStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type StoreListener = Box<dyn Fn(&[Plugin])>;

/// Ordered collection of plugins with change subscriptions
#[derive(Default)]
pub struct PluginStore {
    plugins: Vec<Plugin>,
    listeners: Vec<(SubscriptionId, StoreListener)>,
    next_subscription: u64,
}

impl PluginStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current contents, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> &[Plugin] {
        &self.plugins
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == id)
    }

    /// Replace the whole collection
    pub fn replace(&mut self, plugins: Vec<Plugin>) {
        self.plugins = plugins;
        self.notify();
    }

    /// Append one plugin
    pub fn push(&mut self, plugin: Plugin) {
        debug!("store: adding plugin {}", plugin.id);
        self.plugins.push(plugin);
        self.notify();
    }

    /// Apply a partial mutation to one plugin and stamp its update time
    ///
    /// Returns false when the id is unknown.
    pub fn patch<F>(&mut self, id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Plugin),
    {
        let Some(plugin) = self.plugins.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        apply(plugin);
        plugin.updated_at = now_millis();
        self.notify();
        true
    }

    /// Remove one plugin; false when the id is unknown
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|p| p.id != id);
        let removed = self.plugins.len() < before;
        if removed {
            debug!("store: removed plugin {id}");
            self.notify();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
        self.notify();
    }

    /// Register a listener invoked with a snapshot after every mutation
    pub fn subscribe(&mut self, listener: StoreListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Drop a listener; false when the handle is unknown
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() < before
    }

    fn notify(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.plugins);
        }
    }
}
