//! Persistence capability for the plugin collection
//!
//! Persistence is an injected collaborator, not something the host owns:
//! writes are best-effort and a corrupt or missing backing file simply
//! yields an empty collection.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::plugin::Plugin;

/// Backing store for plugin records
pub trait Storage {
    /// Load the persisted collection; empty when absent or corrupt
    fn load(&self) -> Vec<Plugin>;

    /// Persist the full collection (overwrite semantics)
    fn save(&self, plugins: &[Plugin]) -> Result<()>;

    /// Remove all persisted state
    fn clear(&self) -> Result<()>;
}

/// JSON-file-backed storage
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default location under the user's home directory
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self::new(home.join(".crucible").join("plugins.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Vec<Plugin> {
        let Ok(json) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&json) {
            Ok(plugins) => plugins,
            Err(e) => {
                warn!("stored plugin data at {} is corrupt: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    fn save(&self, plugins: &[Plugin]) -> Result<()> {
        let json = serde_json::to_string_pretty(plugins).context("Failed to serialize plugins")?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }

        fs::write(&self.path, json).context("Failed to write plugin file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to delete plugin file")?;
        }
        Ok(())
    }
}

/// In-memory storage for tests and embedders that manage persistence
/// themselves
#[derive(Default)]
pub struct MemoryStorage {
    plugins: RefCell<Vec<Plugin>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Vec<Plugin> {
        self.plugins.borrow().clone()
    }

    fn save(&self, plugins: &[Plugin]) -> Result<()> {
        *self.plugins.borrow_mut() = plugins.to_vec();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.plugins.borrow_mut().clear();
        Ok(())
    }
}
