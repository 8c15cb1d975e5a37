//! Host page capability
//!
//! The host environment tells the runtime which URL is currently active; it
//! is the default match target whenever an operation does not supply one
//! explicitly.

/// Capability giving the runtime access to the embedding host's state
pub trait HostContext {
    /// The URL plugins are currently running against
    fn current_url(&self) -> String;
}

/// Host with a fixed URL, for headless embedders and tests
pub struct StaticHost {
    url: String,
}

impl StaticHost {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl HostContext for StaticHost {
    fn current_url(&self) -> String {
        self.url.clone()
    }
}
