use thiserror::Error;

use crate::plugin::now_millis;

/// Maximum number of error records kept by the plugin center
pub const ERROR_HISTORY_CAPACITY: usize = 50;

/// Typed failures surfaced by the plugin host
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("invalid plugin: {0}")]
    Invalid(String),

    #[error("plugin {0} does not allow deletion")]
    DeleteForbidden(String),

    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    #[error("metadata parse failed: {0}")]
    MetadataParse(String),

    #[error("invalid plugin center config: {0}")]
    ConfigInvalid(String),
}

impl PluginError {
    /// Stable code for error records and external handlers
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            PluginError::NotFound(_) => ErrorCode::NotFound,
            PluginError::Invalid(_) => ErrorCode::Invalid,
            PluginError::DeleteForbidden(_) => ErrorCode::DeleteForbidden,
            PluginError::ExecutionFailed(_) => ErrorCode::ExecutionFailed,
            PluginError::MetadataParse(_) => ErrorCode::MetadataParse,
            PluginError::ConfigInvalid(_) => ErrorCode::ConfigInvalid,
        }
    }
}

/// Error classification exposed through the error history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    Invalid,
    DeleteForbidden,
    ExecutionFailed,
    MetadataParse,
    ConfigInvalid,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "PLUGIN_NOT_FOUND",
            ErrorCode::Invalid => "PLUGIN_INVALID",
            ErrorCode::DeleteForbidden => "PLUGIN_DELETE_FORBIDDEN",
            ErrorCode::ExecutionFailed => "PLUGIN_EXECUTION_FAILED",
            ErrorCode::MetadataParse => "PLUGIN_METADATA_PARSE_ERROR",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded failure, kept in the center's bounded history
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub plugin_id: Option<String>,
    pub timestamp: i64,
}

impl ErrorRecord {
    pub(crate) fn new(error: &PluginError, plugin_id: Option<&str>) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            plugin_id: plugin_id.map(str::to_string),
            timestamp: now_millis(),
        }
    }
}
