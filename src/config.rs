//! Plugin center construction configuration

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::plugin::PluginInput;

/// Configuration consumed once at construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterConfig {
    /// Plugin definitions merged into the store at startup
    #[serde(default)]
    pub plugins: Vec<PluginInput>,
    #[serde(default)]
    pub setting: Setting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    #[serde(default)]
    pub mode: Mode,
    /// Element the embedder mounts its plugin list on; required in list mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_id: Option<String>,
    /// Run every enabled script plugin once at construction
    #[serde(default = "default_true")]
    pub auto_execute: bool,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            mode: Mode::Api,
            mount_id: None,
            auto_execute: true,
        }
    }
}

/// How the embedder drives the center
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Api,
    List,
}

impl CenterConfig {
    /// Reject configurations the center cannot honor
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.setting.mode == Mode::List
            && self
                .setting
                .mount_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(PluginError::ConfigInvalid(
                "list mode requires a mount id".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_api_mode() {
        let config = CenterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.setting.mode, Mode::Api);
        assert!(config.setting.auto_execute);
    }

    #[test]
    fn list_mode_requires_a_mount_id() {
        let mut config = CenterConfig::default();
        config.setting.mode = Mode::List;
        assert!(matches!(
            config.validate(),
            Err(PluginError::ConfigInvalid(_))
        ));

        config.setting.mount_id = Some("plugin-root".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn auto_execute_defaults_to_true_when_absent() {
        let config: CenterConfig =
            serde_json::from_str(r#"{ "setting": { "mode": "api" } }"#).unwrap();
        assert!(config.setting.auto_execute);
    }
}
