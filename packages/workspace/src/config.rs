use crate::presence::UserInfo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "marginalia.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Synchronization settings for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Only messages from this origin reach the foreign-surface adapter
    pub allowed_origin: String,

    /// Name of the shared text inside the replicated document
    pub text_name: String,

    pub presence_interval_ms: u64,

    /// Remote cursors not updated for this long are dropped
    pub presence_max_age_ms: u64,

    pub export_timeout_ms: u64,
    pub save_debounce_ms: u64,

    pub user: UserInfo,

    /// Fixed replication client id; random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "https://embed.diagrams.net".to_string(),
            text_name: "content".to_string(),
            presence_interval_ms: 250,
            presence_max_age_ms: 30_000,
            export_timeout_ms: 10_000,
            save_debounce_ms: 500,
            user: UserInfo::default(),
            client_id: None,
        }
    }
}

impl SyncConfig {
    /// Load config from a JSON file, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_origin.trim().is_empty() {
            return Err(ConfigError::Invalid("allowedOrigin must not be empty".to_string()));
        }
        if self.text_name.is_empty() {
            return Err(ConfigError::Invalid("textName must not be empty".to_string()));
        }
        for (name, value) in [
            ("presenceIntervalMs", self.presence_interval_ms),
            ("presenceMaxAgeMs", self.presence_max_age_ms),
            ("exportTimeoutMs", self.export_timeout_ms),
            ("saveDebounceMs", self.save_debounce_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    pub fn presence_max_age(&self) -> Duration {
        Duration::from_millis(self.presence_max_age_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
