//! CLI configuration file handling.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use pinsync_remote::HttpSourceConfig;
use pinsync_sync::{RetryPolicy, SyncConfig};

/// Environment variable that overrides `api.access_token`.
pub const ACCESS_TOKEN_ENV: &str = "PINSYNC_ACCESS_TOKEN";

fn default_source() -> String {
    "http".to_string()
}

/// Configuration of the `pinsync` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Registered source name, "http" or "memory".
    #[serde(default = "default_source")]
    pub source: String,
    /// Settings for the "http" source.
    pub api: HttpSourceConfig,
    /// Event fixture for the "memory" source.
    pub fixture: Option<PathBuf>,
    pub sync: SyncConfig,
    /// SQLite database; defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Whole-run retries of `sync`.
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            api: HttpSourceConfig::default(),
            fixture: None,
            sync: SyncConfig::default(),
            database_path: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                config.api.access_token = Some(token);
            }
        }

        config.sync.validate().context("Invalid sync settings")?;
        Ok(config)
    }

    /// Where the local database lives.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pinsync")
                .join("events.db")
        })
    }

    /// Options handed to the source registry for `self.source`.
    pub fn source_options(&self) -> Result<Value> {
        match self.source.as_str() {
            "http" => serde_json::to_value(&self.api).context("Failed to encode api settings"),
            "memory" => Ok(match &self.fixture {
                Some(path) => serde_json::json!({ "fixture": path }),
                None => Value::Null,
            }),
            _ => Ok(Value::Null),
        }
    }
}
