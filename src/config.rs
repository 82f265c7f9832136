use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::server::{ConfirmPolicy, RetentionConfig};
use crate::store::FileStoreConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retention: RetentionSettings,
}

/// TID store persistence
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub data_dir: String,
    pub sync_on_write: bool,
    pub compact_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/tids".to_string(),
            sync_on_write: true,
            compact_every: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn file_store(&self) -> FileStoreConfig {
        FileStoreConfig {
            data_dir: PathBuf::from(&self.data_dir),
            sync_on_write: self.sync_on_write,
            compact_every: self.compact_every,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Logical backend system the handlers are registered for
    pub system_id: String,
    #[serde(default)]
    pub confirm_policy: ConfirmPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            system_id: "MME".to_string(),
            confirm_policy: ConfirmPolicy::Retain,
        }
    }
}

/// Purge of old CONFIRMED records
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetentionSettings {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub max_age_secs: u64,
    pub batch_size: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_interval_secs: 300,
            max_age_secs: 7 * 24 * 3600,
            batch_size: 1000,
        }
    }
}

impl RetentionSettings {
    pub fn worker_config(&self) -> RetentionConfig {
        RetentionConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            max_age: Duration::from_secs(self.max_age_secs),
            batch_size: self.batch_size,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
