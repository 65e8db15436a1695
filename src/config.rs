//! Service configuration: `itemhub.toml`, then environment, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::batch::{FailurePolicy, PoolConfig, default_max_workers};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "itemhub.toml";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Keep items in memory only; `db_path` is ignored
    #[serde(default)]
    pub in_memory: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".itemhub/items.db")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            in_memory: false,
        }
    }
}

/// Batch pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Concurrent processing tasks
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Simulated work per item, in milliseconds
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// How long pool shutdown waits for in-flight tasks
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_processing_delay_ms() -> u64 {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            processing_delay_ms: default_processing_delay_ms(),
            failure_policy: FailurePolicy::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl BatchSection {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_max_workers(self.max_workers)
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms))
    }
}

/// The complete itemhub.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub batch: BatchSection,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse itemhub.toml")
    }

    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `ITEMHUB_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unset keys leave the file value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ITEMHUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ITEMHUB_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid ITEMHUB_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("ITEMHUB_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(workers) = lookup("ITEMHUB_MAX_WORKERS") {
            self.batch.max_workers = workers
                .parse()
                .with_context(|| format!("Invalid ITEMHUB_MAX_WORKERS '{}'", workers))?;
        }
        if let Some(delay) = lookup("ITEMHUB_PROCESSING_DELAY_MS") {
            self.batch.processing_delay_ms = delay
                .parse()
                .with_context(|| format!("Invalid ITEMHUB_PROCESSING_DELAY_MS '{}'", delay))?;
        }
        Ok(())
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be greater than 0".to_string());
        }
        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        if self.batch.max_workers == 0 {
            problems.push("batch.max_workers must be at least 1".to_string());
        }
        if !self.storage.in_memory && self.storage.db_path.as_os_str().is_empty() {
            problems.push("storage.db_path must be set unless storage.in_memory is true".to_string());
        }

        problems
    }

    /// Serialize to TOML, as printed by `itemhub config`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// `host:port` the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
