//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables (through the CLI)
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clipboard::SyncMode;

pub mod types;

pub use types::{LoggingConfig, SelectionsConfig, SyncConfig, TransferConfig};

/// Smallest accepted chunk size; one 32-bit element
const MIN_CHUNK_SIZE: usize = 4;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sync direction
    #[serde(default)]
    pub sync: SyncConfig,
    /// Selection names
    #[serde(default)]
    pub selections: SelectionsConfig,
    /// Transfer limits
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Default config file location
    ///
    /// `$XDG_CONFIG_HOME/lamco-selection-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lamco-selection-sync").join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.sync_mode().context("Invalid sync mode")?;

        // Validate selection names
        for (key, name) in [("a", &self.selections.a), ("b", &self.selections.b)] {
            if name.trim().is_empty() {
                anyhow::bail!("Selection {} must not be empty", key);
            }
        }
        if self.selections.a == self.selections.b {
            anyhow::bail!(
                "Selections a and b must differ (both are {})",
                self.selections.a
            );
        }

        // Validate transfer limits
        if self.transfer.chunk_size < MIN_CHUNK_SIZE {
            anyhow::bail!(
                "chunk_size ({}) must be at least {} bytes",
                self.transfer.chunk_size,
                MIN_CHUNK_SIZE
            );
        }
        if self.transfer.max_size == 0 {
            anyhow::bail!("max_size must be greater than zero");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, mode: Option<String>) -> Self {
        if let Some(mode) = mode {
            self.sync.mode = mode;
        }

        self
    }

    /// Parsed sync mode
    pub fn sync_mode(&self) -> crate::clipboard::Result<SyncMode> {
        self.sync.mode.parse()
    }
}
