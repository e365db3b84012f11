//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sync direction ("bidirectional", "a-to-b", "b-to-a")
    pub mode: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: "bidirectional".to_string(),
        }
    }
}

/// The two selections kept in sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionsConfig {
    /// Selection A (the source in "a-to-b" mode)
    pub a: String,

    /// Selection B
    pub b: String,
}

impl Default for SelectionsConfig {
    fn default() -> Self {
        Self {
            a: "PRIMARY".to_string(),
            b: "CLIPBOARD".to_string(),
        }
    }
}

/// Data transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Largest single property write in bytes; bigger payloads are sent
    /// incrementally. Capped further by the display's request size limit.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest payload accepted from a selection owner, in bytes
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_chunk_size() -> usize {
    262144 // 256 KB
}

fn default_max_size() -> usize {
    16777216 // 16 MB
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_size: default_max_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for daily rotated log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
