//! Blob store configuration.

use serde::{Deserialize, Serialize};

/// Which blob store implementation backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Content-addressed files under a local root directory.
    Local,
    /// Process-local map; content is lost on exit.
    Memory,
}

/// Top-level blob storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Local filesystem storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
    /// Upper bound for a single `put` call, in seconds.
    #[serde(default = "default_put_timeout")]
    pub put_timeout_seconds: u64,
    /// Upper bound for opening a blob for reading, in seconds.
    #[serde(default = "default_get_timeout")]
    pub get_timeout_seconds: u64,
    /// Upper bound for a single `delete` call, in seconds.
    #[serde(default = "default_delete_timeout")]
    pub delete_timeout_seconds: u64,
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root path for blob files.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalStorageConfig::default(),
            put_timeout_seconds: default_put_timeout(),
            get_timeout_seconds: default_get_timeout(),
            delete_timeout_seconds: default_delete_timeout(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_local_root() -> String {
    "./data/blobs".to_string()
}

fn default_put_timeout() -> u64 {
    600
}

fn default_get_timeout() -> u64 {
    30
}

fn default_delete_timeout() -> u64 {
    30
}
