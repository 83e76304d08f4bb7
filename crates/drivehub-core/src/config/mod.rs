//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a default so an empty file is valid.

pub mod bin;
pub mod database;
pub mod logging;
pub mod realtime;
pub mod storage;
pub mod transfer;

use serde::{Deserialize, Serialize};

pub use self::bin::BinConfig;
pub use self::database::{DatabaseBackend, DatabaseConfig};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::storage::{LocalStorageConfig, StorageBackend, StorageConfig};
pub use self::transfer::TransferConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged TOML configuration
/// (default.toml + environment overlay + `DRIVEHUB__*` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob store settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Progress broadcast settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Recycle bin retention settings.
    #[serde(default)]
    pub bin: BinConfig,
    /// Tree traversal limits.
    #[serde(default)]
    pub tree: TreeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits applied to tree walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Hard ceiling on the number of parent links followed by any ancestry
    /// walk. Corrupted parent chains are reported instead of looping.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `DRIVEHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DRIVEHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

fn default_max_depth() -> usize {
    4096
}
