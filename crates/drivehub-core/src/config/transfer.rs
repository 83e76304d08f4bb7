//! Background transfer configuration.

use serde::{Deserialize, Serialize};

/// Settings for the transfer task manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Number of transfers allowed to run at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum number of non-terminal jobs held in the live registry.
    /// Submissions beyond this are rejected.
    #[serde(default = "default_max_active_jobs")]
    pub max_active_jobs: usize,
    /// Timeout for establishing a connection to a remote source, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Maximum wait for the next chunk from a remote source, in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Largest accepted download, in bytes (default 1.5 GiB).
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    /// Minimum interval between persisted progress updates while running.
    #[serde(default = "default_progress_persist_interval")]
    pub progress_persist_interval_ms: u64,
    /// Directory used to stage downloads before they are stored.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// `User-Agent` header sent to remote sources.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_active_jobs: default_max_active_jobs(),
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            max_download_bytes: default_max_download_bytes(),
            progress_persist_interval_ms: default_progress_persist_interval(),
            temp_dir: default_temp_dir(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_active_jobs() -> usize {
    256
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_download_bytes() -> u64 {
    1536 * 1024 * 1024
}

fn default_progress_persist_interval() -> u64 {
    1000
}

fn default_temp_dir() -> String {
    "./data/tmp".to_string()
}

fn default_user_agent() -> String {
    "drivehub-transfer/0.1".to_string()
}
