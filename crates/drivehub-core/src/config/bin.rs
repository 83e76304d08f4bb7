//! Recycle bin retention configuration.

use serde::{Deserialize, Serialize};

/// Recycle bin expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinConfig {
    /// Days a binned subtree is kept before it is permanently deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Cron expression (with seconds) for the purge job.
    #[serde(default = "default_purge_schedule")]
    pub purge_schedule: String,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_schedule: default_purge_schedule(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_purge_schedule() -> String {
    "0 0 * * * *".to_string()
}
