//! Progress broadcast configuration.

use serde::{Deserialize, Serialize};

/// Settings for the per-owner progress channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of each owner's broadcast channel. Subscribers that fall
    /// further behind than this are resynchronised from a fresh snapshot.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}
