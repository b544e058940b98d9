use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// Hard cap on the visible queue length, enforced at enqueue.
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
    /// Playlist additions above this count get one condensed confirmation.
    #[serde(default = "default_queue_display")]
    pub queue_display: usize,
    /// How many upcoming tracks a list reply shows before summarizing.
    #[serde(default = "default_list_display")]
    pub list_display: usize,
    /// Capacity of the downloaded-and-ready buffer.
    #[serde(default = "default_ready_capacity")]
    pub ready_capacity: usize,
    /// Playback treats this long without a decoded frame as end of track.
    #[serde(default = "default_no_data_timeout_ms")]
    pub no_data_timeout_ms: u64,
    /// The pipeline shuts down after the queue stays empty this long.
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,
    /// Absolute cap on a single pipeline's lifetime.
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl PlayerConfig {
    pub fn no_data_timeout(&self) -> Duration {
        Duration::from_millis(self.no_data_timeout_ms)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_queue_len: default_max_queue_len(),
            queue_display: default_queue_display(),
            list_display: default_list_display(),
            ready_capacity: default_ready_capacity(),
            no_data_timeout_ms: default_no_data_timeout_ms(),
            idle_grace_secs: default_idle_grace_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

fn default_max_queue_len() -> usize {
    30
}

fn default_queue_display() -> usize {
    3
}

fn default_list_display() -> usize {
    10
}

fn default_ready_capacity() -> usize {
    2
}

fn default_no_data_timeout_ms() -> u64 {
    2000
}

fn default_idle_grace_secs() -> u64 {
    60
}

fn default_max_lifetime_secs() -> u64 {
    // 12 hours
    43200
}
