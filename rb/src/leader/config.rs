//! Leader gate configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff and abort settings for the leader gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderGateConfig {
    /// First retry delay in milliseconds
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between retries
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomization factor applied to each delay (0.0 disables jitter)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Give up after this many seconds; unset waits forever
    #[serde(rename = "max-wait-secs", default)]
    pub max_wait_secs: Option<u64>,

    /// Log progress every N follower attempts
    #[serde(rename = "log-every", default = "default_log_every")]
    pub log_every: u32,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_log_every() -> u32 {
    5
}

impl Default for LeaderGateConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_wait_secs: None,
            log_every: default_log_every(),
        }
    }
}

impl LeaderGateConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}
