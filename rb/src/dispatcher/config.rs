//! Dispatcher configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Poll-timeout settings for the event loop and the default application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Timeout before the first upcall; unset waits for the registration reply
    #[serde(rename = "initial-timeout-ms", default)]
    pub initial_timeout_ms: Option<u64>,

    /// Timeout applied after a recoverable error before the next upcall
    #[serde(rename = "recover-backoff-ms", default = "default_recover_backoff_ms")]
    pub recover_backoff_ms: u64,

    /// Delay before asking the discovery service again when it is not ready
    #[serde(rename = "ready-retry-ms", default = "default_ready_retry_ms")]
    pub ready_retry_ms: u64,

    /// Interval between publisher lookups once relaying; unset looks up once
    #[serde(rename = "publisher-refresh-ms", default = "default_publisher_refresh_ms")]
    pub publisher_refresh_ms: Option<u64>,
}

fn default_recover_backoff_ms() -> u64 {
    1_000
}

fn default_ready_retry_ms() -> u64 {
    2_000
}

fn default_publisher_refresh_ms() -> Option<u64> {
    Some(10_000)
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: None,
            recover_backoff_ms: default_recover_backoff_ms(),
            ready_retry_ms: default_ready_retry_ms(),
            publisher_refresh_ms: default_publisher_refresh_ms(),
        }
    }
}

impl DispatcherConfig {
    pub fn initial_timeout(&self) -> Option<Duration> {
        self.initial_timeout_ms.map(Duration::from_millis)
    }

    pub fn recover_backoff(&self) -> Duration {
        Duration::from_millis(self.recover_backoff_ms)
    }

    pub fn ready_retry(&self) -> Duration {
        Duration::from_millis(self.ready_retry_ms)
    }

    pub fn publisher_refresh(&self) -> Option<Duration> {
        self.publisher_refresh_ms.map(Duration::from_millis)
    }
}
