//! Coordination configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which coordination backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Etcd,
    /// In-process store, only useful for single-process runs and tests
    Memory,
}

/// Coordination-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub backend: Backend,

    /// etcd endpoints
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Key holding the active broker's `"<addr> <port>"`
    #[serde(rename = "leader-key", default = "default_leader_key")]
    pub leader_key: String,

    /// Key holding the discovery service URL
    #[serde(rename = "discovery-key", default = "default_discovery_key")]
    pub discovery_key: String,

    /// Initial delay between connection attempts in milliseconds
    #[serde(rename = "connect-backoff-initial-ms", default = "default_connect_backoff_initial_ms")]
    pub connect_backoff_initial_ms: u64,

    /// Maximum delay between connection attempts in milliseconds
    #[serde(rename = "connect-backoff-max-ms", default = "default_connect_backoff_max_ms")]
    pub connect_backoff_max_ms: u64,

    /// Give up connecting after this many seconds
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Initial key values for the memory backend
    #[serde(default)]
    pub seed: BTreeMap<String, String>,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}

fn default_leader_key() -> String {
    "/curbroker".to_string()
}

fn default_discovery_key() -> String {
    "/curDiscovery".to_string()
}

fn default_connect_backoff_initial_ms() -> u64 {
    100
}

fn default_connect_backoff_max_ms() -> u64 {
    5_000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            endpoints: default_endpoints(),
            leader_key: default_leader_key(),
            discovery_key: default_discovery_key(),
            connect_backoff_initial_ms: default_connect_backoff_initial_ms(),
            connect_backoff_max_ms: default_connect_backoff_max_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            seed: BTreeMap::new(),
        }
    }
}

impl CoordinationConfig {
    pub fn connect_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_initial_ms)
    }

    pub fn connect_backoff_max(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_max_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        debug!(connect_timeout_secs = %self.connect_timeout_secs, "CoordinationConfig::connect_timeout: called");
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinationConfig::default();
        assert_eq!(config.backend, Backend::Etcd);
        assert_eq!(config.endpoints, vec!["http://127.0.0.1:2379"]);
        assert_eq!(config.leader_key, "/curbroker");
        assert_eq!(config.discovery_key, "/curDiscovery");
        assert!(config.seed.is_empty());
    }

    #[test]
    fn test_memory_backend_with_seed() {
        let yaml = r#"
backend: memory
seed:
  /curbroker: "localhost 5570"
  /curDiscovery: "tcp://localhost:5555"
"#;
        let config: CoordinationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.seed.get("/curbroker").map(String::as_str), Some("localhost 5570"));
        assert_eq!(config.leader_key, "/curbroker");
    }

    #[test]
    fn test_durations() {
        let config = CoordinationConfig {
            connect_backoff_initial_ms: 250,
            connect_timeout_secs: 3,
            ..Default::default()
        };
        assert_eq!(config.connect_backoff_initial(), Duration::from_millis(250));
        assert_eq!(config.connect_backoff_max(), Duration::from_millis(5_000));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }
}
