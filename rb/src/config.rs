//! RelayBroker configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordination::{Backend, CoordinationConfig};
use crate::dispatcher::DispatcherConfig;
use crate::identity::{BrokerIdentity, TopicSet};
use crate::leader::LeaderGateConfig;
use crate::transport::TransportConfig;

/// Main RelayBroker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Broker identity and topics
    pub broker: BrokerConfig,

    /// Coordination service
    pub coordination: CoordinationConfig,

    /// Leader gate backoff
    #[serde(rename = "leader-gate")]
    pub leader_gate: LeaderGateConfig,

    /// Event loop timeouts
    pub dispatcher: DispatcherConfig,

    /// Channel buffer sizes
    pub transport: TransportConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.broker.addr.is_empty() {
            return Err(eyre::eyre!("broker.addr must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(eyre::eyre!("broker.port must be a non-zero publish port"));
        }
        if self.broker.topics.is_empty() {
            return Err(eyre::eyre!("broker.topics must name at least one topic"));
        }
        if self.coordination.backend == Backend::Etcd && self.coordination.endpoints.is_empty() {
            return Err(eyre::eyre!("coordination.endpoints must list at least one etcd endpoint"));
        }
        if self.leader_gate.max_backoff_ms < self.leader_gate.initial_backoff_ms {
            return Err(eyre::eyre!(
                "leader-gate.max-backoff-ms ({}) is below initial-backoff-ms ({})",
                self.leader_gate.max_backoff_ms,
                self.leader_gate.initial_backoff_ms
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .relaybroker.yml
        let local_config = PathBuf::from(".relaybroker.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/relaybroker/relaybroker.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("relaybroker").join("relaybroker.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Broker identity and subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name registered with the discovery service
    pub name: String,

    /// Advertised address, as written in the leader record
    pub addr: String,

    /// Publish port for downstream subscribers
    pub port: u16,

    /// Topics relayed on behalf of subscribers
    pub topics: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "broker".to_string(),
            addr: "localhost".to_string(),
            port: 5570,
            topics: Vec::new(),
        }
    }
}

impl BrokerConfig {
    pub fn identity(&self) -> BrokerIdentity {
        BrokerIdentity::new(self.addr.clone(), self.port)
    }

    pub fn topic_set(&self) -> TopicSet {
        TopicSet::new(self.topics.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn valid() -> Config {
        let mut config = Config::default();
        config.broker.topics = vec!["weather".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.broker.name, "broker");
        assert_eq!(config.broker.addr, "localhost");
        assert_eq!(config.broker.port, 5570);
        assert!(config.log_level.is_none());
        assert_eq!(config.coordination.leader_key, "/curbroker");
        assert_eq!(config.leader_gate.log_every, 5);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("relaybroker.yml");
        fs::write(
            &path,
            r#"
log-level: debug
broker:
  addr: 10.0.0.5
  port: 5570
  topics: [temperature, humidity]
coordination:
  endpoints: ["http://10.0.0.2:2379"]
leader-gate:
  max-wait-secs: 30
dispatcher:
  ready-retry-ms: 500
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.broker.identity().leader_string(), "10.0.0.5 5570");
        assert_eq!(config.broker.topic_set().len(), 2);
        assert_eq!(config.broker.name, "broker");
        assert_eq!(config.coordination.endpoints, vec!["http://10.0.0.2:2379"]);
        assert_eq!(config.leader_gate.max_wait(), Some(Duration::from_secs(30)));
        assert_eq!(config.dispatcher.ready_retry(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "broker: [not, a, map]").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.broker.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.broker.addr.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.coordination.endpoints.clear();
        assert!(config.validate().is_err());
        config.coordination.backend = Backend::Memory;
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.leader_gate.initial_backoff_ms = 5_000;
        assert!(config.validate().is_err());
    }
}
