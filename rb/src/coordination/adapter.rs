//! Keyed access to the leader record and discovery endpoint

use std::sync::Arc;

use tracing::debug;

use super::config::CoordinationConfig;
use super::store::{CoordinationError, CoordinationStore, KeyWatch};

/// Coordination client adapter
///
/// Cloneable; all clones share the same backend connection.
#[derive(Clone)]
pub struct Coordination {
    store: Arc<dyn CoordinationStore>,
    leader_key: String,
    discovery_key: String,
}

impl Coordination {
    pub fn new(store: Arc<dyn CoordinationStore>, config: &CoordinationConfig) -> Self {
        Self {
            store,
            leader_key: config.leader_key.clone(),
            discovery_key: config.discovery_key.clone(),
        }
    }

    pub fn leader_key(&self) -> &str {
        &self.leader_key
    }

    pub fn discovery_key(&self) -> &str {
        &self.discovery_key
    }

    /// Current `"<addr> <port>"` of the active broker
    pub async fn get_leader_record(&self) -> Result<String, CoordinationError> {
        let record = self.store.get(&self.leader_key).await?;
        debug!(%record, "Coordination::get_leader_record: fetched");
        Ok(record)
    }

    /// Current discovery service URL
    pub async fn get_discovery_endpoint(&self) -> Result<String, CoordinationError> {
        let endpoint = self.store.get(&self.discovery_key).await?;
        debug!(%endpoint, "Coordination::get_discovery_endpoint: fetched");
        Ok(endpoint)
    }

    /// Subscribe to discovery endpoint changes
    pub async fn watch_discovery_endpoint(&self) -> Result<KeyWatch, CoordinationError> {
        debug!(key = %self.discovery_key, "Coordination::watch_discovery_endpoint: called");
        self.store.watch(&self.discovery_key).await
    }
}
