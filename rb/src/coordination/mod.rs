//! Coordination-service adapter
//!
//! Read and watch access to the externally written keys the broker depends on:
//! - **Leader record:** `"<addr> <port>"` of the active broker, polled
//! - **Discovery endpoint:** URL of the discovery service, watched for changes
//!
//! The broker never writes either key.

mod adapter;
mod config;
mod etcd;
mod memory;
mod store;

use std::sync::Arc;

use tracing::info;

pub use adapter::Coordination;
pub use config::{Backend, CoordinationConfig};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use store::{CoordinationError, CoordinationStore, KeyWatch, WatchGuard, WatchItem};

/// Connect to the configured coordination backend
pub async fn connect(config: &CoordinationConfig) -> Result<Coordination, CoordinationError> {
    let store: Arc<dyn CoordinationStore> = match config.backend {
        Backend::Etcd => Arc::new(EtcdStore::connect(config).await?),
        Backend::Memory => {
            info!(keys = config.seed.len(), "Using in-memory coordination store");
            let store = MemoryStore::new();
            for (key, value) in &config.seed {
                store.set(key, value).await;
            }
            Arc::new(store)
        }
    };

    Ok(Coordination::new(store, config))
}
