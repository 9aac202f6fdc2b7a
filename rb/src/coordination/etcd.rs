//! etcd-backed coordination store

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use etcd_client::{Client, EventType};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::CoordinationConfig;
use super::store::{CoordinationError, CoordinationStore, KeyWatch, WatchGuard};

const WATCH_BUFFER: usize = 16;

/// Coordination store backed by an etcd cluster
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to etcd with exponential backoff
    pub async fn connect(config: &CoordinationConfig) -> Result<Self, CoordinationError> {
        let backoff = ExponentialBackoff {
            initial_interval: config.connect_backoff_initial(),
            max_interval: config.connect_backoff_max(),
            max_elapsed_time: Some(config.connect_timeout()),
            ..Default::default()
        };
        let endpoints = config.endpoints.clone();

        let client = retry(backoff, || {
            let endpoints = endpoints.clone();
            async move {
                match Client::connect(&endpoints, None).await {
                    Ok(client) => {
                        debug!("Connected to etcd");
                        Ok(client)
                    }
                    Err(e) => {
                        warn!(error = %e, "etcd connection failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        })
        .await
        .map_err(|e| CoordinationError::Unavailable(format!("failed to connect to etcd after retries: {}", e)))?;

        info!(endpoints = ?config.endpoints, "Coordination store connected");
        Ok(Self { client })
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<String, CoordinationError> {
        let mut client = self.client.clone();
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| CoordinationError::Unavailable(e.to_string()))?;

        let kv = resp
            .kvs()
            .first()
            .ok_or_else(|| CoordinationError::KeyMissing(key.to_string()))?;

        let value = kv.value_str().map_err(|e| CoordinationError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        Ok(value.to_string())
    }

    async fn watch(&self, key: &str) -> Result<KeyWatch, CoordinationError> {
        let mut client = self.client.clone();
        let (watcher, mut stream) = client
            .watch(key, None)
            .await
            .map_err(|e| CoordinationError::Unavailable(e.to_string()))?;
        debug!(%key, "Watch stream established");

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let watched = key.to_string();

        let task = tokio::spawn(async move {
            // dropping the watcher closes the request side of the stream
            let _watcher = watcher;
            loop {
                let resp = match stream.message().await {
                    Ok(Some(resp)) => resp,
                    Ok(None) => {
                        warn!(key = %watched, "Watch stream closed");
                        return;
                    }
                    Err(e) => {
                        error!(key = %watched, error = %e, "Watch stream failed");
                        let _ = tx.send(Err(CoordinationError::Unavailable(e.to_string()))).await;
                        return;
                    }
                };

                if resp.canceled() {
                    warn!(key = %watched, reason = %resp.cancel_reason(), "Watch canceled by server");
                    let reason = format!("watch on {} canceled: {}", watched, resp.cancel_reason());
                    let _ = tx.send(Err(CoordinationError::Unavailable(reason))).await;
                    return;
                }

                for event in resp.events() {
                    match event.event_type() {
                        EventType::Put => {
                            let Some(kv) = event.kv() else { continue };
                            match kv.value_str() {
                                Ok(value) => {
                                    if tx.send(Ok(value.to_string())).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!(key = %watched, error = %e, "Ignoring non-UTF-8 value"),
                            }
                        }
                        EventType::Delete => {
                            warn!(key = %watched, "Watched key deleted");
                            return;
                        }
                    }
                }
            }
        });

        Ok(KeyWatch::new(key, rx, WatchGuard::new(task)))
    }
}
