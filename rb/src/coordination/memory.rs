//! In-process coordination store

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, warn};

use super::store::{CoordinationError, CoordinationStore, KeyWatch, WatchGuard};

/// Change notification fanned out to watch tasks
#[derive(Debug, Clone)]
enum Change {
    Put(String, String),
    Delete(String),
    Outage,
}

const CHANGE_CAPACITY: usize = 64;
const WATCH_BUFFER: usize = 16;

/// Key-value store with change notification, shared by clones
#[derive(Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<Change>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            changes,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Write a key and notify watchers
    pub async fn set(&self, key: &str, value: &str) {
        debug!(%key, %value, "MemoryStore::set: called");
        self.values.lock().await.insert(key.to_string(), value.to_string());
        let _ = self.changes.send(Change::Put(key.to_string(), value.to_string()));
    }

    /// Remove a key; watchers of it are ended
    pub async fn delete(&self, key: &str) {
        debug!(%key, "MemoryStore::delete: called");
        self.values.lock().await.remove(key);
        let _ = self.changes.send(Change::Delete(key.to_string()));
    }

    /// Simulate the service going away or coming back
    ///
    /// Going away also fails every open watch.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
        if !available {
            let _ = self.changes.send(Change::Outage);
        }
    }

    fn check_available(&self) -> Result<(), CoordinationError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoordinationError::Unavailable("memory store marked unavailable".to_string()))
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<String, CoordinationError> {
        self.check_available()?;
        self.values
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CoordinationError::KeyMissing(key.to_string()))
    }

    async fn watch(&self, key: &str) -> Result<KeyWatch, CoordinationError> {
        self.check_available()?;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut changes = self.changes.subscribe();
        let watched = key.to_string();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(Change::Put(key, value)) if key == watched => {
                        if tx.send(Ok(value)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Change::Delete(key)) if key == watched => {
                        debug!(key = %watched, "MemoryStore watch: key deleted");
                        break;
                    }
                    Ok(Change::Outage) => {
                        let reason = format!("memory store went away while watching {}", watched);
                        let _ = tx.send(Err(CoordinationError::Unavailable(reason))).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(key = %watched, skipped, "MemoryStore watch lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(KeyWatch::new(key, rx, WatchGuard::new(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MemoryStore::new();
        let err = store.get("/curbroker").await.unwrap_err();
        assert_eq!(err, CoordinationError::KeyMissing("/curbroker".to_string()));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        store.set("/curbroker", "localhost 5570").await;
        assert_eq!(store.get("/curbroker").await.unwrap(), "localhost 5570");
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set("/curbroker", "localhost 5570").await;
        store.set_available(false);

        assert!(matches!(
            store.get("/curbroker").await,
            Err(CoordinationError::Unavailable(_))
        ));
        assert!(matches!(
            store.watch("/curbroker").await,
            Err(CoordinationError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.get("/curbroker").await.is_ok());
    }

    #[tokio::test]
    async fn test_watch_sees_only_its_key() {
        let store = MemoryStore::new();
        let mut watch = store.watch("/curDiscovery").await.unwrap();

        store.set("/curbroker", "10.0.0.5 5570").await;
        store.set("/curDiscovery", "tcp://10.0.0.2:5555").await;

        let value = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.as_deref(), Some("tcp://10.0.0.2:5555"));
    }

    #[tokio::test]
    async fn test_watch_ends_on_delete() {
        let store = MemoryStore::new();
        store.set("/curDiscovery", "tcp://localhost:5555").await;
        let mut watch = store.watch("/curDiscovery").await.unwrap();

        store.delete("/curDiscovery").await;

        let value = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert_eq!(value, Ok(None));
    }

    #[tokio::test]
    async fn test_outage_fails_watch() {
        let store = MemoryStore::new();
        let mut watch = store.watch("/curDiscovery").await.unwrap();

        store.set_available(false);

        let value = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert!(matches!(value, Err(CoordinationError::Unavailable(_))));
        assert_eq!(watch.changed().await, Ok(None));
    }

    #[tokio::test]
    async fn test_cancelled_watch_stops_delivering() {
        let store = MemoryStore::new();
        let mut watch = store.watch("/curDiscovery").await.unwrap();
        assert!(watch.cancel());

        store.set("/curDiscovery", "tcp://10.0.0.3:5555").await;

        let value = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert_eq!(value, Ok(None));
    }
}
