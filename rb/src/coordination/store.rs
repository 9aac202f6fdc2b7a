//! Coordination store trait and watch subscription

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Errors from coordination-service access
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("Coordination service unreachable: {0}")]
    Unavailable(String),

    #[error("Key not found: {0}")]
    KeyMissing(String),

    #[error("Invalid value at {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Read/watch access to string-valued keys
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read the current value of a key
    async fn get(&self, key: &str) -> Result<String, CoordinationError>;

    /// Subscribe to changes of a key
    ///
    /// The returned watch yields each new value until the key is deleted,
    /// the backend stream ends, or the watch is cancelled. A backend failure
    /// is delivered as the watch's last item.
    async fn watch(&self, key: &str) -> Result<KeyWatch, CoordinationError>;
}

/// Cancellation handle for a watch
///
/// Cancelling is idempotent; dropping the guard cancels the watch.
#[derive(Debug)]
pub struct WatchGuard {
    task: Option<JoinHandle<()>>,
}

impl WatchGuard {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Stop delivering changes. Returns false if already cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                debug!("WatchGuard::cancel: aborting watch task");
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One item delivered by a watch task
pub type WatchItem = Result<String, CoordinationError>;

/// Live subscription to one key
#[derive(Debug)]
pub struct KeyWatch {
    key: String,
    rx: mpsc::Receiver<WatchItem>,
    guard: WatchGuard,
}

impl KeyWatch {
    pub fn new(key: impl Into<String>, rx: mpsc::Receiver<WatchItem>, guard: WatchGuard) -> Self {
        Self {
            key: key.into(),
            rx,
            guard,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next value
    ///
    /// `Ok(None)` means the watch ended normally (key deleted, stream closed,
    /// cancelled); `Err` means the coordination service failed underneath it.
    pub async fn changed(&mut self) -> Result<Option<String>, CoordinationError> {
        self.rx.recv().await.transpose()
    }

    pub fn cancel(&mut self) -> bool {
        self.guard.cancel()
    }
}
