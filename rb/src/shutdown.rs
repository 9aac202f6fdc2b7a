//! Cooperative shutdown flag
//!
//! Checked once per leader-gate attempt and once per completed event-loop
//! iteration. Clearing it never cancels work mid-iteration: it only wakes a
//! wait that would otherwise block, so the loop reaches its next check.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::debug;

/// Shared "keep handling events" flag
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownFlag {
    /// Create a flag in the running state
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request the loop to stop after its current iteration
    pub fn stop(&self) {
        debug!("ShutdownFlag::stop: called");
        self.running.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolve once [`ShutdownFlag::stop`] has been called
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(other.is_running());

        flag.stop();
        assert!(!other.is_running());
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiter() {
        let flag = ShutdownFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_after_stop_returns_immediately() {
        let flag = ShutdownFlag::new();
        flag.stop();
        tokio::time::timeout(Duration::from_millis(100), flag.stopped())
            .await
            .unwrap();
    }
}
