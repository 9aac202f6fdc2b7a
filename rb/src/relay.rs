//! Relay engine
//!
//! Republishes each relay-input message on the broadcast channel, unmodified,
//! one at a time.

use tracing::trace;

use crate::transport::{BroadcastChannel, RelayMessage};

/// Relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub messages: u64,
    pub bytes: u64,
}

/// Verbatim forwarder from relay input to broadcast
pub struct RelayEngine {
    broadcast: BroadcastChannel,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new(broadcast: BroadcastChannel) -> Self {
        Self {
            broadcast,
            stats: RelayStats::default(),
        }
    }

    /// Publish `message` as received; returns the subscribers it reached
    pub fn forward(&mut self, message: RelayMessage) -> usize {
        let subscribers = self.broadcast.publish(message.as_bytes());
        self.stats.messages += 1;
        self.stats.bytes += message.len() as u64;
        trace!(len = message.len(), subscribers, "RelayEngine::forward");
        subscribers
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn broadcast(&self) -> &BroadcastChannel {
        &self.broadcast
    }
}
