//! Transport layer
//!
//! Three TCP endpoints, all carrying length-prefixed frames:
//! - **Reply channel:** request/reply connection to the discovery service
//! - **Broadcast channel:** bound on the publish port, fans frames out to subscribers
//! - **Relay-input channel:** connections to upstream publishers, topic-prefix filtered

mod broadcast;
mod relay_input;
mod reply;
mod topic;

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

pub use broadcast::BroadcastChannel;
pub use relay_input::{RelayInput, RelayMessage};
pub use reply::ReplyChannel;
pub use topic::TopicFilter;

/// Channel buffer sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Frames buffered per downstream subscriber before it starts lagging
    #[serde(rename = "broadcast-capacity", default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Inbound publisher frames buffered ahead of the relay engine
    #[serde(rename = "relay-buffer", default = "default_relay_buffer")]
    pub relay_buffer: usize,

    /// Reply frames buffered from the discovery service
    #[serde(rename = "reply-buffer", default = "default_reply_buffer")]
    pub reply_buffer: usize,
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_relay_buffer() -> usize {
    1024
}

fn default_reply_buffer() -> usize {
    16
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            relay_buffer: default_relay_buffer(),
            reply_buffer: default_reply_buffer(),
        }
    }
}

/// Split an endpoint URL (`tcp://host:port` or `host:port`) into host and port
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16), BrokerError> {
    let invalid = || BrokerError::InvalidEndpoint(endpoint.to_string());

    let rest = match endpoint.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => endpoint,
    };

    let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}
