//! Broker identity and topic set

use std::fmt;

use serde::{Deserialize, Serialize};

/// Advertised address and publish port of this broker
///
/// Its string form `"<addr> <port>"` is what the leader record holds for the
/// active broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerIdentity {
    addr: String,
    port: u16,
}

impl BrokerIdentity {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The leader-record form of this identity
    pub fn leader_string(&self) -> String {
        format!("{} {}", self.addr, self.port)
    }

    /// Byte-for-byte comparison against a leader record
    pub fn matches_record(&self, record: &str) -> bool {
        self.leader_string().as_bytes() == record.as_bytes()
    }
}

impl fmt::Display for BrokerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.addr, self.port)
    }
}

/// Topics the broker subscribes to on behalf of downstream consumers
///
/// Fixed for the broker's lifetime. Duplicates are dropped, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    topics: Vec<String>,
}

impl TopicSet {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }
        Self { topics: unique }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.topics.clone()
    }
}
