//! Topic-prefix subscription filter

use tracing::debug;

/// Set of subscribed topic prefixes
///
/// A payload passes iff one of the subscribed prefixes is a byte prefix of it.
/// With no subscriptions nothing passes; the empty prefix passes everything.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    prefixes: Vec<Vec<u8>>,
}

impl TopicFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix; returns false if it was already subscribed
    pub fn subscribe(&mut self, topic: &str) -> bool {
        let prefix = topic.as_bytes().to_vec();
        if self.prefixes.contains(&prefix) {
            return false;
        }
        debug!(%topic, "TopicFilter::subscribe");
        self.prefixes.push(prefix);
        true
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        self.prefixes.iter().any(|p| payload.starts_with(p))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
