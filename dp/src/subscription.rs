//! Subscription request sent by a downstream subscriber
//!
//! The first frame a subscriber writes after connecting to a broker's publish
//! port names the topic prefixes it wants. The broker only forwards frames
//! whose payload starts with one of them.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::messages::{SCHEMA_VERSION, check_version};

/// Topic prefixes a subscriber wants delivered
///
/// An empty list receives nothing; the empty prefix `""` receives everything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub version: u32,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Subscription {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: SCHEMA_VERSION,
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    /// Subscription to every topic
    pub fn all() -> Self {
        Self::new([""])
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let sub: Self = serde_json::from_slice(bytes)?;
        check_version(sub.version)?;
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let json = String::from_utf8(Subscription::new(["weather", "humidity"]).encode().unwrap()).unwrap();
        assert_eq!(json, r#"{"version":1,"topics":["weather","humidity"]}"#);
    }

    #[test]
    fn test_missing_topics_is_empty() {
        let sub = Subscription::decode(br#"{"version":1}"#).unwrap();
        assert!(sub.topics.is_empty());
    }

    #[test]
    fn test_all_is_empty_prefix() {
        assert_eq!(Subscription::all().topics, vec![String::new()]);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let err = Subscription::decode(br#"{"version":3,"topics":[]}"#).unwrap_err();
        assert!(matches!(err, CodecError::VersionMismatch { expected: 1, actual: 3 }));
    }
}
