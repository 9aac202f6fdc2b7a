//! Discovery request/response envelopes
//!
//! An outer envelope carries the schema version, a message-type tag and at most
//! one populated body matching that tag.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::CodecError;

/// Version stamped into every envelope
pub const SCHEMA_VERSION: u32 = 1;

/// Role a registrant plays in the pub/sub system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "ROLE_PUBLISHER")]
    Publisher,
    #[serde(rename = "ROLE_SUBSCRIBER")]
    Subscriber,
    /// Brokers publish to subscribers and subscribe to publishers
    #[serde(rename = "ROLE_BOTH")]
    Both,
}

/// Message-type tag of an envelope
///
/// Tags unknown to this build decode as [`MsgType::Unknown`] so callers can
/// reject them as protocol violations instead of decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Register,
    IsReady,
    LookupAllPubs,
    Unknown,
}

impl MsgType {
    /// Wire tag for this type
    pub fn as_tag(&self) -> &'static str {
        match self {
            MsgType::Register => "TYPE_REGISTER",
            MsgType::IsReady => "TYPE_ISREADY",
            MsgType::LookupAllPubs => "TYPE_LOOKUP_ALL_PUBS",
            MsgType::Unknown => "TYPE_UNKNOWN",
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "TYPE_REGISTER" => MsgType::Register,
            "TYPE_ISREADY" => MsgType::IsReady,
            "TYPE_LOOKUP_ALL_PUBS" => MsgType::LookupAllPubs,
            other => {
                debug!(tag = %other, "MsgType::from_tag: unrecognised tag");
                MsgType::Unknown
            }
        }
    }
}

impl Serialize for MsgType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for MsgType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(MsgType::from_tag(&tag))
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Outcome of a registration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    #[serde(rename = "STATUS_SUCCESS")]
    Success,
    #[serde(rename = "STATUS_FAILURE")]
    Failure,
}

/// Whereabouts of a registrant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RegistrantInfo {
    pub id: String,
    pub addr: String,
    pub port: u16,
}

impl RegistrantInfo {
    pub fn new(id: impl Into<String>, addr: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterReq {
    pub role: Role,
    pub info: RegistrantInfo,
    #[serde(default)]
    pub topiclist: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IsReadyReq {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupPubsReq {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResp {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IsReadyResp {
    pub status: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupPubsResp {
    #[serde(default)]
    pub publishers: Vec<RegistrantInfo>,
}

/// Request envelope sent to the discovery service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryReq {
    pub version: u32,
    pub msg_type: MsgType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_req: Option<RegisterReq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isready_req: Option<IsReadyReq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubs_req: Option<LookupPubsReq>,
}

impl DiscoveryReq {
    fn empty(msg_type: MsgType) -> Self {
        Self {
            version: SCHEMA_VERSION,
            msg_type,
            register_req: None,
            isready_req: None,
            pubs_req: None,
        }
    }

    /// Registration request for any role
    pub fn register(role: Role, info: RegistrantInfo, topiclist: Vec<String>) -> Self {
        Self {
            register_req: Some(RegisterReq { role, info, topiclist }),
            ..Self::empty(MsgType::Register)
        }
    }

    /// Registration request for a broker (role = both)
    pub fn register_broker(info: RegistrantInfo, topiclist: Vec<String>) -> Self {
        Self::register(Role::Both, info, topiclist)
    }

    pub fn is_ready() -> Self {
        Self {
            isready_req: Some(IsReadyReq {}),
            ..Self::empty(MsgType::IsReady)
        }
    }

    pub fn lookup_all_pubs() -> Self {
        Self {
            pubs_req: Some(LookupPubsReq {}),
            ..Self::empty(MsgType::LookupAllPubs)
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let req: Self = serde_json::from_slice(bytes)?;
        check_version(req.version)?;
        Ok(req)
    }
}

/// Response envelope returned by the discovery service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryResp {
    pub version: u32,
    pub msg_type: MsgType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_resp: Option<RegisterResp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isready_resp: Option<IsReadyResp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubs_resp: Option<LookupPubsResp>,
}

impl DiscoveryResp {
    fn empty(msg_type: MsgType) -> Self {
        Self {
            version: SCHEMA_VERSION,
            msg_type,
            register_resp: None,
            isready_resp: None,
            pubs_resp: None,
        }
    }

    pub fn register_ok() -> Self {
        Self {
            register_resp: Some(RegisterResp {
                status: Status::Success,
                reason: None,
            }),
            ..Self::empty(MsgType::Register)
        }
    }

    pub fn register_failed(reason: impl Into<String>) -> Self {
        Self {
            register_resp: Some(RegisterResp {
                status: Status::Failure,
                reason: Some(reason.into()),
            }),
            ..Self::empty(MsgType::Register)
        }
    }

    pub fn ready(status: bool) -> Self {
        Self {
            isready_resp: Some(IsReadyResp { status }),
            ..Self::empty(MsgType::IsReady)
        }
    }

    pub fn publishers(publishers: Vec<RegistrantInfo>) -> Self {
        Self {
            pubs_resp: Some(LookupPubsResp { publishers }),
            ..Self::empty(MsgType::LookupAllPubs)
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let resp: Self = serde_json::from_slice(bytes)?;
        check_version(resp.version)?;
        Ok(resp)
    }
}

pub(crate) fn check_version(actual: u32) -> Result<(), CodecError> {
    if actual != SCHEMA_VERSION {
        return Err(CodecError::VersionMismatch {
            expected: SCHEMA_VERSION,
            actual,
        });
    }
    Ok(())
}
