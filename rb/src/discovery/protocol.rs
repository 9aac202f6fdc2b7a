//! Request/reply envelopes and the state machine that sequences them

use std::fmt;

use discoproto::{DiscoveryReq, DiscoveryResp, IsReadyResp, LookupPubsResp, MsgType, RegisterResp, RegistrantInfo, Status};
use tracing::{debug, warn};

use crate::error::BrokerError;

/// The three requests the broker sends to the discovery service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Register,
    IsReady,
    LookupAllPublishers,
}

impl RequestKind {
    fn matches(&self, msg_type: MsgType) -> bool {
        matches!(
            (self, msg_type),
            (RequestKind::Register, MsgType::Register)
                | (RequestKind::IsReady, MsgType::IsReady)
                | (RequestKind::LookupAllPublishers, MsgType::LookupAllPubs)
        )
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Register => "REGISTER",
            RequestKind::IsReady => "IS_READY",
            RequestKind::LookupAllPublishers => "LOOKUP_ALL_PUBLISHERS",
        };
        write!(f, "{}", name)
    }
}

/// Protocol progress with the discovery service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Init,
    AwaitRegisterReply,
    Registered,
    AwaitIsReadyReply,
    Ready,
    AwaitPublishersReply,
}

impl ProtocolState {
    fn awaiting(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Register => ProtocolState::AwaitRegisterReply,
            RequestKind::IsReady => ProtocolState::AwaitIsReadyReply,
            RequestKind::LookupAllPublishers => ProtocolState::AwaitPublishersReply,
        }
    }
}

/// A request outstanding on the reply channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    /// Per-protocol sequence number, starting at 1
    pub seq: u64,
    /// Reply-channel connection generation the request was sent on
    pub generation: u64,
}

/// An outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { info: RegistrantInfo, topics: Vec<String> },
    IsReady,
    LookupAllPublishers,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Register { .. } => RequestKind::Register,
            Request::IsReady => RequestKind::IsReady,
            Request::LookupAllPublishers => RequestKind::LookupAllPublishers,
        }
    }

    /// The wire envelope for this request
    pub fn envelope(&self) -> DiscoveryReq {
        match self {
            Request::Register { info, topics } => DiscoveryReq::register_broker(info.clone(), topics.clone()),
            Request::IsReady => DiscoveryReq::is_ready(),
            Request::LookupAllPublishers => DiscoveryReq::lookup_all_pubs(),
        }
    }
}

/// A demultiplexed reply, one variant per upcall
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Register(RegisterResp),
    IsReady(IsReadyResp),
    Publishers(LookupPubsResp),
}

/// Strict-alternation state machine for the discovery reply channel
#[derive(Debug)]
pub struct DiscoveryProtocol {
    state: ProtocolState,
    pending: Option<PendingRequest>,
    /// State to return to if the pending request is orphaned
    before_pending: ProtocolState,
    last_seq: u64,
}

impl Default for DiscoveryProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryProtocol {
    pub fn new() -> Self {
        Self {
            state: ProtocolState::Init,
            pending: None,
            before_pending: ProtocolState::Init,
            last_seq: 0,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// True when a request may be sent
    pub fn can_send(&self) -> bool {
        self.pending.is_none()
    }

    /// Check a request against the current state without committing it
    pub fn check(&self, request: &Request) -> Result<(), BrokerError> {
        if let Some(pending) = self.pending {
            return Err(BrokerError::RequestOutstanding { pending: pending.kind });
        }

        let allowed = match request.kind() {
            RequestKind::Register => self.state == ProtocolState::Init,
            RequestKind::IsReady => matches!(self.state, ProtocolState::Registered | ProtocolState::Ready),
            RequestKind::LookupAllPublishers => self.state == ProtocolState::Ready,
        };
        if !allowed {
            return Err(BrokerError::ProtocolViolation(format!(
                "{} not allowed in state {:?}",
                request.kind(),
                self.state
            )));
        }
        Ok(())
    }

    /// Encode `request` and record it as pending on connection `generation`
    ///
    /// Nothing changes if the request is refused.
    pub fn begin(&mut self, request: &Request, generation: u64) -> Result<Vec<u8>, BrokerError> {
        self.check(request)?;
        let bytes = request.envelope().encode()?;

        self.last_seq += 1;
        let pending = PendingRequest {
            kind: request.kind(),
            seq: self.last_seq,
            generation,
        };
        debug!(kind = %pending.kind, seq = pending.seq, generation, state = ?self.state, "DiscoveryProtocol::begin");

        self.before_pending = self.state;
        self.state = ProtocolState::awaiting(pending.kind);
        self.pending = Some(pending);
        Ok(bytes)
    }

    /// Decode one reply, match it to the pending request and advance
    ///
    /// Unsolicited replies, unknown tags, mismatched kinds and missing bodies
    /// are protocol violations; undecodable bytes are serialization errors.
    pub fn handle_reply(&mut self, bytes: &[u8]) -> Result<Reply, BrokerError> {
        let Some(pending) = self.pending.take() else {
            return Err(BrokerError::ProtocolViolation(
                "reply received with no request outstanding".to_string(),
            ));
        };

        let resp = DiscoveryResp::decode(bytes)?;

        if resp.msg_type == MsgType::Unknown {
            return Err(BrokerError::ProtocolViolation(format!(
                "unrecognized response tag for {} request (seq {})",
                pending.kind, pending.seq
            )));
        }
        if !pending.kind.matches(resp.msg_type) {
            return Err(BrokerError::ProtocolViolation(format!(
                "expected {} reply, got {}",
                pending.kind, resp.msg_type
            )));
        }

        let missing_body = || BrokerError::ProtocolViolation(format!("{} reply carries no body", resp.msg_type));

        let reply = match pending.kind {
            RequestKind::Register => {
                let body = resp.register_resp.clone().ok_or_else(missing_body)?;
                self.state = match body.status {
                    Status::Success => ProtocolState::Registered,
                    Status::Failure => ProtocolState::Init,
                };
                Reply::Register(body)
            }
            RequestKind::IsReady => {
                let body = resp.isready_resp.clone().ok_or_else(missing_body)?;
                self.state = if body.status {
                    ProtocolState::Ready
                } else {
                    ProtocolState::Registered
                };
                Reply::IsReady(body)
            }
            RequestKind::LookupAllPublishers => {
                let body = resp.pubs_resp.clone().ok_or_else(missing_body)?;
                self.state = ProtocolState::Ready;
                Reply::Publishers(body)
            }
        };

        debug!(kind = %pending.kind, seq = pending.seq, state = ?self.state, "DiscoveryProtocol::handle_reply");
        Ok(reply)
    }

    /// Drop the pending request, restoring the state it was sent from
    ///
    /// Used when the reply can no longer arrive (endpoint migrated, channel
    /// lost). The caller decides whether to re-issue.
    pub fn orphan_pending(&mut self) -> Option<PendingRequest> {
        let pending = self.pending.take()?;
        warn!(kind = %pending.kind, seq = pending.seq, generation = pending.generation, "Pending request orphaned");
        self.state = self.before_pending;
        Some(pending)
    }
}
