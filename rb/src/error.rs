//! Broker error types

use std::time::Duration;

use discoproto::CodecError;
use thiserror::Error;

use crate::coordination::CoordinationError;
use crate::discovery::RequestKind;

/// Errors surfaced by the broker core
///
/// Every public operation returns these explicitly; [`BrokerError::is_fatal`]
/// tells the event loop whether to stop or log and continue.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Coordination service unavailable: {0}")]
    CoordinationUnavailable(String),

    #[error("Coordination key missing: {0}")]
    KeyMissing(String),

    #[error("Discovery endpoint watch lost: {0}")]
    WatchLost(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{kind} request (seq {seq}) orphaned by discovery endpoint migration")]
    EndpointMigrationRace { kind: RequestKind, seq: u64 },

    #[error("Cannot send request: {pending} still outstanding")]
    RequestOutstanding { pending: RequestKind },

    #[error("Reply channel lost: {0}")]
    ReplyChannelLost(String),

    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("Gave up waiting for leadership after {0:?}")]
    LeaderWaitExpired(Duration),

    #[error("Leader gate aborted by shutdown")]
    GateAborted,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl BrokerError {
    /// Check if this error must stop the event loop
    pub fn is_fatal(&self) -> bool {
        match self {
            BrokerError::EndpointMigrationRace { .. } => false,
            BrokerError::RequestOutstanding { .. } => false,
            BrokerError::ReplyChannelLost(_) => false,
            BrokerError::WatchLost(_) => true,
            BrokerError::CoordinationUnavailable(_) => true,
            BrokerError::KeyMissing(_) => true,
            BrokerError::ProtocolViolation(_) => true,
            BrokerError::Serialization(_) => true,
            BrokerError::RegistrationRejected(_) => true,
            BrokerError::LeaderWaitExpired(_) => true,
            BrokerError::GateAborted => true,
            BrokerError::InvalidEndpoint(_) => true,
            BrokerError::Transport(_) => true,
        }
    }
}

impl From<CodecError> for BrokerError {
    fn from(e: CodecError) -> Self {
        if e.is_malformed() {
            BrokerError::Serialization(e.to_string())
        } else {
            BrokerError::Transport(e.to_string())
        }
    }
}

impl From<CoordinationError> for BrokerError {
    fn from(e: CoordinationError) -> Self {
        match e {
            CoordinationError::Unavailable(msg) => BrokerError::CoordinationUnavailable(msg),
            CoordinationError::KeyMissing(key) => BrokerError::KeyMissing(key),
            CoordinationError::InvalidValue { key, reason } => {
                BrokerError::CoordinationUnavailable(format!("unreadable value at {}: {}", key, reason))
            }
        }
    }
}
