//! Discovery protocol state machine
//!
//! The reply channel to the discovery service is strict alternation: one
//! request, then its matching reply, before the next request may go out.
//! [`DiscoveryProtocol`] owns that invariant.

mod protocol;

pub use protocol::{DiscoveryProtocol, PendingRequest, ProtocolState, Reply, Request, RequestKind};
