//! DiscoProto - wire schema for the pub/sub discovery service
//!
//! Every party that talks to the discovery service (publishers, subscribers,
//! brokers) exchanges strictly alternating request/reply envelopes defined here.
//!
//! # Wire format
//!
//! ```text
//! +----------------+---------------------------+
//! | u32 BE length  | JSON envelope (versioned) |
//! +----------------+---------------------------+
//! ```
//!
//! The same length-prefixed framing carries the opaque topic-prefixed payloads
//! on the broadcast and relay-input channels. A subscriber opens its broadcast
//! connection with one [`Subscription`] frame naming the prefixes it wants.
//!
//! # Example
//!
//! ```ignore
//! use discoproto::{DiscoveryReq, RegistrantInfo};
//!
//! let info = RegistrantInfo::new("broker", "10.0.0.5", 5570);
//! let bytes = DiscoveryReq::register_broker(info, vec!["weather".into()]).encode()?;
//! ```

pub mod error;
pub mod frame;
pub mod messages;
pub mod subscription;

pub use error::CodecError;
pub use frame::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{
    DiscoveryReq, DiscoveryResp, IsReadyReq, IsReadyResp, LookupPubsReq, LookupPubsResp, MsgType, RegisterReq,
    RegisterResp, RegistrantInfo, Role, SCHEMA_VERSION, Status,
};
pub use subscription::Subscription;
