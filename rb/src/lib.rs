//! RelayBroker - leader-elected pub/sub relay
//!
//! A single active broker accepts topic-stamped messages from upstream
//! publishers and rebroadcasts them to downstream subscribers. Which instance is
//! active is decided outside the broker and published in a coordination service
//! (etcd); the broker also tracks the discovery service's current location there.
//!
//! # Control flow
//!
//! ```text
//! LeaderGate ──► register with discovery ──► EventDispatcher loop
//!     ▲                                         │  ▲
//!     └──── Coordination (leader record)         │  └── endpoint watch (migration)
//!                                               ▼
//!                             reply channel / relay input ──► RelayEngine ──► broadcast
//! ```
//!
//! # Modules
//!
//! - [`coordination`] - Coordination-service adapter (etcd, in-memory)
//! - [`leader`] - Blocking leader gate with bounded backoff
//! - [`discovery`] - Strict-alternation request/reply state machine
//! - [`transport`] - Reply, broadcast and relay-input channels
//! - [`dispatcher`] - Single-threaded reactor and upcall interface
//! - [`relay`] - Verbatim forwarding from relay input to broadcast
//! - [`app`] - Default broker application driving the upcalls
//! - [`broker`] - Wires everything together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod app;
pub mod broker;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod leader;
pub mod relay;
pub mod shutdown;
pub mod transport;

// Re-export commonly used types
pub use app::{AppPhase, RelayApplication};
pub use broker::Broker;
pub use config::Config;
pub use coordination::{
    Backend, Coordination, CoordinationConfig, CoordinationError, CoordinationStore, EtcdStore, KeyWatch, MemoryStore,
    WatchGuard,
};
pub use discovery::{DiscoveryProtocol, PendingRequest, ProtocolState, Reply, Request, RequestKind};
pub use dispatcher::{BrokerUpcalls, Control, DispatcherConfig, DispatcherStats, EventDispatcher, Iteration, NextTimeout};
pub use error::BrokerError;
pub use identity::{BrokerIdentity, TopicSet};
pub use leader::{GateState, LeaderGate, LeaderGateConfig, Leadership};
pub use relay::{RelayEngine, RelayStats};
pub use shutdown::ShutdownFlag;
pub use transport::{BroadcastChannel, RelayInput, RelayMessage, ReplyChannel, TopicFilter, TransportConfig};
