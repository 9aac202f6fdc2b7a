//! Event dispatcher
//!
//! Single-threaded reactor over the reply channel, the relay-input channel
//! and the discovery-endpoint watch, with an upcall-controlled poll timeout.
//! Application logic plugs in through [`BrokerUpcalls`], injected at
//! construction.

mod config;
mod control;
mod core;
mod upcalls;

pub use config::DispatcherConfig;
pub use control::Control;
pub use self::core::{DispatcherStats, EventDispatcher, Iteration};
pub use upcalls::{BrokerUpcalls, NextTimeout};
