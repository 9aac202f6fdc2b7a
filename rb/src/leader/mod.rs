//! Leader gate
//!
//! Blocks broker start-up until this instance's identity equals the
//! externally arbitrated leader record. Only the [`Leadership`] token handed
//! out on success can construct the event dispatcher.

mod config;
mod gate;

pub use config::LeaderGateConfig;
pub use gate::{GateState, LeaderGate, Leadership};
