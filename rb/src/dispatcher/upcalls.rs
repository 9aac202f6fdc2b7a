//! Upcall interface into the owning application

use std::time::Duration;

use discoproto::{IsReadyResp, LookupPubsResp, RegisterResp};

use super::control::Control;
use crate::error::BrokerError;

/// Timeout for the next poll; `None` waits until an event arrives
pub type NextTimeout = Option<Duration>;

/// Application logic the dispatcher calls when it cannot decide by itself
///
/// Upcalls never touch the sockets. Requests and publisher connections are
/// staged on the [`Control`] handle and carried out by the dispatcher after
/// the upcall returns.
pub trait BrokerUpcalls: Send {
    /// Registration outcome arrived
    fn register_response(&mut self, resp: &RegisterResp, ctl: &mut Control) -> Result<NextTimeout, BrokerError>;

    /// Readiness answer arrived
    fn is_ready_response(&mut self, resp: &IsReadyResp, ctl: &mut Control) -> Result<NextTimeout, BrokerError>;

    /// Publisher list arrived
    fn publishers_lookup_response(
        &mut self,
        resp: &LookupPubsResp,
        ctl: &mut Control,
    ) -> Result<NextTimeout, BrokerError>;

    /// Poll timed out with no events
    fn invoke_operation(&mut self, ctl: &mut Control) -> Result<NextTimeout, BrokerError>;
}
