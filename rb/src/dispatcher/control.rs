//! Request staging handle passed to upcalls

use discoproto::RegistrantInfo;
use tracing::debug;

use crate::discovery::{Request, RequestKind};
use crate::error::BrokerError;

/// What an upcall asked the dispatcher to do
///
/// Has room for exactly one request, and none at all while a request is
/// already outstanding on the reply channel.
#[derive(Debug, Default)]
pub struct Control {
    outstanding: Option<RequestKind>,
    staged: Option<Request>,
    connects: Vec<(String, u16)>,
    disconnects: Vec<(String, u16)>,
    stop: bool,
}

impl Control {
    /// Handle for an upcall made while `outstanding` is on the wire
    pub fn new(outstanding: Option<RequestKind>) -> Self {
        Self {
            outstanding,
            ..Default::default()
        }
    }

    /// True when a request can be staged
    pub fn can_send(&self) -> bool {
        self.outstanding.is_none() && self.staged.is_none()
    }

    fn stage(&mut self, request: Request) -> Result<(), BrokerError> {
        if let Some(pending) = self.outstanding {
            return Err(BrokerError::RequestOutstanding { pending });
        }
        if let Some(staged) = &self.staged {
            return Err(BrokerError::RequestOutstanding { pending: staged.kind() });
        }
        debug!(kind = %request.kind(), "Control: request staged");
        self.staged = Some(request);
        Ok(())
    }

    /// Stage REGISTER; the relay input subscribes to `topics` when it is sent
    pub fn register(&mut self, info: RegistrantInfo, topics: Vec<String>) -> Result<(), BrokerError> {
        self.stage(Request::Register { info, topics })
    }

    /// Stage IS_READY
    pub fn check_ready(&mut self) -> Result<(), BrokerError> {
        self.stage(Request::IsReady)
    }

    /// Stage LOOKUP_ALL_PUBLISHERS
    pub fn request_publishers(&mut self) -> Result<(), BrokerError> {
        self.stage(Request::LookupAllPublishers)
    }

    /// Connect the relay input to a publisher
    pub fn connect_publisher(&mut self, addr: impl Into<String>, port: u16) {
        self.connects.push((addr.into(), port));
    }

    /// Drop the relay input's connection to a publisher
    pub fn disconnect_publisher(&mut self, addr: impl Into<String>, port: u16) {
        self.disconnects.push((addr.into(), port));
    }

    /// Stop the event loop after this iteration
    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn staged(&self) -> Option<&Request> {
        self.staged.as_ref()
    }

    pub fn connects(&self) -> &[(String, u16)] {
        &self.connects
    }

    pub fn disconnects(&self) -> &[(String, u16)] {
        &self.disconnects
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }

    pub(crate) fn into_parts(self) -> Staged {
        Staged {
            request: self.staged,
            connects: self.connects,
            disconnects: self.disconnects,
            stop: self.stop,
        }
    }
}

/// Everything an upcall staged, taken apart for the dispatcher
#[derive(Debug)]
pub(crate) struct Staged {
    pub request: Option<Request>,
    pub connects: Vec<(String, u16)>,
    pub disconnects: Vec<(String, u16)>,
    pub stop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_slot() {
        let mut ctl = Control::new(None);
        assert!(ctl.can_send());

        ctl.check_ready().unwrap();
        assert!(!ctl.can_send());

        let err = ctl.request_publishers().unwrap_err();
        assert!(matches!(
            err,
            BrokerError::RequestOutstanding {
                pending: RequestKind::IsReady
            }
        ));
        assert_eq!(ctl.staged(), Some(&Request::IsReady));
    }

    #[test]
    fn test_refused_while_outstanding() {
        let mut ctl = Control::new(Some(RequestKind::Register));
        assert!(!ctl.can_send());
        assert!(matches!(
            ctl.check_ready(),
            Err(BrokerError::RequestOutstanding {
                pending: RequestKind::Register
            })
        ));
        assert!(ctl.staged().is_none());
    }

    #[test]
    fn test_connects_and_stop() {
        let mut ctl = Control::new(Some(RequestKind::IsReady));
        ctl.connect_publisher("10.0.0.7", 5577);
        ctl.connect_publisher("10.0.0.8", 5577);
        ctl.disconnect_publisher("10.0.0.6", 5577);
        ctl.stop();

        assert_eq!(ctl.connects().len(), 2);
        assert_eq!(ctl.disconnects().len(), 1);
        let staged = ctl.into_parts();
        assert!(staged.request.is_none());
        assert_eq!(staged.connects[1], ("10.0.0.8".to_string(), 5577));
        assert_eq!(staged.disconnects[0], ("10.0.0.6".to_string(), 5577));
        assert!(staged.stop);
    }
}
