//! Default broker application
//!
//! Drives the discovery handshake through the upcalls: register, poll until
//! the discovery service is ready, look up publishers, connect to them, then
//! keep refreshing the publisher list. Publishers missing from a refresh are
//! disconnected.

use std::time::Duration;

use discoproto::{IsReadyResp, LookupPubsResp, RegisterResp, RegistrantInfo, Status};
use tracing::{debug, info};

use crate::dispatcher::{BrokerUpcalls, Control, DispatcherConfig, NextTimeout};
use crate::error::BrokerError;
use crate::identity::TopicSet;

/// Where the application is in its handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Registering,
    CheckReady,
    LookupPublishers,
    Relaying,
}

/// Upcalls for a relay broker
pub struct RelayApplication {
    info: RegistrantInfo,
    topics: TopicSet,
    ready_retry: Duration,
    publisher_refresh: Option<Duration>,
    phase: AppPhase,
    publishers: Vec<RegistrantInfo>,
}

impl RelayApplication {
    pub fn new(info: RegistrantInfo, topics: TopicSet, config: &DispatcherConfig) -> Self {
        Self {
            info,
            topics,
            ready_retry: config.ready_retry(),
            publisher_refresh: config.publisher_refresh(),
            phase: AppPhase::Registering,
            publishers: Vec::new(),
        }
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    /// Publishers from the latest lookup
    pub fn publishers(&self) -> &[RegistrantInfo] {
        &self.publishers
    }
}

impl BrokerUpcalls for RelayApplication {
    fn register_response(&mut self, resp: &RegisterResp, _ctl: &mut Control) -> Result<NextTimeout, BrokerError> {
        match resp.status {
            Status::Success => {
                info!(name = %self.info.id, "Registered with discovery service");
                self.phase = AppPhase::CheckReady;
                Ok(Some(Duration::ZERO))
            }
            Status::Failure => {
                let reason = resp.reason.clone().unwrap_or_else(|| "no reason given".to_string());
                Err(BrokerError::RegistrationRejected(reason))
            }
        }
    }

    fn is_ready_response(&mut self, resp: &IsReadyResp, _ctl: &mut Control) -> Result<NextTimeout, BrokerError> {
        if resp.status {
            info!("Discovery service ready");
            self.phase = AppPhase::LookupPublishers;
            Ok(Some(Duration::ZERO))
        } else {
            debug!(retry = ?self.ready_retry, "Discovery service not ready");
            Ok(Some(self.ready_retry))
        }
    }

    fn publishers_lookup_response(
        &mut self,
        resp: &LookupPubsResp,
        ctl: &mut Control,
    ) -> Result<NextTimeout, BrokerError> {
        info!(count = resp.publishers.len(), "Publisher lookup answered");
        for gone in self.publishers.iter().filter(|old| {
            !resp
                .publishers
                .iter()
                .any(|p| p.addr == old.addr && p.port == old.port)
        }) {
            info!(id = %gone.id, addr = %gone.addr, port = gone.port, "Publisher no longer listed");
            ctl.disconnect_publisher(gone.addr.clone(), gone.port);
        }
        for publisher in &resp.publishers {
            ctl.connect_publisher(publisher.addr.clone(), publisher.port);
        }
        self.publishers = resp.publishers.clone();
        self.phase = AppPhase::Relaying;
        Ok(self.publisher_refresh)
    }

    fn invoke_operation(&mut self, ctl: &mut Control) -> Result<NextTimeout, BrokerError> {
        if !ctl.can_send() {
            debug!(phase = ?self.phase, "RelayApplication: request outstanding, waiting");
            return Ok(None);
        }

        match self.phase {
            AppPhase::Registering => ctl.register(self.info.clone(), self.topics.to_vec())?,
            AppPhase::CheckReady => ctl.check_ready()?,
            AppPhase::LookupPublishers => ctl.request_publishers()?,
            AppPhase::Relaying => {
                if self.publisher_refresh.is_none() {
                    return Ok(None);
                }
                ctl.request_publishers()?;
            }
        }
        Ok(None)
    }
}
