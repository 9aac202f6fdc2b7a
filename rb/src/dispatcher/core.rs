//! Reactor loop

use discoproto::RegistrantInfo;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

use super::config::DispatcherConfig;
use super::control::Control;
use super::upcalls::{BrokerUpcalls, NextTimeout};
use crate::coordination::{CoordinationError, KeyWatch};
use crate::discovery::{DiscoveryProtocol, Reply, Request, RequestKind};
use crate::error::BrokerError;
use crate::leader::Leadership;
use crate::relay::RelayEngine;
use crate::shutdown::ShutdownFlag;
use crate::transport::{RelayInput, RelayMessage, ReplyChannel};

/// What one loop iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// Poll timed out; `invoke_operation` ran
    Timeout,
    /// A reply was matched to its request and handed to its upcall
    Reply(RequestKind),
    /// One relay-input message went out on the broadcast channel
    Relayed { bytes: usize, subscribers: usize },
    /// The reply channel moved to a new discovery endpoint
    Migrated { endpoint: String },
    /// Endpoint notification named the endpoint already in use
    EndpointUnchanged,
    /// The shutdown flag was cleared while waiting
    Stopped,
}

/// Loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub iterations: u64,
    pub timeouts: u64,
    pub replies: u64,
    pub relayed: u64,
    pub migrations: u64,
    pub recovered: u64,
}

enum Event {
    Reply(Option<Vec<u8>>),
    Relay(RelayMessage),
    Endpoint(Result<Option<String>, CoordinationError>),
    Timeout,
    Shutdown,
}

/// Single-threaded event loop of the active broker
///
/// Construction requires a [`Leadership`] token, so no event is processed
/// before the leader gate has passed.
pub struct EventDispatcher<U> {
    leadership: Leadership,
    protocol: DiscoveryProtocol,
    reply: ReplyChannel,
    relay_input: RelayInput,
    relay: RelayEngine,
    endpoint_watch: Option<KeyWatch>,
    upcalls: U,
    shutdown: ShutdownFlag,
    config: DispatcherConfig,
    timeout: NextTimeout,
    deadline: Option<Instant>,
    stats: DispatcherStats,
}

impl<U: BrokerUpcalls> EventDispatcher<U> {
    pub fn new(
        leadership: Leadership,
        reply: ReplyChannel,
        relay_input: RelayInput,
        relay: RelayEngine,
        upcalls: U,
        config: DispatcherConfig,
    ) -> Self {
        let mut dispatcher = Self {
            leadership,
            protocol: DiscoveryProtocol::new(),
            reply,
            relay_input,
            relay,
            endpoint_watch: None,
            upcalls,
            shutdown: ShutdownFlag::new(),
            timeout: None,
            deadline: None,
            stats: DispatcherStats::default(),
            config,
        };
        dispatcher.set_timeout(dispatcher.config.initial_timeout());
        dispatcher
    }

    /// Follow discovery endpoint changes from `watch`
    pub fn with_endpoint_watch(mut self, watch: KeyWatch) -> Self {
        self.endpoint_watch = Some(watch);
        self
    }

    /// Share a shutdown flag with the owner
    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn leadership(&self) -> &Leadership {
        &self.leadership
    }

    pub fn protocol(&self) -> &DiscoveryProtocol {
        &self.protocol
    }

    pub fn reply_channel(&self) -> &ReplyChannel {
        &self.reply
    }

    pub fn relay_input(&self) -> &RelayInput {
        &self.relay_input
    }

    pub fn relay(&self) -> &RelayEngine {
        &self.relay
    }

    pub fn upcalls(&self) -> &U {
        &self.upcalls
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Timeout most recently set by an upcall
    pub fn current_timeout(&self) -> NextTimeout {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: NextTimeout) {
        self.timeout = timeout;
        self.deadline = timeout.map(|d| Instant::now() + d);
    }

    /// Send REGISTER (role = both) and subscribe the relay input to `topics`
    pub async fn register(&mut self, info: RegistrantInfo, topics: Vec<String>) -> Result<(), BrokerError> {
        self.send(Request::Register { info, topics }).await
    }

    /// Send IS_READY
    pub async fn check_ready(&mut self) -> Result<(), BrokerError> {
        self.send(Request::IsReady).await
    }

    /// Send LOOKUP_ALL_PUBLISHERS
    pub async fn request_all_publishers(&mut self) -> Result<(), BrokerError> {
        self.send(Request::LookupAllPublishers).await
    }

    async fn send(&mut self, request: Request) -> Result<(), BrokerError> {
        self.protocol.check(&request)?;
        self.reply.ensure_connected().await?;

        let bytes = self.protocol.begin(&request, self.reply.generation())?;
        if let Err(e) = self.reply.send(&bytes).await {
            self.protocol.orphan_pending();
            return Err(e);
        }

        if let Request::Register { topics, .. } = &request {
            for topic in topics {
                self.relay_input.subscribe(topic);
            }
        }

        info!(
            kind = %request.kind(),
            endpoint = %self.reply.endpoint(),
            generation = self.reply.generation(),
            "Request sent"
        );
        Ok(())
    }

    /// Carry out what an upcall staged
    async fn apply(&mut self, ctl: Control) -> Result<(), BrokerError> {
        let staged = ctl.into_parts();

        for (addr, port) in staged.disconnects {
            self.relay_input.disconnect(&addr, port);
        }
        for (addr, port) in staged.connects {
            if let Err(e) = self.relay_input.connect(&addr, port).await {
                warn!(%addr, port, error = %e, "Skipping unreachable publisher");
            }
        }
        if staged.stop {
            info!("Stop requested by upcall");
            self.shutdown.stop();
        }
        if let Some(request) = staged.request {
            self.send(request).await?;
        }
        Ok(())
    }

    /// Wait for one event and handle it
    pub async fn run_once(&mut self) -> Result<Iteration, BrokerError> {
        let deadline = self.deadline;
        let event = tokio::select! {
            frame = self.reply.recv() => Event::Reply(frame),
            message = self.relay_input.recv() => Event::Relay(message),
            change = next_endpoint(&mut self.endpoint_watch) => Event::Endpoint(change),
            _ = wait_until(deadline) => Event::Timeout,
            _ = self.shutdown.stopped() => Event::Shutdown,
        };
        self.stats.iterations += 1;

        match event {
            Event::Reply(Some(bytes)) => self.on_reply(&bytes).await,
            Event::Reply(None) => self.on_reply_closed(),
            Event::Relay(message) => {
                let bytes = message.len();
                let subscribers = self.relay.forward(message);
                self.stats.relayed += 1;
                Ok(Iteration::Relayed { bytes, subscribers })
            }
            Event::Endpoint(Ok(Some(endpoint))) => self.on_endpoint_change(endpoint).await,
            Event::Endpoint(Err(e)) => {
                self.endpoint_watch = None;
                Err(e.into())
            }
            Event::Endpoint(Ok(None)) => {
                let key = self
                    .endpoint_watch
                    .take()
                    .map(|w| w.key().to_string())
                    .unwrap_or_default();
                Err(BrokerError::WatchLost(key))
            }
            Event::Timeout => {
                self.stats.timeouts += 1;
                let mut ctl = Control::new(self.protocol.pending().map(|p| p.kind));
                let next = self.upcalls.invoke_operation(&mut ctl)?;
                self.set_timeout(next);
                self.apply(ctl).await?;
                Ok(Iteration::Timeout)
            }
            Event::Shutdown => {
                debug!("EventDispatcher: woken by shutdown");
                Ok(Iteration::Stopped)
            }
        }
    }

    async fn on_reply(&mut self, bytes: &[u8]) -> Result<Iteration, BrokerError> {
        let reply = self.protocol.handle_reply(bytes)?;
        self.stats.replies += 1;

        let mut ctl = Control::new(None);
        let (kind, next) = match &reply {
            Reply::Register(resp) => (RequestKind::Register, self.upcalls.register_response(resp, &mut ctl)?),
            Reply::IsReady(resp) => (RequestKind::IsReady, self.upcalls.is_ready_response(resp, &mut ctl)?),
            Reply::Publishers(resp) => (
                RequestKind::LookupAllPublishers,
                self.upcalls.publishers_lookup_response(resp, &mut ctl)?,
            ),
        };
        debug!(%kind, ?next, "EventDispatcher: reply handled");

        self.set_timeout(next);
        self.apply(ctl).await?;
        Ok(Iteration::Reply(kind))
    }

    fn on_reply_closed(&mut self) -> Result<Iteration, BrokerError> {
        let endpoint = self.reply.endpoint().to_string();
        self.reply.disconnect();

        let reason = match self.protocol.orphan_pending() {
            Some(pending) => format!("{} closed with {} (seq {}) outstanding", endpoint, pending.kind, pending.seq),
            None => format!("{} closed", endpoint),
        };
        Err(BrokerError::ReplyChannelLost(reason))
    }

    async fn on_endpoint_change(&mut self, endpoint: String) -> Result<Iteration, BrokerError> {
        if endpoint == self.reply.endpoint() && self.reply.is_connected() {
            debug!(%endpoint, "EventDispatcher: endpoint notification unchanged");
            return Ok(Iteration::EndpointUnchanged);
        }

        let orphaned = self.protocol.orphan_pending();
        self.stats.migrations += 1;
        let reconnected = self.reply.reconnect(&endpoint).await;

        if let Some(pending) = orphaned {
            if let Err(e) = reconnected {
                warn!(%endpoint, error = %e, "Reconnect after migration failed");
            }
            return Err(BrokerError::EndpointMigrationRace {
                kind: pending.kind,
                seq: pending.seq,
            });
        }

        reconnected?;
        info!(%endpoint, "Discovery endpoint migrated");
        Ok(Iteration::Migrated { endpoint })
    }

    /// Loop until the shutdown flag is cleared or a fatal error occurs
    ///
    /// Clearing the flag from another task wakes a loop parked with no
    /// timeout; the current iteration is finished first.
    ///
    /// Recoverable errors are logged and followed by an `invoke_operation`
    /// upcall after `recover-backoff-ms`.
    pub async fn run(&mut self) -> Result<(), BrokerError> {
        info!(leader = %self.leadership.record(), "Event dispatcher started");

        while self.shutdown.is_running() {
            match self.run_once().await {
                Ok(iteration) => trace!(?iteration, "EventDispatcher: iteration"),
                Err(e) if !e.is_fatal() => {
                    warn!(error = %e, "Recoverable dispatcher error");
                    self.stats.recovered += 1;
                    self.set_timeout(Some(self.config.recover_backoff()));
                }
                Err(e) => {
                    error!(error = %e, "Fatal dispatcher error");
                    return Err(e);
                }
            }
        }

        info!(stats = ?self.stats, relay = ?self.relay.stats(), "Event dispatcher stopped");
        Ok(())
    }
}

async fn next_endpoint(watch: &mut Option<KeyWatch>) -> Result<Option<String>, CoordinationError> {
    match watch {
        Some(watch) => watch.changed().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
