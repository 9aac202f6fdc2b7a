//! Broker start-up: leader gate, discovery registration, event loop

use discoproto::RegistrantInfo;
use tracing::info;

use crate::app::RelayApplication;
use crate::config::Config;
use crate::coordination::Coordination;
use crate::dispatcher::{BrokerUpcalls, EventDispatcher};
use crate::error::BrokerError;
use crate::leader::LeaderGate;
use crate::relay::RelayEngine;
use crate::shutdown::ShutdownFlag;
use crate::transport::{BroadcastChannel, RelayInput, ReplyChannel};

/// One broker instance
pub struct Broker {
    config: Config,
    coordination: Coordination,
    shutdown: ShutdownFlag,
}

impl Broker {
    pub fn new(config: Config, coordination: Coordination) -> Self {
        Self {
            config,
            coordination,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Flag that stops the leader gate and the event loop when cleared
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Run with the default relay application
    pub async fn run(self) -> Result<(), BrokerError> {
        let broker = &self.config.broker;
        let upcalls = RelayApplication::new(
            RegistrantInfo::new(broker.name.clone(), broker.addr.clone(), broker.port),
            broker.topic_set(),
            &self.config.dispatcher,
        );
        self.run_with(upcalls).await
    }

    /// Wait for leadership, register with discovery, then loop until shutdown
    pub async fn run_with<U: BrokerUpcalls>(self, upcalls: U) -> Result<(), BrokerError> {
        let identity = self.config.broker.identity();
        let topics = self.config.broker.topic_set();
        let transport = &self.config.transport;

        let mut gate = LeaderGate::new(self.config.leader_gate.clone(), self.shutdown.clone());
        let leadership = gate.wait_for_leadership(&self.coordination, &identity).await?;

        // Watch first so a change between the read and the watch is not missed
        let watch = self.coordination.watch_discovery_endpoint().await?;
        let endpoint = self.coordination.get_discovery_endpoint().await?;
        info!(%endpoint, "Discovery endpoint resolved");

        let reply = ReplyChannel::connect(&endpoint, transport.reply_buffer).await?;
        let broadcast = BroadcastChannel::bind(identity.port(), transport.broadcast_capacity).await?;

        let mut dispatcher = EventDispatcher::new(
            leadership,
            reply,
            RelayInput::new(transport.relay_buffer),
            RelayEngine::new(broadcast),
            upcalls,
            self.config.dispatcher.clone(),
        )
        .with_endpoint_watch(watch)
        .with_shutdown(self.shutdown.clone());

        let info = RegistrantInfo::new(self.config.broker.name.clone(), identity.addr(), identity.port());
        dispatcher.register(info, topics.to_vec()).await?;

        dispatcher.run().await
    }
}
