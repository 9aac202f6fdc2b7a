//! Blocking leader gate with bounded exponential backoff

use std::time::Instant;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::{debug, info};

use super::config::LeaderGateConfig;
use crate::coordination::Coordination;
use crate::error::BrokerError;
use crate::identity::BrokerIdentity;
use crate::shutdown::ShutdownFlag;

/// Where this instance stands in the election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Follower,
    Leader,
}

/// Proof that the leader record named this instance
///
/// Only [`LeaderGate::wait_for_leadership`] can create one.
#[derive(Debug, Clone)]
pub struct Leadership {
    record: String,
}

impl Leadership {
    /// The leader record that matched
    pub fn record(&self) -> &str {
        &self.record
    }
}

/// Polls the leader record until it names this broker
pub struct LeaderGate {
    config: LeaderGateConfig,
    shutdown: ShutdownFlag,
    state: GateState,
    attempts: u32,
}

impl LeaderGate {
    pub fn new(config: LeaderGateConfig, shutdown: ShutdownFlag) -> Self {
        Self {
            config,
            shutdown,
            state: GateState::Follower,
            attempts: 0,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Leader-record reads made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff(),
            current_interval: self.config.initial_backoff(),
            max_interval: self.config.max_backoff(),
            multiplier: self.config.multiplier,
            randomization_factor: self.config.jitter,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Block until the leader record equals `identity`
    ///
    /// Coordination failures are returned immediately. The wait ends early
    /// with [`BrokerError::GateAborted`] once the shutdown flag is cleared, or
    /// with [`BrokerError::LeaderWaitExpired`] when `max-wait-secs` elapses.
    pub async fn wait_for_leadership(
        &mut self,
        coordination: &Coordination,
        identity: &BrokerIdentity,
    ) -> Result<Leadership, BrokerError> {
        let expected = identity.leader_string();
        let started = Instant::now();
        let mut backoff = self.backoff();
        let log_every = self.config.log_every.max(1);

        info!(identity = %expected, "Waiting for leadership");

        loop {
            if !self.shutdown.is_running() {
                info!(attempts = self.attempts, "Leader gate aborted by shutdown");
                return Err(BrokerError::GateAborted);
            }

            self.attempts += 1;
            let record = coordination.get_leader_record().await?;

            if identity.matches_record(&record) {
                self.state = GateState::Leader;
                info!(attempts = self.attempts, %record, "Leadership acquired");
                return Ok(Leadership { record });
            }

            if self.attempts % log_every == 0 {
                info!(
                    attempts = self.attempts,
                    leader = %record,
                    identity = %expected,
                    "Still waiting for leadership"
                );
            }

            let elapsed = started.elapsed();
            if let Some(max_wait) = self.config.max_wait()
                && elapsed >= max_wait
            {
                return Err(BrokerError::LeaderWaitExpired(elapsed));
            }

            let delay = backoff.next_backoff().unwrap_or_else(|| self.config.max_backoff());
            debug!(attempt = self.attempts, ?delay, leader = %record, "LeaderGate: follower, backing off");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.stopped() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{CoordinationConfig, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config() -> LeaderGateConfig {
        LeaderGateConfig {
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            jitter: 0.0,
            ..Default::default()
        }
    }

    async fn coordination_with_leader(record: &str) -> (MemoryStore, Coordination) {
        let store = MemoryStore::new();
        store.set("/curbroker", record).await;
        let coordination = Coordination::new(Arc::new(store.clone()), &CoordinationConfig::default());
        (store, coordination)
    }

    #[tokio::test]
    async fn test_immediate_leadership() {
        let (_store, coordination) = coordination_with_leader("10.0.0.5 5570").await;
        let mut gate = LeaderGate::new(fast_config(), ShutdownFlag::new());
        assert_eq!(gate.state(), GateState::Follower);

        let leadership = gate
            .wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570))
            .await
            .unwrap();

        assert_eq!(leadership.record(), "10.0.0.5 5570");
        assert_eq!(gate.state(), GateState::Leader);
        assert_eq!(gate.attempts(), 1);
    }

    #[tokio::test]
    async fn test_waits_until_record_changes() {
        let (store, coordination) = coordination_with_leader("10.0.0.9 5570").await;
        let mut gate = LeaderGate::new(fast_config(), ShutdownFlag::new());

        let flip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            store.set("/curbroker", "10.0.0.5 5570").await;
        });

        let leadership = tokio::time::timeout(
            Duration::from_secs(5),
            gate.wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570)),
        )
        .await
        .unwrap()
        .unwrap();

        flip.await.unwrap();
        assert_eq!(leadership.record(), "10.0.0.5 5570");
        assert!(gate.attempts() > 1);
    }

    #[tokio::test]
    async fn test_near_match_stays_follower() {
        let (_store, coordination) = coordination_with_leader("10.0.0.5 5570 ").await;
        let config = LeaderGateConfig {
            max_wait_secs: Some(0),
            ..fast_config()
        };
        let mut gate = LeaderGate::new(config, ShutdownFlag::new());

        let err = gate
            .wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::LeaderWaitExpired(_)));
        assert_eq!(gate.state(), GateState::Follower);
    }

    #[tokio::test]
    async fn test_unavailable_is_surfaced() {
        let (store, coordination) = coordination_with_leader("10.0.0.5 5570").await;
        store.set_available(false);
        let mut gate = LeaderGate::new(fast_config(), ShutdownFlag::new());

        let err = gate
            .wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::CoordinationUnavailable(_)));
        assert_eq!(gate.state(), GateState::Follower);
    }

    #[tokio::test]
    async fn test_missing_record_is_surfaced() {
        let store = MemoryStore::new();
        let coordination = Coordination::new(Arc::new(store), &CoordinationConfig::default());
        let mut gate = LeaderGate::new(fast_config(), ShutdownFlag::new());

        let err = gate
            .wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::KeyMissing(_)));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_wait() {
        let (_store, coordination) = coordination_with_leader("10.0.0.9 5570").await;
        let shutdown = ShutdownFlag::new();
        let mut gate = LeaderGate::new(fast_config(), shutdown.clone());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.stop();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            gate.wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570)),
        )
        .await
        .unwrap()
        .unwrap_err();

        stopper.await.unwrap();
        assert!(matches!(err, BrokerError::GateAborted));
        assert_eq!(gate.state(), GateState::Follower);
    }

    #[tokio::test]
    async fn test_shutdown_cuts_long_backoff_short() {
        let (_store, coordination) = coordination_with_leader("10.0.0.9 5570").await;
        let config = LeaderGateConfig {
            initial_backoff_ms: 30_000,
            max_backoff_ms: 30_000,
            ..fast_config()
        };
        let shutdown = ShutdownFlag::new();
        let mut gate = LeaderGate::new(config, shutdown.clone());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.stop();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            gate.wait_for_leadership(&coordination, &BrokerIdentity::new("10.0.0.5", 5570)),
        )
        .await
        .unwrap()
        .unwrap_err();

        stopper.await.unwrap();
        assert!(matches!(err, BrokerError::GateAborted));
        assert_eq!(gate.attempts(), 1);
    }
}
