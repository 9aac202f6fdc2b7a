//! Relay-input channel from upstream publishers

use std::collections::HashMap;

use discoproto::read_frame;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::topic::TopicFilter;
use crate::error::BrokerError;

/// One topic-stamped payload on its way to the broadcast channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage(Vec<u8>);

impl RelayMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

enum RelayEvent {
    Frame(Vec<u8>),
    Closed(String, u64),
}

/// A live publisher connection and its reader task
struct Publisher {
    id: u64,
    reader: JoinHandle<()>,
}

/// Subscribe side of the relay
///
/// Holds one connection per publisher; frames from all of them are merged
/// and filtered by topic prefix before [`RelayInput::recv`] returns them.
pub struct RelayInput {
    filter: TopicFilter,
    publishers: HashMap<String, Publisher>,
    next_id: u64,
    tx: mpsc::Sender<RelayEvent>,
    rx: mpsc::Receiver<RelayEvent>,
    filtered: u64,
}

impl RelayInput {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            filter: TopicFilter::new(),
            publishers: HashMap::new(),
            next_id: 0,
            tx,
            rx,
            filtered: 0,
        }
    }

    /// Subscribe to a topic prefix
    pub fn subscribe(&mut self, topic: &str) -> bool {
        self.filter.subscribe(topic)
    }

    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_connected_to(&self, addr: &str, port: u16) -> bool {
        self.publishers.contains_key(&publisher_key(addr, port))
    }

    /// Frames discarded by the topic filter
    pub fn filtered_count(&self) -> u64 {
        self.filtered
    }

    /// Connect to a publisher; returns false if already connected to it
    pub async fn connect(&mut self, addr: &str, port: u16) -> Result<bool, BrokerError> {
        let key = publisher_key(addr, port);
        if self.publishers.contains_key(&key) {
            debug!(publisher = %key, "RelayInput::connect: already connected");
            return Ok(false);
        }

        let mut stream = TcpStream::connect((addr, port))
            .await
            .map_err(|e| BrokerError::Transport(format!("connect to publisher {} failed: {}", key, e)))?;

        self.next_id += 1;
        let id = self.next_id;
        let tx = self.tx.clone();
        let publisher = key.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut stream).await {
                    Ok(Some(frame)) => {
                        if tx.send(RelayEvent::Frame(frame)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%publisher, error = %e, "Publisher read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(RelayEvent::Closed(publisher, id)).await;
        });

        self.publishers.insert(key.clone(), Publisher { id, reader });
        info!(publisher = %key, "Relay input connected to publisher");
        Ok(true)
    }

    /// Drop the connection to a publisher; returns false if there was none
    pub fn disconnect(&mut self, addr: &str, port: u16) -> bool {
        let key = publisher_key(addr, port);
        match self.publishers.remove(&key) {
            Some(publisher) => {
                publisher.reader.abort();
                info!(publisher = %key, "Relay input disconnected from publisher");
                true
            }
            None => false,
        }
    }

    /// Wait for the next frame that passes the topic filter
    ///
    /// Cancel-safe: a frame is only consumed when it is returned or discarded.
    pub async fn recv(&mut self) -> RelayMessage {
        loop {
            match self.rx.recv().await {
                Some(RelayEvent::Frame(frame)) => {
                    if self.filter.matches(&frame) {
                        return RelayMessage(frame);
                    }
                    self.filtered += 1;
                    trace!(len = frame.len(), "RelayInput: frame filtered out");
                }
                Some(RelayEvent::Closed(publisher, id)) => {
                    // a reconnect under the same address has a newer id
                    if self.publishers.get(&publisher).is_some_and(|p| p.id == id) {
                        info!(%publisher, "Publisher disconnected");
                        self.publishers.remove(&publisher);
                    }
                }
                // self.tx keeps the channel open
                None => std::future::pending::<()>().await,
            }
        }
    }
}

impl Drop for RelayInput {
    fn drop(&mut self) {
        for publisher in self.publishers.values() {
            publisher.reader.abort();
        }
    }
}

fn publisher_key(addr: &str, port: u16) -> String {
    format!("{}:{}", addr, port)
}
