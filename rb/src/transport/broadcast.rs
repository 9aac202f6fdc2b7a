//! Broadcast channel to downstream subscribers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use discoproto::{Subscription, read_frame, write_frame};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::topic::TopicFilter;
use crate::error::BrokerError;

type Frame = Arc<[u8]>;

/// How long a new connection may take to send its subscription
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Publish side of the relay, bound on the broker's publish port
///
/// A subscriber opens its connection with one [`Subscription`] frame and then
/// only receives frames whose payload starts with one of its prefixes. There
/// is no backpressure: a subscriber that falls more than `capacity` frames
/// behind skips ahead and the gap is logged.
pub struct BroadcastChannel {
    tx: broadcast::Sender<Frame>,
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl BroadcastChannel {
    /// Bind `0.0.0.0:<port>` and start accepting subscribers
    pub async fn bind(port: u16, capacity: usize) -> Result<Self, BrokerError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| BrokerError::Transport(format!("bind publish port {} failed: {}", port, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let (tx, _) = broadcast::channel(capacity.max(1));
        let acceptor = tokio::spawn(accept_loop(listener, tx.clone()));

        info!(%local_addr, "Broadcast channel bound");
        Ok(Self { tx, local_addr, acceptor })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Publish one frame verbatim; returns the number of subscribed connections it was offered to
    pub fn publish(&self, payload: &[u8]) -> usize {
        self.tx.send(Arc::from(payload)).unwrap_or(0)
    }

    /// Connections that have sent their subscription
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: broadcast::Sender<Frame>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Subscriber connected");
                tokio::spawn(serve_subscriber(stream, peer, tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Accept on publish port failed");
            }
        }
    }
}

/// Read the subscription frame and build the connection's filter
async fn read_subscription(stream: &mut TcpStream, peer: SocketAddr) -> Option<TopicFilter> {
    let frame = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, read_frame(stream)).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            debug!(%peer, "Subscriber left before subscribing");
            return None;
        }
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "Subscription read failed");
            return None;
        }
        Err(_) => {
            warn!(%peer, "No subscription received, dropping connection");
            return None;
        }
    };

    let subscription = match Subscription::decode(&frame) {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(%peer, error = %e, "Malformed subscription, dropping connection");
            return None;
        }
    };

    let mut filter = TopicFilter::new();
    for topic in &subscription.topics {
        filter.subscribe(topic);
    }
    info!(%peer, topics = ?subscription.topics, "Subscriber subscribed");
    Some(filter)
}

async fn serve_subscriber(mut stream: TcpStream, peer: SocketAddr, tx: broadcast::Sender<Frame>) {
    let Some(filter) = read_subscription(&mut stream, peer).await else {
        return;
    };
    let mut rx = tx.subscribe();
    drop(tx);

    loop {
        match rx.recv().await {
            Ok(frame) => {
                if !filter.matches(&frame) {
                    continue;
                }
                if let Err(e) = write_frame(&mut stream, &frame).await {
                    debug!(%peer, error = %e, "Subscriber gone");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%peer, skipped, "Slow subscriber dropped frames");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_subscribers(channel: &BroadcastChannel, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.subscriber_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn subscribe(channel: &BroadcastChannel, subscription: Subscription) -> TcpStream {
        let mut stream = TcpStream::connect(("127.0.0.1", channel.local_addr().port()))
            .await
            .unwrap();
        write_frame(&mut stream, &subscription.encode().unwrap()).await.unwrap();
        stream
    }

    async fn next_frame(stream: &mut TcpStream, within: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(within, read_frame(stream))
            .await
            .ok()
            .and_then(|r| r.unwrap())
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let channel = BroadcastChannel::bind(0, 8).await.unwrap();
        assert_ne!(channel.local_addr().port(), 0);
        assert_eq!(channel.publish(b"weather:72F"), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_frame() {
        let channel = BroadcastChannel::bind(0, 8).await.unwrap();

        let mut first = subscribe(&channel, Subscription::new(["weather"])).await;
        let mut second = subscribe(&channel, Subscription::all()).await;
        wait_for_subscribers(&channel, 2).await;

        assert_eq!(channel.publish(b"weather:72F"), 2);

        for stream in [&mut first, &mut second] {
            let frame = next_frame(stream, Duration::from_secs(2)).await;
            assert_eq!(frame.as_deref(), Some(&b"weather:72F"[..]));
        }
    }

    #[tokio::test]
    async fn test_subscriber_only_gets_its_topics() {
        let channel = BroadcastChannel::bind(0, 8).await.unwrap();
        let mut weather = subscribe(&channel, Subscription::new(["weather"])).await;
        let mut humidity = subscribe(&channel, Subscription::new(["humidity"])).await;
        wait_for_subscribers(&channel, 2).await;

        channel.publish(b"humidity:40");
        channel.publish(b"weather:72F");

        assert_eq!(
            next_frame(&mut weather, Duration::from_secs(2)).await.as_deref(),
            Some(&b"weather:72F"[..])
        );
        assert_eq!(next_frame(&mut weather, Duration::from_millis(100)).await, None);
        assert_eq!(
            next_frame(&mut humidity, Duration::from_secs(2)).await.as_deref(),
            Some(&b"humidity:40"[..])
        );
    }

    #[tokio::test]
    async fn test_malformed_subscription_is_dropped() {
        let channel = BroadcastChannel::bind(0, 8).await.unwrap();
        let mut stream = TcpStream::connect(("127.0.0.1", channel.local_addr().port()))
            .await
            .unwrap();
        write_frame(&mut stream, b"not a subscription").await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut stream))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let channel = BroadcastChannel::bind(0, 8).await.unwrap();
        let err = BroadcastChannel::bind(channel.local_addr().port(), 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::Transport(_)));
    }
}
