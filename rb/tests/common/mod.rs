//! Shared fixtures: in-process discovery service, publisher and subscriber

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use discoproto::{DiscoveryReq, DiscoveryResp, Subscription, read_frame, write_frame};
use relaybroker::{Coordination, CoordinationConfig, MemoryStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Port that was free a moment ago
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `check` until it holds or `WAIT` runs out
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Memory-backed coordination with both well-known keys set
pub async fn coordination(leader: &str, discovery: &str) -> (MemoryStore, Coordination) {
    let store = MemoryStore::new();
    store.set("/curbroker", leader).await;
    store.set("/curDiscovery", discovery).await;
    let coordination = Coordination::new(Arc::new(store.clone()), &CoordinationConfig::default());
    (store, coordination)
}

type Responder = Arc<dyn Fn(&DiscoveryReq) -> Option<DiscoveryResp> + Send + Sync>;

/// Discovery service stand-in
///
/// Answers each request with whatever the responder returns (`None` stays
/// silent), records every request, and counts connections opened and closed.
pub struct MockDiscovery {
    pub endpoint: String,
    requests: mpsc::UnboundedReceiver<DiscoveryReq>,
    connections: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockDiscovery {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&DiscoveryReq) -> Option<DiscoveryResp> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("tcp://{}", listener.local_addr().unwrap());
        let responder: Responder = Arc::new(responder);
        let (tx, requests) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let task = {
            let connections = connections.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, responder.clone(), tx.clone(), closed.clone()));
                }
            })
        };

        Self {
            endpoint,
            requests,
            connections,
            closed,
            task,
        }
    }

    /// Answer the whole handshake: registered, ready, and the given publishers
    pub async fn ready_with(publishers: Vec<discoproto::RegistrantInfo>) -> Self {
        Self::start(move |req| {
            Some(match req.msg_type {
                discoproto::MsgType::Register => DiscoveryResp::register_ok(),
                discoproto::MsgType::IsReady => DiscoveryResp::ready(true),
                _ => DiscoveryResp::publishers(publishers.clone()),
            })
        })
        .await
    }

    /// Next request received, waiting up to `WAIT`
    pub async fn next_request(&mut self) -> DiscoveryReq {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("no request in time")
            .expect("discovery task ended")
    }

    /// Next request if one arrives within `within`
    pub async fn try_next_request(&mut self, within: Duration) -> Option<DiscoveryReq> {
        tokio::time::timeout(within, self.requests.recv()).await.ok().flatten()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MockDiscovery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    responder: Responder,
    requests: mpsc::UnboundedSender<DiscoveryReq>,
    closed: Arc<AtomicUsize>,
) {
    while let Ok(Some(frame)) = read_frame(&mut stream).await {
        let req = DiscoveryReq::decode(&frame).unwrap();
        let reply = responder(&req);
        let _ = requests.send(req);
        if let Some(resp) = reply
            && write_frame(&mut stream, &resp.encode().unwrap()).await.is_err()
        {
            break;
        }
    }
    closed.fetch_add(1, Ordering::SeqCst);
}

/// Upstream publisher stand-in that the broker's relay input connects to
pub struct MockPublisher {
    pub port: u16,
    tx: broadcast::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl MockPublisher {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, _) = broadcast::channel::<Vec<u8>>(64);

        let task = {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let mut rx = tx.subscribe();
                    tokio::spawn(async move {
                        while let Ok(frame) = rx.recv().await {
                            if write_frame(&mut stream, &frame).await.is_err() {
                                return;
                            }
                        }
                    });
                }
            })
        };

        Self { port, tx, task }
    }

    pub fn info(&self) -> discoproto::RegistrantInfo {
        discoproto::RegistrantInfo::new("pub1", "127.0.0.1", self.port)
    }

    /// Brokers currently connected
    pub fn connected(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, payload: &[u8]) {
        self.tx.send(payload.to_vec()).unwrap();
    }
}

impl Drop for MockPublisher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Downstream subscriber connected to a broker's publish port
pub struct Subscriber {
    stream: TcpStream,
}

impl Subscriber {
    /// Connect and subscribe to `topics`
    pub async fn connect(port: u16, topics: &[&str]) -> Self {
        let mut stream = tokio::time::timeout(WAIT, async {
            loop {
                match TcpStream::connect(("127.0.0.1", port)).await {
                    Ok(stream) => return stream,
                    Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
                }
            }
        })
        .await
        .expect("broker never bound its publish port");

        let subscription = Subscription::new(topics.iter().copied()).encode().unwrap();
        write_frame(&mut stream, &subscription).await.unwrap();
        Self { stream }
    }

    pub async fn recv(&mut self) -> Vec<u8> {
        tokio::time::timeout(WAIT, read_frame(&mut self.stream))
            .await
            .expect("no frame in time")
            .unwrap()
            .expect("broker closed the connection")
    }

    pub async fn try_recv(&mut self, within: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(within, read_frame(&mut self.stream))
            .await
            .ok()
            .and_then(|r| r.ok())
            .flatten()
    }
}
