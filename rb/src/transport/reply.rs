//! Reply channel to the discovery service

use discoproto::{read_frame, write_frame};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::parse_endpoint;
use crate::error::BrokerError;

struct Connection {
    writer: OwnedWriteHalf,
    frames: mpsc::Receiver<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// Request/reply connection to the current discovery endpoint
///
/// Each successful connect bumps the connection generation, so a request can
/// be tied to the connection it went out on.
pub struct ReplyChannel {
    endpoint: String,
    buffer: usize,
    conn: Option<Connection>,
    generation: u64,
    disconnects: u64,
}

impl ReplyChannel {
    /// Connect to `endpoint`
    pub async fn connect(endpoint: &str, buffer: usize) -> Result<Self, BrokerError> {
        let mut channel = Self {
            endpoint: endpoint.to_string(),
            buffer: buffer.max(1),
            conn: None,
            generation: 0,
            disconnects: 0,
        };
        channel.open().await?;
        Ok(channel)
    }

    async fn open(&mut self) -> Result<(), BrokerError> {
        let (host, port) = parse_endpoint(&self.endpoint)?;
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| BrokerError::ReplyChannelLost(format!("connect to {} failed: {}", self.endpoint, e)))?;
        let (mut read_half, writer) = stream.into_split();

        let (tx, frames) = mpsc::channel(self.buffer);
        let endpoint = self.endpoint.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(frame)) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(%endpoint, "Reply channel closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(%endpoint, error = %e, "Reply channel read failed");
                        break;
                    }
                }
            }
        });

        self.generation += 1;
        self.conn = Some(Connection { writer, frames, reader });
        info!(endpoint = %self.endpoint, generation = self.generation, "Reply channel connected");
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Generation of the current (or last) connection
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connections torn down so far
    pub fn disconnect_count(&self) -> u64 {
        self.disconnects
    }

    /// Tear down the current connection
    ///
    /// Idempotent: returns false when there was nothing to tear down.
    pub fn disconnect(&mut self) -> bool {
        match self.conn.take() {
            Some(conn) => {
                conn.reader.abort();
                self.disconnects += 1;
                debug!(endpoint = %self.endpoint, generation = self.generation, "ReplyChannel::disconnect");
                true
            }
            None => false,
        }
    }

    /// Move to a new endpoint
    ///
    /// Returns false without touching the connection when `endpoint` is the
    /// one already connected. The cached endpoint is updated even if the new
    /// connection cannot be opened; [`ReplyChannel::ensure_connected`] retries it.
    pub async fn reconnect(&mut self, endpoint: &str) -> Result<bool, BrokerError> {
        if endpoint == self.endpoint && self.is_connected() {
            debug!(%endpoint, "ReplyChannel::reconnect: endpoint unchanged");
            return Ok(false);
        }

        info!(from = %self.endpoint, to = %endpoint, "Reply channel migrating");
        self.disconnect();
        self.endpoint = endpoint.to_string();
        self.open().await?;
        Ok(true)
    }

    /// Reopen the connection to the cached endpoint if it was lost
    pub async fn ensure_connected(&mut self) -> Result<(), BrokerError> {
        if self.is_connected() {
            return Ok(());
        }
        self.open().await
    }

    /// Send one request frame
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), BrokerError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| BrokerError::ReplyChannelLost(format!("not connected to {}", self.endpoint)))?;

        if let Err(e) = write_frame(&mut conn.writer, bytes).await {
            if e.is_malformed() {
                return Err(e.into());
            }
            self.disconnect();
            return Err(BrokerError::ReplyChannelLost(format!("send to {} failed: {}", self.endpoint, e)));
        }
        Ok(())
    }

    /// Wait for the next reply frame
    ///
    /// `None` means the connection closed. While disconnected this never
    /// resolves. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match self.conn.as_mut() {
            Some(conn) => conn.frames.recv().await,
            None => std::future::pending().await,
        }
    }
}

impl Drop for ReplyChannel {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.reader.abort();
        }
    }
}
