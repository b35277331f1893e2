//! In-process loopback transport.
//!
//! [`MemoryConnector`] hands every dialed connection's server side to a
//! [`MemoryListener`] as a [`MemoryPeer`]. Frames are still encoded with the
//! protocol codec on the way through, so a session driven over this
//! transport sees exactly the bytes it would see over a socket.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use drumie_protocol::{codec, Frame};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionId, Connector, TransportError};

struct MemoryInner {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
    dials: AtomicUsize,
}

/// Dials in-process connections.
#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<MemoryInner>,
}

impl MemoryConnector {
    /// Create a connector and the listener that receives its peers.
    #[must_use]
    pub fn new() -> (Self, MemoryListener) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(MemoryInner {
                peers,
                refusing: AtomicBool::new(false),
                dials: AtomicUsize::new(0),
            }),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Make subsequent dials fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.inner.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of dial attempts seen so far, refused ones included.
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);

        if self.inner.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            endpoint: endpoint.to_string(),
            outbound: Some(to_client),
            inbound: from_client,
            read_buffer: BytesMut::new(),
        };
        self.inner
            .peers
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("listener closed".into()))?;

        let conn = MemoryConnection {
            id: ConnectionId::generate(),
            endpoint: endpoint.to_string(),
            outbound: Some(to_server),
            inbound: from_server,
            read_buffer: BytesMut::new(),
        };
        debug!(endpoint = %endpoint, connection = %conn.id, "Memory connection opened");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Receives the server side of every connection dialed by a [`MemoryConnector`].
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next dialed connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Take an already dialed connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// The server side of an in-process connection.
pub struct MemoryPeer {
    endpoint: String,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    read_buffer: BytesMut,
}

impl MemoryPeer {
    /// The endpoint the client dialed.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Receive the next frame sent by the client.
    ///
    /// Returns `None` once the client has closed the connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.decode_buffered() {
                return Some(frame);
            }
            let chunk = self.inbound.recv().await?;
            self.read_buffer.extend_from_slice(&chunk);
        }
    }

    /// Receive a frame the client has already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.decode_buffered() {
                return Some(frame);
            }
            let chunk = self.inbound.try_recv().ok()?;
            self.read_buffer.extend_from_slice(&chunk);
        }
    }

    /// Send a frame to the client.
    ///
    /// Returns `false` if the client side is gone or the peer was closed.
    pub fn send(&self, frame: Frame) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };
        match codec::encode(&frame) {
            Ok(data) => outbound.send(data).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to encode frame for memory peer");
                false
            }
        }
    }

    /// Send raw bytes to the client, bypassing the encoder.
    pub fn send_raw(&self, data: Bytes) -> bool {
        self.outbound
            .as_ref()
            .map(|outbound| outbound.send(data).is_ok())
            .unwrap_or(false)
    }

    /// Close the server side; the client observes a clean close.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    fn decode_buffered(&mut self) -> Option<Frame> {
        loop {
            match codec::decode_from(&mut self.read_buffer) {
                Ok(frame) => return frame,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable frame from client");
                    if matches!(e, drumie_protocol::ProtocolError::FrameTooLarge(_)) {
                        self.read_buffer.clear();
                        return None;
                    }
                }
            }
        }
    }
}

/// The client side of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    endpoint: String,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    read_buffer: BytesMut,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                return Ok(Some(frame));
            }
            match self.inbound.recv().await {
                Some(chunk) => self.read_buffer.extend_from_slice(&chunk),
                None => {
                    debug!(connection = %self.id, "Memory peer closed");
                    self.outbound = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        outbound
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }

    fn is_open(&self) -> bool {
        self.outbound.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut conn = connector.connect("memory://drumie").await.unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.endpoint(), "memory://drumie");

        conn.send(Frame::connect(1, "TOK1", None)).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::connect(1, "TOK1", None)));

        assert!(peer.send(Frame::connected("conn-1", 1, 0)));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Frame::connected("conn-1", 1, 0))
        );
        assert_eq!(connector.name(), "memory");
    }

    #[tokio::test]
    async fn test_peer_close_is_clean_eof() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut conn = connector.connect("memory://drumie").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        peer.close();
        assert!(conn.recv().await.unwrap().is_none());
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send(Frame::ping()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_client_close_ends_peer_stream() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut conn = connector.connect("memory://drumie").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_refusing_connector() {
        let (connector, mut listener) = MemoryConnector::new();
        connector.set_refusing(true);

        assert!(matches!(
            connector.connect("memory://drumie").await,
            Err(TransportError::ConnectFailed(_))
        ));
        assert_eq!(connector.dial_count(), 1);
        assert!(listener.try_accept().is_none());
    }
}
