//! WebSocket client transport.
//!
//! This module dials Drumie servers over WebSocket using tokio-tungstenite.
//! Frames travel as binary messages using the protocol codec.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use drumie_protocol::{codec, Frame};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{Connection, ConnectionId, Connector, TransportError};

/// WebSocket connector configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Time allowed for the TCP and WebSocket handshakes.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024, // 64 KB
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Dials WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a new WebSocket connector.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Get the connector configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!(endpoint = %endpoint, "Dialing WebSocket");

        let (stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(endpoint))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| {
                    warn!(endpoint = %endpoint, error = %e, "WebSocket handshake failed");
                    TransportError::ConnectFailed(e.to_string())
                })?;

        let conn = WebSocketConnection::new(stream, endpoint, self.config.max_message_size);
        info!(endpoint = %endpoint, connection = %conn.id, "WebSocket connected");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client-side WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    // Only ever reached through `get_mut`; the mutex makes the connection `Sync`.
    stream: Mutex<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    endpoint: String,
    is_open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        endpoint: &str,
        max_message_size: usize,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream: Mutex::new(stream),
            endpoint: endpoint.to_string(),
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        // Drain frames already buffered from an earlier message
        if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
            return Ok(Some(frame));
        }

        let stream = self.stream.get_mut();
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > self.max_message_size {
                        warn!(
                            connection = %self.id,
                            size = data.len(),
                            max = self.max_message_size,
                            "Message too large"
                        );
                        return Err(TransportError::Protocol(
                            drumie_protocol::ProtocolError::FrameTooLarge(data.len()),
                        ));
                    }

                    self.read_buffer.extend_from_slice(&data);
                    if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    // For compatibility, treat text as binary
                    self.read_buffer.extend_from_slice(text.as_bytes());
                    if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        warn!(connection = %self.id, error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, ?frame, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(connection = %self.id, error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .get_mut()
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        match self.stream.get_mut().close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::response::Response;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_message_size, 64 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::default();
        let result = connector.connect(&format!("ws://{}/connect", addr)).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    async fn echo(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(msg)) = socket.recv().await {
                if matches!(msg, AxumMessage::Binary(_)) && socket.send(msg).await.is_err() {
                    break;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_frames_round_trip_through_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/connect", get(echo)))
                .await
                .unwrap();
        });

        let connector = WebSocketConnector::default();
        let mut conn = connector
            .connect(&format!("ws://{}/connect", addr))
            .await
            .unwrap();
        assert!(conn.is_open());

        conn.send(Frame::ping_with_timestamp(7)).await.unwrap();
        conn.send(Frame::subscribe(1, "customer", "STOK1")).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some(Frame::ping_with_timestamp(7)));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Frame::subscribe(1, "customer", "STOK1"))
        );

        conn.close().await.unwrap();
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send(Frame::ping()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
