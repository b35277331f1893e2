//! Frame types for the Drumie protocol.
//!
//! Frames are the fundamental unit of communication between a Drumie client
//! and the server. Each frame is serialized using MessagePack with named
//! fields and a `type` tag.
//!
//! Client to server: `connect`, `subscribe`, `unsubscribe`, `publish`,
//! `ping`/`pong`.
//!
//! Server to client: `connected`, `disconnect`, `ack`, `error`, `presence`,
//! `publish`, `ping`/`pong`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Subscribe = 0x01,
    Unsubscribe = 0x02,
    Publish = 0x03,
    Presence = 0x04,
    Ack = 0x05,
    Error = 0x06,
    Ping = 0x07,
    Pong = 0x08,
    Connect = 0x09,
    Connected = 0x0A,
    Disconnect = 0x0B,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Subscribe),
            0x02 => Ok(FrameType::Unsubscribe),
            0x03 => Ok(FrameType::Publish),
            0x04 => Ok(FrameType::Presence),
            0x05 => Ok(FrameType::Ack),
            0x06 => Ok(FrameType::Error),
            0x07 => Ok(FrameType::Ping),
            0x08 => Ok(FrameType::Pong),
            0x09 => Ok(FrameType::Connect),
            0x0A => Ok(FrameType::Connected),
            0x0B => Ok(FrameType::Disconnect),
            _ => Err("Invalid frame type"),
        }
    }
}

/// Presence action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PresenceAction {
    /// Another client joined the channel.
    Join = 0,
    /// Another client left the channel.
    Leave = 1,
}

impl From<PresenceAction> for u8 {
    fn from(pa: PresenceAction) -> u8 {
        pa as u8
    }
}

impl TryFrom<u8> for PresenceAction {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PresenceAction::Join),
            1 => Ok(PresenceAction::Leave),
            _ => Err("Invalid presence action"),
        }
    }
}

/// Application payload carried by a publish frame.
///
/// A payload is either a plain string or a structured JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text.
    Text(String),
    /// Structured object.
    Json(serde_json::Value),
}

impl Payload {
    /// Get the payload as text, if it is a text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// Get the payload as a JSON value, if it is a structured payload.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Text(_) => None,
            Payload::Json(value) => Some(value),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Json(value) => write!(f, "{value}"),
        }
    }
}

/// A protocol frame.
///
/// Frames are the messages exchanged between clients and servers.
/// Each frame type has specific fields relevant to its operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Subscribe to a channel.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name to subscribe to.
        channel: String,
        /// Subscription token for this channel.
        token: String,
    },

    /// Unsubscribe from a channel.
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        /// Request ID for acknowledgment.
        id: u64,
        /// Channel name to unsubscribe from.
        channel: String,
    },

    /// A message on a channel.
    ///
    /// Sent by clients to publish, and by the server to deliver.
    #[serde(rename = "publish")]
    Publish {
        /// Optional request ID for acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Target channel.
        channel: String,
        /// Optional event name.
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        /// Publishing client, filled in by the server on delivery.
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Message payload.
        payload: Payload,
    },

    /// Presence notification for a channel.
    #[serde(rename = "presence")]
    Presence {
        /// Channel name.
        channel: String,
        /// Presence action.
        action: PresenceAction,
        /// The client that joined or left.
        client: String,
        /// Optional presence metadata.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    /// Acknowledgment of a request.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged request.
        id: u64,
        /// Channel the request targeted, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
        /// Channel the failed request targeted, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Initial connection handshake.
    #[serde(rename = "connect")]
    Connect {
        /// Protocol major version.
        version: u8,
        /// Connection token.
        token: String,
        /// Optional client name.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Connection established response.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Negotiated protocol version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds (0 disables).
        heartbeat: u32,
    },

    /// Connection refused or closed by the server.
    #[serde(rename = "disconnect")]
    Disconnect {
        /// Disconnect code.
        code: u16,
        /// Human-readable reason.
        reason: String,
        /// Whether the client should try to reconnect.
        reconnect: bool,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Subscribe { .. } => FrameType::Subscribe,
            Frame::Unsubscribe { .. } => FrameType::Unsubscribe,
            Frame::Publish { .. } => FrameType::Publish,
            Frame::Presence { .. } => FrameType::Presence,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Disconnect { .. } => FrameType::Disconnect,
        }
    }

    /// Get the channel this frame is addressed to, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        match self {
            Frame::Subscribe { channel, .. }
            | Frame::Unsubscribe { channel, .. }
            | Frame::Publish { channel, .. }
            | Frame::Presence { channel, .. } => Some(channel),
            Frame::Ack { channel, .. } | Frame::Error { channel, .. } => channel.as_deref(),
            _ => None,
        }
    }

    /// Create a new Subscribe frame.
    #[must_use]
    pub fn subscribe(id: u64, channel: impl Into<String>, token: impl Into<String>) -> Self {
        Frame::Subscribe {
            id,
            channel: channel.into(),
            token: token.into(),
        }
    }

    /// Create a new Unsubscribe frame.
    #[must_use]
    pub fn unsubscribe(id: u64, channel: impl Into<String>) -> Self {
        Frame::Unsubscribe {
            id,
            channel: channel.into(),
        }
    }

    /// Create a new Publish frame.
    #[must_use]
    pub fn publish(channel: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Frame::Publish {
            id: None,
            channel: channel.into(),
            event: None,
            source: None,
            payload: payload.into(),
        }
    }

    /// Create a Publish frame as delivered by the server.
    #[must_use]
    pub fn message(
        channel: impl Into<String>,
        source: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        Frame::Publish {
            id: None,
            channel: channel.into(),
            event: None,
            source: Some(source.into()),
            payload: payload.into(),
        }
    }

    /// Create a new Presence frame.
    #[must_use]
    pub fn presence(
        channel: impl Into<String>,
        action: PresenceAction,
        client: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Frame::Presence {
            channel: channel.into(),
            action,
            client: client.into(),
            data,
        }
    }

    /// Create a new Ack frame that is not tied to a channel.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id, channel: None }
    }

    /// Create a subscribe acknowledgment for a channel.
    #[must_use]
    pub fn subscribe_ack(id: u64, channel: impl Into<String>) -> Self {
        Frame::Ack {
            id,
            channel: Some(channel.into()),
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
            channel: None,
        }
    }

    /// Create a subscribe rejection for a channel.
    #[must_use]
    pub fn subscribe_error(
        id: u64,
        channel: impl Into<String>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
            channel: Some(channel.into()),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Ping frame with timestamp.
    #[must_use]
    pub fn ping_with_timestamp(timestamp: u64) -> Self {
        Frame::Ping {
            timestamp: Some(timestamp),
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connect frame.
    #[must_use]
    pub fn connect(version: u8, token: impl Into<String>, name: Option<String>) -> Self {
        Frame::Connect {
            version,
            token: token.into(),
            name,
        }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a new Disconnect frame.
    #[must_use]
    pub fn disconnect(code: u16, reason: impl Into<String>, reconnect: bool) -> Self {
        Frame::Disconnect {
            code,
            reason: reason.into(),
            reconnect,
        }
    }
}
