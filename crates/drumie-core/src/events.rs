//! Lifecycle callbacks and their contexts.
//!
//! Every callback runs on the session driver task. Callbacks must return
//! quickly; calling back into a [`Session`](crate::Session) or
//! [`ChannelHandle`](crate::ChannelHandle) from a callback is allowed but
//! the request is only processed after the callback returns.

use drumie_protocol::Payload;
use std::fmt;
use std::sync::Arc;

use crate::error::ClientError;

/// A shared callback slot.
pub type Callback<C> = Arc<dyn Fn(C) + Send + Sync>;

/// A connect attempt started or failed before the transport was up.
#[derive(Debug, Clone)]
pub struct ConnectingContext {
    /// Why the attempt started or failed (see [`crate::codes`]).
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
    /// Set when the attempt failed.
    pub error: Option<ClientError>,
}

/// The server accepted the connection.
#[derive(Debug, Clone)]
pub struct ConnectedContext {
    /// Server-assigned connection identifier.
    pub connection_id: String,
    /// Name of the connector in use.
    pub transport: &'static str,
    /// Negotiated protocol major version.
    pub version: u8,
    /// Heartbeat interval in milliseconds, 0 when disabled.
    pub heartbeat: u32,
}

/// The connection was lost or closed.
#[derive(Debug, Clone)]
pub struct DisconnectedContext {
    /// Disconnect code, client-side (see [`crate::codes`]) or server-issued.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
    /// Whether a reconnect has been scheduled.
    pub reconnect: bool,
}

/// A channel started subscribing, or its subscribe attempt failed.
#[derive(Debug, Clone)]
pub struct SubscribingContext {
    /// Channel name.
    pub channel: String,
    /// Why the attempt started or failed.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
    /// Set when the attempt failed.
    pub error: Option<ClientError>,
}

/// A channel subscription was acknowledged.
#[derive(Debug, Clone)]
pub struct SubscribedContext {
    /// Channel name.
    pub channel: String,
    /// True for an automatic resubscribe after the connection came back.
    pub resubscribed: bool,
}

/// Another client joined or left a channel.
#[derive(Debug, Clone)]
pub struct PresenceContext {
    /// Channel name.
    pub channel: String,
    /// The client that joined or left.
    pub client: String,
    /// Presence metadata.
    pub data: Option<serde_json::Value>,
    /// True when re-announcing a member retained across a reconnect.
    pub replayed: bool,
}

/// A message arrived on a channel.
#[derive(Debug, Clone)]
pub struct ListenContext {
    /// Channel name.
    pub channel: String,
    /// Message payload.
    pub payload: Payload,
    /// Publishing client, if the server reports it.
    pub source: Option<String>,
    /// Event name, if any.
    pub event: Option<String>,
}

/// Connection-level callbacks.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub(crate) connecting: Option<Callback<ConnectingContext>>,
    pub(crate) connected: Option<Callback<ConnectedContext>>,
    pub(crate) disconnected: Option<Callback<DisconnectedContext>>,
}

impl SessionCallbacks {
    pub(crate) fn connecting(&self, ctx: ConnectingContext) {
        if let Some(cb) = &self.connecting {
            cb(ctx);
        }
    }

    pub(crate) fn connected(&self, ctx: ConnectedContext) {
        if let Some(cb) = &self.connected {
            cb(ctx);
        }
    }

    pub(crate) fn disconnected(&self, ctx: DisconnectedContext) {
        if let Some(cb) = &self.disconnected {
            cb(ctx);
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("connecting", &self.connecting.is_some())
            .field("connected", &self.connected.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .finish()
    }
}

/// Per-channel callbacks.
#[derive(Clone, Default)]
pub struct ChannelCallbacks {
    pub(crate) subscribing: Option<Callback<SubscribingContext>>,
    pub(crate) subscribed: Option<Callback<SubscribedContext>>,
    pub(crate) join: Option<Callback<PresenceContext>>,
    pub(crate) leave: Option<Callback<PresenceContext>>,
    pub(crate) listen: Option<Callback<ListenContext>>,
}

impl ChannelCallbacks {
    pub(crate) fn subscribing(&self, ctx: SubscribingContext) {
        if let Some(cb) = &self.subscribing {
            cb(ctx);
        }
    }

    pub(crate) fn subscribed(&self, ctx: SubscribedContext) {
        if let Some(cb) = &self.subscribed {
            cb(ctx);
        }
    }

    pub(crate) fn join(&self, ctx: PresenceContext) {
        if let Some(cb) = &self.join {
            cb(ctx);
        }
    }

    pub(crate) fn leave(&self, ctx: PresenceContext) {
        if let Some(cb) = &self.leave {
            cb(ctx);
        }
    }

    pub(crate) fn listen(&self, ctx: ListenContext) {
        if let Some(cb) = &self.listen {
            cb(ctx);
        }
    }
}

impl fmt::Debug for ChannelCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCallbacks")
            .field("subscribing", &self.subscribing.is_some())
            .field("subscribed", &self.subscribed.is_some())
            .field("join", &self.join.is_some())
            .field("leave", &self.leave.is_some())
            .field("listen", &self.listen.is_some())
            .finish()
    }
}
