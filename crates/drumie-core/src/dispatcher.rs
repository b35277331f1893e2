//! Inbound frame demultiplexing.
//!
//! Every frame received on the session's single connection is routed
//! either to the session itself (connection-level frames and frames scoped
//! to [`SESSION_SCOPE`]) or to one channel by the channel name it embeds.
//! Frames are delivered in wire order; nothing is buffered or reordered.

use drumie_protocol::{Frame, Payload, PresenceAction};
use tracing::trace;

use crate::channel::Channel;

/// Reserved channel identifier for connection-level frames.
pub const SESSION_SCOPE: &str = "$session";

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A frame type only clients send.
    ClientFrame,
    /// A channel frame addressed to the session scope.
    ReservedScope,
    /// No registered channel has that name.
    UnknownChannel,
    /// The channel exists but is not in a state to accept the frame.
    NotSubscribed,
    /// A session ack or error that matches no outstanding request.
    Unmatched,
    /// Bytes that did not decode as a frame.
    Malformed,
}

impl DropReason {
    /// Label used for the `reason` metric dimension.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientFrame => "client_frame",
            Self::ReservedScope => "reserved_scope",
            Self::UnknownChannel => "unknown_channel",
            Self::NotSubscribed => "not_subscribed",
            Self::Unmatched => "unmatched",
            Self::Malformed => "malformed",
        }
    }
}

/// A frame addressed to the session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionEvent {
    Connected {
        connection_id: String,
        version: u8,
        heartbeat: u32,
    },
    Disconnect {
        code: u16,
        reason: String,
        reconnect: bool,
    },
    Ping {
        timestamp: Option<u64>,
    },
    Pong,
    /// An ack that names no channel.
    Ack {
        id: u64,
    },
    /// An error that names no channel.
    Error {
        id: u64,
        code: u16,
        message: String,
    },
}

/// A frame addressed to one channel.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChannelEvent {
    SubscribeAck {
        id: u64,
    },
    SubscribeError {
        id: u64,
        code: u16,
        message: String,
    },
    Presence {
        action: PresenceAction,
        client: String,
        data: Option<serde_json::Value>,
    },
    Message {
        payload: Payload,
        source: Option<String>,
        event: Option<String>,
    },
}

/// Where an inbound frame goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Route {
    Session(SessionEvent),
    Channel { channel: String, event: ChannelEvent },
    Dropped(DropReason),
}

/// Route an inbound frame.
pub(crate) fn route(frame: Frame) -> Route {
    let route = match frame {
        Frame::Connected {
            connection_id,
            version,
            heartbeat,
        } => Route::Session(SessionEvent::Connected {
            connection_id,
            version,
            heartbeat,
        }),
        Frame::Disconnect {
            code,
            reason,
            reconnect,
        } => Route::Session(SessionEvent::Disconnect {
            code,
            reason,
            reconnect,
        }),
        Frame::Ping { timestamp } => Route::Session(SessionEvent::Ping { timestamp }),
        Frame::Pong { .. } => Route::Session(SessionEvent::Pong),

        Frame::Ack { id, channel } => match channel {
            Some(channel) if channel != SESSION_SCOPE => Route::Channel {
                channel,
                event: ChannelEvent::SubscribeAck { id },
            },
            _ => Route::Session(SessionEvent::Ack { id }),
        },
        Frame::Error {
            id,
            code,
            message,
            channel,
        } => match channel {
            Some(channel) if channel != SESSION_SCOPE => Route::Channel {
                channel,
                event: ChannelEvent::SubscribeError { id, code, message },
            },
            _ => Route::Session(SessionEvent::Error { id, code, message }),
        },

        Frame::Presence { channel, .. } | Frame::Publish { channel, .. }
            if channel == SESSION_SCOPE =>
        {
            Route::Dropped(DropReason::ReservedScope)
        }
        Frame::Presence {
            channel,
            action,
            client,
            data,
        } => Route::Channel {
            channel,
            event: ChannelEvent::Presence {
                action,
                client,
                data,
            },
        },
        Frame::Publish {
            channel,
            event,
            source,
            payload,
            ..
        } => Route::Channel {
            channel,
            event: ChannelEvent::Message {
                payload,
                source,
                event,
            },
        },

        Frame::Connect { .. } | Frame::Subscribe { .. } | Frame::Unsubscribe { .. } => {
            Route::Dropped(DropReason::ClientFrame)
        }
    };
    trace!(?route, "Routed inbound frame");
    route
}

/// Deliver a channel event, firing the channel's callbacks.
///
/// Returns `false` if the channel was not in a state to accept it.
pub(crate) fn deliver(channel: &mut Channel, event: ChannelEvent) -> bool {
    match event {
        ChannelEvent::SubscribeAck { id } => channel.on_subscribe_ack(id),
        ChannelEvent::SubscribeError { id, code, message } => {
            channel.on_subscribe_error(id, code, message)
        }
        ChannelEvent::Presence {
            action,
            client,
            data,
        } => channel.on_presence(action, client, data),
        ChannelEvent::Message {
            payload,
            source,
            event,
        } => channel.on_message(payload, source, event),
    }
}
