//! # drumie-core
//!
//! Session management for the Drumie real-time pub/sub client.
//!
//! This crate provides the building blocks of a client session:
//!
//! - **Session** - One authenticated connection, reconnected with backoff
//! - **Channel** - A named subscription multiplexed over the session
//! - **Dispatcher** - Routes inbound frames to the session or a channel
//! - **Presence** - Tracks which clients are present on a channel
//! - **Token** - Connection and subscription token providers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  commands  ┌─────────────┐   frames   ┌─────────────┐
//! │   Session   │───────────▶│   Driver    │◀──────────▶│  Connection │
//! │ChannelHandle│            └─────────────┘            └─────────────┘
//! └─────────────┘                   │
//!                                   ▼
//!                   ┌─────────────┐   ┌─────────────┐
//!                   │ Dispatcher  │──▶│  Channels   │
//!                   └─────────────┘   └─────────────┘
//! ```

pub mod channel;
pub mod codes;
pub mod config;
pub mod dispatcher;
mod driver;
pub mod error;
pub mod events;
pub mod metrics;
pub mod presence;
pub mod reconnect;
mod registry;
pub mod session;
pub mod token;

pub use channel::{validate_channel_name, ChannelSpec, ChannelState, MAX_CHANNEL_NAME_LENGTH};
pub use config::{PresencePolicy, SessionConfig};
pub use dispatcher::{DropReason, SESSION_SCOPE};
pub use error::ClientError;
pub use events::{
    ConnectedContext, ConnectingContext, DisconnectedContext, ListenContext, PresenceContext,
    SubscribedContext, SubscribingContext,
};
pub use presence::{Presence, PresenceState};
pub use reconnect::ReconnectPolicy;
pub use session::{ChannelHandle, ConnectionState, Session, SessionOptions};
pub use token::{
    connect_token_fn, subscribe_token_fn, ConnectTokenProvider, SubscribeTokenProvider,
    SubscribeTokenRequest, Token, TokenError,
};

pub use drumie_protocol::Payload;
