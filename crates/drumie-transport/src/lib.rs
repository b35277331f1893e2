//! # drumie-transport
//!
//! Client transport layer for Drumie sessions.
//!
//! A session dials its server through a [`Connector`] and then speaks
//! length-prefixed frames over the resulting [`Connection`]:
//!
//! - **WebSocket** - the production transport
//! - **Memory** - an in-process loopback whose server side is driven by hand
//!
//! ```rust,ignore
//! use drumie_transport::{Connector, WebSocketConnector};
//!
//! let mut conn = WebSocketConnector::default().connect("ws://localhost:8000/connect").await?;
//! while let Some(frame) = conn.recv().await? {
//!     // Route frame
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryPeer};
pub use traits::{Connection, ConnectionId, Connector, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection, WebSocketConnector};
