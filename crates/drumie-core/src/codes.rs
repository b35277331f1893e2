//! Codes carried by `connecting`, `disconnected` and `subscribing` contexts.
//!
//! Server-issued disconnect codes are passed through unchanged; the codes
//! below are the ones the client produces itself.

/// `connect()` or `subscribe()` was called by the application.
pub const CONNECT_CALLED: u16 = 0;
/// An automatic reconnect attempt is starting.
pub const RECONNECTING: u16 = 1;
/// The transport closed without a disconnect frame.
pub const TRANSPORT_CLOSED: u16 = 2;
/// No inbound traffic for two heartbeat intervals.
pub const NO_PING: u16 = 3;
/// The server did not acknowledge the connect frame in time.
pub const HANDSHAKE_TIMEOUT: u16 = 4;
/// `disconnect()` was called by the application.
pub const DISCONNECT_CALLED: u16 = 5;
/// The reconnect policy gave up.
pub const RECONNECT_EXHAUSTED: u16 = 6;
/// The connect or subscribe token provider failed.
pub const TOKEN_FETCH_FAILED: u16 = 7;
/// The transport could not be dialed.
pub const CONNECT_FAILED: u16 = 8;
/// The server answered with an incompatible protocol version.
pub const UNSUPPORTED_VERSION: u16 = 9;
/// `subscribe()` was called on a channel.
pub const SUBSCRIBE_CALLED: u16 = 10;
/// The server refused a subscription.
pub const SUBSCRIBE_REJECTED: u16 = 11;
