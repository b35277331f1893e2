//! # drumie-protocol
//!
//! Wire protocol definitions for the Drumie pub/sub client.
//!
//! This crate defines the binary protocol spoken between a Drumie session
//! and its server, including frame types, the codec, and versioning.
//!
//! ## Frame Types
//!
//! - `Connect` / `Connected` / `Disconnect` - Connection handshake and teardown
//! - `Subscribe` / `Unsubscribe` - Channel membership
//! - `Publish` - Messages on channels, in both directions
//! - `Presence` - Join/leave notifications
//! - `Ack` / `Error` - Acknowledgments and rejections
//!
//! ## Example
//!
//! ```rust
//! use drumie_protocol::{Frame, codec};
//!
//! let frame = Frame::publish("customer", "auto publish 1");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameType, Payload, PresenceAction};
pub use version::{Version, PROTOCOL_VERSION};
