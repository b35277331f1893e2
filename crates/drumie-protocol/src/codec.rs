//! Codec for encoding and decoding Drumie frames.
//!
//! Frames are MessagePack-encoded with named fields and carried behind a
//! 4-byte big-endian length prefix. The same framing is used in both
//! directions, so a session's outbound encoder and its inbound dispatcher
//! always agree on the byte format.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Read and validate the length prefix at the start of `data`.
fn frame_length(data: &[u8]) -> Result<Option<usize>, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    Ok(Some(length))
}

/// Encode a frame to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(buf.freeze())
}

/// Decode a single frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let Some(length) = frame_length(data)? else {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    };

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let frame = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(frame)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// A frame whose body fails to decode is still consumed from the buffer,
/// so the stream stays aligned on the next length prefix.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(length) = frame_length(buf)? else {
        return Ok(None);
    };

    if buf.len() < LENGTH_PREFIX_SIZE + length {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let body = buf.split_to(length);
    let frame = rmp_serde::from_slice(&body)?;

    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{Payload, PresenceAction};
    use serde_json::json;

    #[test]
    fn test_encode_decode_session_frames() {
        let frames = vec![
            Frame::connect(1, "TOK1", Some("John Doe".to_string())),
            Frame::connected("conn-123", 1, 25_000),
            Frame::disconnect(3501, "token expired", true),
            Frame::ping_with_timestamp(42),
            Frame::pong(None),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            assert_eq!(decode(&encoded).unwrap(), frame);
        }
    }

    #[test]
    fn test_encode_decode_channel_frames() {
        let frames = vec![
            Frame::subscribe(1, "customer", "STOK1"),
            Frame::subscribe_ack(1, "customer"),
            Frame::subscribe_error(2, "nice", 1003, "permission denied"),
            Frame::presence("customer", PresenceAction::Join, "user-2", Some(json!({"name": "Jane"}))),
            Frame::message("customer", "user-2", json!({"message": "auto publish from client"})),
            Frame::unsubscribe(3, "customer"),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            assert_eq!(decode(&encoded).unwrap(), frame);
        }
    }

    #[test]
    fn test_text_payload_is_not_confused_with_json_string() {
        let frame = Frame::publish("customer", Payload::Json(json!("hello")));
        let decoded = decode(&encode(&frame).unwrap()).unwrap();

        match decoded {
            Frame::Publish { payload, .. } => assert_eq!(payload, Payload::Json(json!("hello"))),
            other => panic!("Expected Publish frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_incomplete() {
        let frame = Frame::subscribe(1, "test", "tok");
        let encoded = encode(&frame).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }

        match decode(&encoded[..2]) {
            Err(ProtocolError::Incomplete(2)) => {}
            other => panic!("Expected Incomplete(2) error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let large = "x".repeat(MAX_FRAME_SIZE + 1);
        let frame = Frame::publish("test", large);

        match encode(&frame) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }

        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_streaming_decode() {
        let frame1 = Frame::subscribe_ack(1, "customer");
        let frame2 = Frame::message("customer", "user-2", "auto publish 1");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&frame1).unwrap());
        let second = encode(&frame2).unwrap();
        buf.extend_from_slice(&second[..3]);

        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame1));
        assert_eq!(decode_from(&mut buf).unwrap(), None);

        buf.extend_from_slice(&second[3..]);
        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame2));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_malformed_body_is_consumed() {
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.extend_from_slice(&[0xc1, 0xc1, 0xc1]);
        buf.extend_from_slice(&encode(&Frame::ping()).unwrap());

        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::Decode(_))
        ));
        assert_eq!(decode_from(&mut buf).unwrap(), Some(Frame::ping()));
    }
}
