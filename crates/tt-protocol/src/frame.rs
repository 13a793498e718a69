//! Frame header
//!
//! Every frame starts with eight bytes, all big-endian:
//!
//! ```text
//! +-----------+------+----------------+
//! | stream id | type | payload length |
//! |  4 bytes  |  1   |    3 bytes     |
//! +-----------+------+----------------+
//! ```
//!
//! The length field could express 16 MiB, but payloads are capped at
//! [`MAX_PAYLOAD_SIZE`] and a header announcing more is rejected before any
//! of its payload is buffered.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::MessageType;
use crate::stream_id::StreamId;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Maximum accepted payload size.
///
/// Data frames carry at most [`MAX_DATA_CHUNK`](crate::mux::MAX_DATA_CHUNK)
/// bytes, so anything much larger than that is a misbehaving peer.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Routing and length information for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Stream the payload belongs to
    pub stream_id: StreamId,
    /// Type of the message in the payload
    pub message_type: MessageType,
    /// Payload length in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(stream_id: StreamId, message_type: MessageType, payload_length: u32) -> Self {
        Self {
            stream_id,
            message_type,
            payload_length,
        }
    }

    /// Append the encoded header to `dst`.
    ///
    /// Only the low 24 bits of `payload_length` are written.
    pub fn encode(&self, dst: &mut BytesMut) {
        let [_, high, mid, low] = self.payload_length.to_be_bytes();
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.stream_id.as_u32());
        dst.put_u8(self.message_type.as_u8());
        dst.put_slice(&[high, mid, low]);
    }

    /// Take a header off the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched until all eight bytes
    /// are there. Unknown message types and lengths over
    /// [`MAX_PAYLOAD_SIZE`] are errors.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let type_byte = src[4];
        let message_type =
            MessageType::from_u8(type_byte).ok_or(ProtocolError::UnknownMessageType(type_byte))?;
        let payload_length = u32::from_be_bytes([0, src[5], src[6], src[7]]);
        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let stream_id = StreamId::new(src.get_u32());
        src.advance(HEADER_SIZE - 4);

        Ok(Some(Self {
            stream_id,
            message_type,
            payload_length,
        }))
    }
}
