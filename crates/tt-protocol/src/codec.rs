//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::Message;
use crate::stream_id::StreamId;

/// A complete frame with header and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream this frame belongs to
    pub stream_id: StreamId,
    /// The message payload
    pub message: Message,
}

impl Frame {
    /// Create a new frame
    pub fn new(stream_id: StreamId, message: Message) -> Self {
        Self {
            stream_id,
            message,
        }
    }

    /// Create a session-level frame
    pub fn control(message: Message) -> Self {
        Self::new(StreamId::CONTROL, message)
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Header decoded while waiting for the rest of its payload
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        // Bounded by MAX_PAYLOAD_SIZE in FrameHeader::decode
        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload_bytes = src.split_to(payload_len).freeze();
        let message: Message = bincode::deserialize(&payload_bytes)?;

        if message.message_type() != header.message_type {
            return Err(ProtocolError::InvalidHeader {
                declared: header.message_type,
                actual: message.message_type(),
            });
        }

        Ok(Some(Frame {
            stream_id: header.stream_id,
            message,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&frame.message)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = FrameHeader::new(
            frame.stream_id,
            frame.message.message_type(),
            payload_len as u32,
        );
        header.encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
