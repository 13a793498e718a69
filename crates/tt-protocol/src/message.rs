//! Message types for the tether multiplexing protocol
//!
//! Every frame carries exactly one message. Stream messages (`Open`, `Data`,
//! `WindowUpdate`, `Close`, `Reset`) address the stream named in the frame
//! header; session messages (`Ping`, `Pong`, `GoAway`) travel on
//! [`StreamId::CONTROL`](crate::StreamId::CONTROL).
//!
//! # Message Flow
//!
//! 1. The opener allocates a stream id and sends `Open`
//! 2. `Data` flows in both directions, bounded by the peer's window
//! 3. The receiver returns credit with `WindowUpdate` as it consumes data
//! 4. Each side sends `Close` when it has nothing more to write
//! 5. `Reset` aborts a stream immediately in both directions
//!
//! `Ping`/`Pong` probe session liveness; `GoAway` announces that the sender
//! is closing the whole session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Open a new stream
    Open = 0x01,
    /// Stream payload
    Data = 0x02,
    /// Receive-window credit
    WindowUpdate = 0x03,
    /// Half-close
    Close = 0x04,
    /// Abort a stream
    Reset = 0x05,
    /// Liveness probe
    Ping = 0x06,
    /// Liveness probe answer
    Pong = 0x07,
    /// Session is going away
    GoAway = 0x08,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Open),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::WindowUpdate),
            0x04 => Some(Self::Close),
            0x05 => Some(Self::Reset),
            0x06 => Some(Self::Ping),
            0x07 => Some(Self::Pong),
            0x08 => Some(Self::GoAway),
            _ => None,
        }
    }

    /// Whether this message belongs on the control stream
    pub fn is_session_level(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong | Self::GoAway)
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Open the stream named in the frame header
    Open,

    /// Stream payload
    Data(Bytes),

    /// Grant the peer `credit` more bytes of send window
    WindowUpdate {
        /// Number of bytes the receiver has consumed since the last update
        credit: u32,
    },

    /// The sender will write no more data on this stream
    Close,

    /// Abort the stream in both directions
    Reset,

    /// Liveness probe
    Ping {
        /// Echoed back in the matching `Pong`
        nonce: u64,
    },

    /// Liveness probe answer
    Pong {
        /// Nonce of the `Ping` being answered
        nonce: u64,
    },

    /// The sender is closing the session
    GoAway,
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Open => MessageType::Open,
            Message::Data(_) => MessageType::Data,
            Message::WindowUpdate { .. } => MessageType::WindowUpdate,
            Message::Close => MessageType::Close,
            Message::Reset => MessageType::Reset,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
            Message::GoAway => MessageType::GoAway,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::Open,
            MessageType::Data,
            MessageType::WindowUpdate,
            MessageType::Close,
            MessageType::Reset,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::GoAway,
        ] {
            let byte = msg_type.as_u8();
            let recovered = MessageType::from_u8(byte).unwrap();
            assert_eq!(recovered, msg_type);
        }
    }

    #[test]
    fn test_unknown_type_byte() {
        assert_eq!(MessageType::from_u8(0x00), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn test_session_level_messages() {
        assert!(Message::Ping { nonce: 1 }.message_type().is_session_level());
        assert!(Message::GoAway.message_type().is_session_level());
        assert!(!Message::Open.message_type().is_session_level());
        assert!(!Message::Data(Bytes::new()).message_type().is_session_level());
    }
}
