//! Protocol error types

use thiserror::Error;

use crate::message::MessageType;

/// Errors that can occur while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Header and payload disagree on the message type
    #[error("Invalid frame header: declared {declared:?}, payload is {actual:?}")]
    InvalidHeader {
        declared: MessageType,
        actual: MessageType,
    },

    /// Unknown message type
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a multiplexed session
#[derive(Error, Debug)]
pub enum MuxError {
    /// The session is closed; no further streams can be opened or accepted
    #[error("Session closed")]
    SessionClosed,

    /// The peer did not answer a ping in time
    #[error("Ping timed out after {0:?}")]
    PingTimeout(std::time::Duration),

    /// No stream ids are left on this session
    #[error("Stream ids exhausted")]
    StreamsExhausted,

    /// Malformed traffic from the peer
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
