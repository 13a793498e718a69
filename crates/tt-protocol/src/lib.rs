//! tt-protocol: Wire protocol and stream multiplexer for tether
//!
//! This crate defines the framed binary protocol spoken between the agent
//! and the relay server over TLS, and the [`mux::Session`] that carries many
//! independent byte streams over one transport.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod mux;
pub mod stream_id;

pub use codec::{Frame, FrameCodec};
pub use error::{MuxError, ProtocolError};
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{Message, MessageType};
pub use mux::{MuxConfig, MuxStream, Role, Session};
pub use stream_id::StreamId;
