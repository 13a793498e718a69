//! Stream multiplexing over a single transport
//!
//! A [`Session`] wraps any `AsyncRead + AsyncWrite` transport and carries
//! many [`MuxStream`]s over it. Each stream is an ordered, flow-controlled
//! byte pipe; streams are independent of one another.

mod config;
mod session;
mod stream;

pub use config::MuxConfig;
pub use session::{Role, Session};
pub use stream::MuxStream;

/// Receive window each side grants per stream, in bytes
pub const INITIAL_WINDOW: u32 = 256 * 1024;

/// Largest payload carried by a single `Data` frame
pub const MAX_DATA_CHUNK: usize = 16 * 1024;
