//! Bidirectional byte relay between two duplex endpoints

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// One of the two copy directions of a [`relay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes read from `a`, written to `b`
    AToB,
    /// Bytes read from `b`, written to `a`
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => f.write_str("a->b"),
            Direction::BToA => f.write_str("b->a"),
        }
    }
}

/// How a relay ended
#[derive(Debug)]
pub struct RelayOutcome {
    /// The direction that finished first and ended the relay
    pub first_closed: Direction,
    /// Bytes that direction carried (0 if it failed)
    pub bytes: u64,
    /// Why that direction stopped, if not a clean EOF
    pub error: Option<io::Error>,
}

/// Copy `a` to `b` and `b` to `a` until either direction stops.
///
/// As soon as one direction reaches EOF or fails, the write sides of both
/// endpoints are shut down and both are dropped. The other direction is not
/// left running.
pub async fn relay<A, B>(a: A, b: B) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let (first_closed, result) = tokio::select! {
        r = tokio::io::copy(&mut a_read, &mut b_write) => (Direction::AToB, r),
        r = tokio::io::copy(&mut b_read, &mut a_write) => (Direction::BToA, r),
    };

    let _ = a_write.shutdown().await;
    let _ = b_write.shutdown().await;

    let outcome = match result {
        Ok(bytes) => RelayOutcome {
            first_closed,
            bytes,
            error: None,
        },
        Err(e) => RelayOutcome {
            first_closed,
            bytes: 0,
            error: Some(e),
        },
    };
    trace!(
        "Relay finished: {} closed first after {} bytes",
        outcome.first_closed,
        outcome.bytes
    );
    outcome
}
