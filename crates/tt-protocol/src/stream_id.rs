//! Stream identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sub-stream within a multiplexed session.
///
/// The initiating side allocates odd ids, the accepting side even ids, so
/// both ends can open streams without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Create a new stream ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Special stream ID for session-level messages (ping, go-away)
    pub const CONTROL: StreamId = StreamId(0);

    /// Whether this id was allocated by the initiating side
    pub fn is_initiator(&self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_display() {
        let id = StreamId::new(42);
        assert_eq!(format!("{}", id), "stream-42");
    }

    #[test]
    fn test_stream_id_parity() {
        assert!(StreamId::new(1).is_initiator());
        assert!(!StreamId::new(2).is_initiator());
        assert!(!StreamId::CONTROL.is_initiator());
    }
}
