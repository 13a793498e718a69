//! Session tuning

use std::time::Duration;

/// Tuning knobs for a multiplexed session
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Streams opened by the peer that may wait for `accept_stream`.
    ///
    /// Zero refuses every stream the peer opens, for sessions that only
    /// open streams themselves.
    pub accept_backlog: usize,
    /// How long `ping` waits for the matching pong
    pub ping_timeout: Duration,
    /// Interval of background liveness pings; `None` disables them
    pub keepalive_interval: Option<Duration>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            accept_backlog: 256,
            ping_timeout: Duration::from_secs(10),
            keepalive_interval: Some(Duration::from_secs(30)),
        }
    }
}
