//! Multiplexed session tuning shared by agent and relay

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tt_protocol::MuxConfig;

use super::serde_utils::duration;

/// Session settings as they appear in config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer-opened streams that may queue before being accepted
    pub accept_backlog: usize,

    /// How long a ping waits for its pong
    #[serde(with = "duration")]
    pub ping_timeout: Duration,

    /// Background keepalive period; 0 disables keepalive
    #[serde(with = "duration")]
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            accept_backlog: 256,
            ping_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl From<&SessionConfig> for MuxConfig {
    fn from(config: &SessionConfig) -> Self {
        MuxConfig {
            accept_backlog: config.accept_backlog,
            ping_timeout: config.ping_timeout,
            keepalive_interval: (!config.keepalive_interval.is_zero())
                .then_some(config.keepalive_interval),
        }
    }
}
