//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration;
use super::SessionConfig;
use crate::error::ConfigError;

/// Configuration for the tunnel agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Relay server address to dial
    pub relay_address: String,

    /// Fixed target every stream is forwarded to.
    ///
    /// When unset, each stream is served by the embedded SOCKS5 responder.
    pub target_address: Option<String>,

    /// Pinned SHA-256 fingerprint of the relay certificate (colon-hex)
    pub fingerprint: Option<String>,

    /// Accept any relay certificate without pinning
    pub skip_verify: bool,

    /// Retry after a fatal error instead of exiting
    pub auto_restart: bool,

    /// Delay policy between restarts
    pub restart: BackoffConfig,

    /// Bound on the TCP dial to the relay
    #[serde(with = "duration")]
    pub connect_timeout: Duration,

    /// Bound on dials to targets on behalf of the relay
    #[serde(with = "duration")]
    pub dial_timeout: Duration,

    /// Session tuning
    pub session: SessionConfig,
}

impl AgentConfig {
    /// Reject values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.restart.validate()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            relay_address: "127.0.0.1:5555".to_string(),
            target_address: None,
            fingerprint: None,
            skip_verify: false,
            auto_restart: false,
            restart: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(10),
            session: SessionConfig::default(),
        }
    }
}

/// Backoff policy for restarts.
///
/// The default is a fixed 10 second delay. Setting `multiplier` above 1.0
/// and `max` above `initial` gives exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl BackoffConfig {
    /// The same delay every time
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Check that `multiplier` is finite and at least 1.0 and that
    /// `jitter` lies in 0.0..=1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "restart.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "restart.jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.relay_address, "127.0.0.1:5555");
        assert!(config.target_address.is_none());
        assert!(config.fingerprint.is_none());
        assert!(!config.skip_verify);
        assert!(!config.auto_restart);
        assert_eq!(config.restart, BackoffConfig::fixed(Duration::from_secs(10)));
    }

    #[test]
    fn test_backoff_table() {
        let config: AgentConfig = toml::from_str(
            r#"
            [restart]
            initial = 1
            max = 60
            multiplier = 2.0
            jitter = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.restart.initial, Duration::from_secs(1));
        assert_eq!(config.restart.max, Duration::from_secs(60));
        assert_eq!(config.restart.multiplier, 2.0);
    }

    #[test]
    fn test_backoff_validation() {
        assert!(AgentConfig::default().validate().is_ok());

        for bad in [
            "multiplier = inf",
            "multiplier = nan",
            "multiplier = 0.5",
            "jitter = nan",
            "jitter = 1.5",
            "jitter = -0.1",
        ] {
            let config: BackoffConfig = toml::from_str(bad).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{}",
                bad
            );
        }
    }
}
