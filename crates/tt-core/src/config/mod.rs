//! Configuration management for tether

mod agent;
mod relay;
mod session;
pub mod serde_utils;

pub use agent::{AgentConfig, BackoffConfig};
pub use relay::RelayConfig;
pub use session::SessionConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

/// Default location of the agent's config file
pub fn default_agent_config_path() -> PathBuf {
    default_config_dir().join("agent.toml")
}

/// Default location of the relay server's config file
pub fn default_relay_config_path() -> PathBuf {
    default_config_dir().join("relay.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load `path` if given, else the default path if it exists, else defaults.
///
/// An explicitly named file that does not exist is an error; a missing
/// default file is not.
pub fn load_or_default<T>(path: Option<&Path>, default_path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match path {
        Some(path) => load_config(path),
        None if default_path.exists() => load_config(default_path),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_agent_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "relay_address = \"relay.example:443\"").unwrap();
        writeln!(file, "auto_restart = true").unwrap();

        let config: AgentConfig = load_config(file.path()).unwrap();
        assert_eq!(config.relay_address, "relay.example:443");
        assert!(config.auto_restart);
        assert!(config.target_address.is_none());
        assert_eq!(config.connect_timeout, AgentConfig::default().connect_timeout);
    }

    #[test]
    fn test_load_nested_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_capacity = 8").unwrap();
        writeln!(file, "[session]").unwrap();
        writeln!(file, "ping_timeout = 3").unwrap();

        let config: RelayConfig = load_config(file.path()).unwrap();
        assert_eq!(config.pool_capacity, 8);
        assert_eq!(config.session.ping_timeout, std::time::Duration::from_secs(3));
        assert_eq!(config.local_address, "127.0.0.1:1080");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            load_config::<RelayConfig>(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert!(load_or_default::<RelayConfig>(Some(&path), &path).is_err());

        let config: RelayConfig = load_or_default(None, &path).unwrap();
        assert_eq!(config.pool_capacity, 100);
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_capacity = \"many\"").unwrap();

        assert!(matches!(
            load_config::<RelayConfig>(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
