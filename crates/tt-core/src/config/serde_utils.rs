//! Serde helpers for configuration values

/// `Duration` fields written as seconds or with a unit suffix.
///
/// Accepts whole or fractional seconds (`30`, `0.5`) and strings carrying
/// an `ms`, `s`, `m` or `h` suffix (`"250ms"`, `"2m"`). Whole seconds are
/// written back as an integer, anything finer as milliseconds.
pub mod duration {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    /// Parse `"250ms"`, `"1.5s"`, `"2m"`, `"1h"` or a bare number of seconds
    pub fn parse(value: &str) -> Result<Duration, String> {
        let value = value.trim();
        let split = value
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(value.len());
        let (number, unit) = value.split_at(split);
        let number: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration {:?}", value))?;

        let secs = match unit {
            "ms" => number / 1000.0,
            "" | "s" => number,
            "m" => number * 60.0,
            "h" => number * 3600.0,
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, value)),
        };
        Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid duration {:?}", value))
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("seconds or a duration string such as \"500ms\"")
        }

        fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(secs))
        }

        fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Duration, E> {
            u64::try_from(secs)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration cannot be negative"))
        }

        fn visit_f64<E: de::Error>(self, secs: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| E::custom(format!("invalid duration {}", secs)))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse(value).map_err(E::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::duration;
    use crate::config::{BackoffConfig, SessionConfig};
    use std::time::Duration;

    #[test]
    fn test_session_accepts_sub_second_values() {
        let config: SessionConfig = toml::from_str(
            r#"
            ping_timeout = "500ms"
            keepalive_interval = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.ping_timeout, Duration::from_millis(500));
        assert_eq!(config.keepalive_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_units() {
        let config: BackoffConfig = toml::from_str(
            r#"
            initial = "1.5s"
            max = "2m"
            "#,
        )
        .unwrap();

        assert_eq!(config.initial, Duration::from_millis(1500));
        assert_eq!(config.max, Duration::from_secs(120));
        assert_eq!(duration::parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(duration::parse(" 45 "), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn test_rejects_bad_durations() {
        for bad in [
            "ping_timeout = -1",
            "ping_timeout = \"fast\"",
            "ping_timeout = \"5 weeks\"",
            "ping_timeout = \"-2s\"",
            "ping_timeout = nan",
            "ping_timeout = inf",
        ] {
            assert!(toml::from_str::<SessionConfig>(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_written_back_in_readable_form() {
        let config = SessionConfig {
            ping_timeout: Duration::from_millis(1500),
            keepalive_interval: Duration::from_secs(30),
            ..SessionConfig::default()
        };

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("ping_timeout = \"1500ms\""));
        assert!(text.contains("keepalive_interval = 30"));
        assert_eq!(toml::from_str::<SessionConfig>(&text).unwrap(), config);
    }
}
