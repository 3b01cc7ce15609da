//! Settings types. Every section defaults field-by-field, so a settings file
//! only needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Root settings object.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub retention: RetentionSettings,
    pub feed: FeedSettings,
    pub history: HistorySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Shared secret expected in the `X-API-Key` header of write requests.
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./sms.db"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Messages older than this are deleted by the sweeper.
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl RetentionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Upper bound on a single viewer delivery before the viewer is dropped.
    pub delivery_timeout_ms: u64,
    /// Outbound frames buffered per viewer.
    pub viewer_queue_capacity: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 5_000,
            viewer_queue_capacity: 64,
            heartbeat_interval_secs: 30,
        }
    }
}

impl FeedSettings {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub limit: usize,
    /// IANA zone used to format timestamps on the history page.
    pub display_timezone: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            limit: 100,
            display_timezone: "UTC".into(),
        }
    }
}

impl HistorySettings {
    /// Parsed display zone. Falls back to UTC for a name that was never validated.
    pub fn timezone(&self) -> Tz {
        self.display_timezone.parse().unwrap_or(Tz::UTC)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8000);
        assert!(s.auth.api_key.is_none());
        assert_eq!(s.retention.ttl(), Duration::from_secs(300));
        assert_eq!(s.retention.sweep_interval(), Duration::from_secs(60));
        assert_eq!(s.feed.delivery_timeout(), Duration::from_secs(5));
        assert_eq!(s.history.limit, 100);
        assert_eq!(s.history.timezone(), Tz::UTC);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"retention":{"ttl_secs":10},"auth":{"api_key":"k"}}"#)
                .unwrap();
        assert_eq!(s.retention.ttl_secs, 10);
        assert_eq!(s.retention.sweep_interval_secs, 60);
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.auth.api_key.unwrap().expose_secret(), "k");
    }

    #[test]
    fn empty_api_key_is_treated_as_missing() {
        let s: Settings = serde_json::from_str(r#"{"auth":{"api_key":""}}"#).unwrap();
        assert!(s.auth.api_key.is_none());
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let s: Settings = serde_json::from_str(r#"{"auth":{"api_key":"hunter2"}}"#).unwrap();
        assert!(!format!("{s:?}").contains("hunter2"));
    }

    #[test]
    fn named_timezone_parses() {
        let h = HistorySettings {
            display_timezone: "Europe/Moscow".into(),
            ..HistorySettings::default()
        };
        assert_eq!(h.timezone(), Tz::Europe__Moscow);
    }
}
