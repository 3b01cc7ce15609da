//! Runtime configuration for one server instance.

use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;

use smsfeed_settings::{Settings, SettingsError};

use crate::feed::socket::SessionOptions;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    pub api_key: SecretString,
    pub delivery_timeout: Duration,
    pub viewer_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub history_limit: usize,
    pub retention_ttl: Duration,
    pub sweep_interval: Duration,
    pub timezone: Tz,
}

impl ServerConfig {
    /// Loopback, ephemeral port, default tuning. Used by tests and embedders.
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            api_key: api_key.into(),
            delivery_timeout: Duration::from_secs(5),
            viewer_queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(30),
            history_limit: 100,
            retention_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            timezone: Tz::UTC,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let api_key = settings
            .auth
            .api_key
            .clone()
            .ok_or(SettingsError::MissingApiKey)?;
        Ok(Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            api_key,
            delivery_timeout: settings.feed.delivery_timeout(),
            viewer_queue_capacity: settings.feed.viewer_queue_capacity,
            heartbeat_interval: settings.feed.heartbeat_interval(),
            history_limit: settings.history.limit,
            retention_ttl: settings.retention.ttl(),
            sweep_interval: settings.retention.sweep_interval(),
            timezone: settings.history.timezone(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            queue_capacity: self.viewer_queue_capacity,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}
