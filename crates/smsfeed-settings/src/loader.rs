//! Settings loading with environment variable overrides.
//!
//! Environment variables keep the names the SMS gateway deployment already
//! uses (`API_KEY`, `DATABASE_URL`); everything else is `SMSFEED_*`.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Load settings from `path` (if it exists), `.env`, and the process environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match dotenvy::dotenv() {
        Ok(env_path) => debug!(path = %env_path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env, ignoring"),
    }
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings using `lookup` for environment values.
///
/// If the file does not exist, starts from defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_with<F>(path: Option<&Path>, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            Settings::default()
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings, &lookup)?;
    validate(&settings)?;
    Ok(settings)
}

/// Apply environment overrides. Malformed numbers are warned about and ignored;
/// a malformed `DATABASE_URL` is an error because silently using the default
/// database would hide the misconfiguration.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("API_KEY") {
        settings.auth.api_key = Some(SecretString::from(v));
    }
    if let Some(v) = read("DATABASE_URL") {
        settings.storage.database_path = parse_database_url(&v)?;
    }
    if let Some(v) = read("SMSFEED_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_PORT", 1, u64::from(u16::MAX)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_RETENTION_TTL_SECS", 0, MAX_TTL_SECS) {
        settings.retention.ttl_secs = v;
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_SWEEP_INTERVAL_SECS", 1, 86_400) {
        settings.retention.sweep_interval_secs = v;
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_DELIVERY_TIMEOUT_MS", 1, 600_000) {
        settings.feed.delivery_timeout_ms = v;
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_VIEWER_QUEUE", 1, 65_536) {
        settings.feed.viewer_queue_capacity = usize::try_from(v).unwrap_or(64);
    }
    if let Some(v) = read_ranged(&read, "SMSFEED_HISTORY_LIMIT", 1, 10_000) {
        settings.history.limit = usize::try_from(v).unwrap_or(100);
    }
    if let Some(v) = read("SMSFEED_DISPLAY_TZ") {
        settings.history.display_timezone = v;
    }
    if let Some(v) = read("SMSFEED_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("SMSFEED_LOG_FORMAT") {
        settings.logging.format = v;
    }
    Ok(())
}

/// Reject settings the server cannot start with.
pub fn validate(settings: &Settings) -> Result<()> {
    if settings.auth.api_key.is_none() {
        return Err(SettingsError::MissingApiKey);
    }
    if settings.retention.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "retention.sweep_interval_secs must be at least 1".into(),
        ));
    }
    if settings.retention.ttl_secs > MAX_TTL_SECS {
        return Err(SettingsError::InvalidValue(format!(
            "retention.ttl_secs must be at most {MAX_TTL_SECS}"
        )));
    }
    if settings.feed.delivery_timeout_ms == 0 || settings.feed.viewer_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "feed.delivery_timeout_ms and feed.viewer_queue_capacity must be positive".into(),
        ));
    }
    if settings.feed.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "feed.heartbeat_interval_secs must be at least 1".into(),
        ));
    }
    if settings.history.display_timezone.parse::<Tz>().is_err() {
        return Err(SettingsError::InvalidValue(format!(
            "unknown timezone: {}",
            settings.history.display_timezone
        )));
    }
    Ok(())
}

/// Accept a bare path or a SQLAlchemy-style SQLite URL.
///
/// `sqlite:///./sms.db` → `./sms.db`, `sqlite:////var/sms.db` → `/var/sms.db`.
pub fn parse_database_url(url: &str) -> Result<PathBuf> {
    const PREFIXES: [&str; 4] = ["sqlite+aiosqlite:///", "sqlite:///", "sqlite://", "sqlite:"];

    for prefix in PREFIXES {
        if let Some(rest) = url.strip_prefix(prefix) {
            if rest.is_empty() {
                return Err(SettingsError::InvalidValue(format!(
                    "DATABASE_URL has no path: {url}"
                )));
            }
            return Ok(PathBuf::from(rest));
        }
    }
    if url.contains("://") {
        return Err(SettingsError::InvalidValue(format!(
            "unsupported DATABASE_URL scheme: {url}"
        )));
    }
    Ok(PathBuf::from(url))
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_ranged<R>(read: &R, name: &str, min: u64, max: u64) -> Option<u64>
where
    R: Fn(&str) -> Option<String>,
{
    let val = read(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = load_settings_with(None, env(&[])).unwrap_err();
        assert!(matches!(err, SettingsError::MissingApiKey));
    }

    #[test]
    fn env_overrides_apply() {
        let s = load_settings_with(
            None,
            env(&[
                ("API_KEY", "secret"),
                ("DATABASE_URL", "sqlite+aiosqlite:///./data/sms.db"),
                ("SMSFEED_PORT", "9000"),
                ("SMSFEED_RETENTION_TTL_SECS", "0"),
                ("SMSFEED_SWEEP_INTERVAL_SECS", "5"),
                ("SMSFEED_DISPLAY_TZ", "Asia/Almaty"),
            ]),
        )
        .unwrap();
        assert_eq!(s.auth.api_key.unwrap().expose_secret(), "secret");
        assert_eq!(s.storage.database_path, PathBuf::from("./data/sms.db"));
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.retention.ttl_secs, 0);
        assert_eq!(s.retention.sweep_interval_secs, 5);
        assert_eq!(s.history.display_timezone, "Asia/Almaty");
    }

    #[test]
    fn out_of_range_env_values_are_ignored() {
        let s = load_settings_with(
            None,
            env(&[
                ("API_KEY", "k"),
                ("SMSFEED_PORT", "70000"),
                ("SMSFEED_SWEEP_INTERVAL_SECS", "0"),
                ("SMSFEED_DELIVERY_TIMEOUT_MS", "soon"),
            ]),
        )
        .unwrap();
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.retention.sweep_interval_secs, 60);
        assert_eq!(s.feed.delivery_timeout_ms, 5_000);
    }

    #[test]
    fn file_then_env_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsfeed.json");
        std::fs::write(
            &path,
            r#"{"auth":{"api_key":"from-file"},"server":{"port":7000},"retention":{"ttl_secs":42}}"#,
        )
        .unwrap();

        let s = load_settings_with(Some(&path), env(&[("SMSFEED_PORT", "7100")])).unwrap();
        assert_eq!(s.auth.api_key.unwrap().expose_secret(), "from-file");
        assert_eq!(s.server.port, 7100);
        assert_eq!(s.retention.ttl_secs, 42);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let s = load_settings_with(Some(&path), env(&[("API_KEY", "k")])).unwrap();
        assert_eq!(s.server.port, 8000);
    }

    #[test]
    fn invalid_json_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings_with(Some(&path), env(&[("API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsfeed.json");
        std::fs::write(
            &path,
            r#"{"auth":{"api_key":"k"},"feed":{"heartbeat_interval_secs":0}}"#,
        )
        .unwrap();

        let err = load_settings_with(Some(&path), env(&[])).unwrap_err();
        assert!(
            matches!(&err, SettingsError::InvalidValue(msg) if msg.contains("heartbeat")),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = load_settings_with(
            None,
            env(&[("API_KEY", "k"), ("SMSFEED_DISPLAY_TZ", "Mars/Olympus")]),
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn database_url_forms() {
        assert_eq!(parse_database_url("sqlite:///./sms.db").unwrap(), PathBuf::from("./sms.db"));
        assert_eq!(
            parse_database_url("sqlite:////var/lib/sms.db").unwrap(),
            PathBuf::from("/var/lib/sms.db")
        );
        assert_eq!(
            parse_database_url("sqlite+aiosqlite:///./sms.db").unwrap(),
            PathBuf::from("./sms.db")
        );
        assert_eq!(parse_database_url("data/sms.db").unwrap(), PathBuf::from("data/sms.db"));
        assert!(parse_database_url("postgres://db/sms").is_err());
        assert!(parse_database_url("sqlite:///").is_err());
    }

    #[test]
    fn u64_range_parsing() {
        assert_eq!(parse_u64_range("10", 1, 100), Some(10));
        assert_eq!(parse_u64_range(" 10 ", 1, 100), Some(10));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_u64_range("-1", 0, 100), None);
    }
}
