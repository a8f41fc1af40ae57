//! Layered settings: compiled defaults, then `~/.parley/settings.json`
//! merged over them, then `PARLEY_*` environment variables, then
//! [`validate`].
//!
//! In the file layer nested objects merge key by key. Arrays and scalars
//! replace the default outright, and `null` leaves the default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ParleySettings;

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(settings: &ParleySettings) -> Result<()> {
    let endpoint = settings.connection.endpoint.as_str();
    let scheme_ok = ["ws://", "wss://", "http://", "https://"]
        .iter()
        .any(|scheme| endpoint.starts_with(scheme));
    if !scheme_ok {
        return Err(SettingsError::InvalidValue {
            key: "connection.endpoint",
            reason: format!("unsupported scheme in {endpoint}"),
        });
    }
    if settings.connection.transports.is_empty() {
        return Err(SettingsError::InvalidValue {
            key: "connection.transports",
            reason: "must not be empty".to_string(),
        });
    }
    if settings.connection.connect_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue {
            key: "connection.connectTimeoutMs",
            reason: "must be positive".to_string(),
        });
    }
    if settings.heartbeat.max_missed == 0 {
        return Err(SettingsError::InvalidValue {
            key: "heartbeat.maxMissed",
            reason: "must be at least 1".to_string(),
        });
    }
    if settings.reconnect.max_delay_ms < settings.reconnect.base_delay_ms {
        return Err(SettingsError::InvalidValue {
            key: "reconnect.maxDelayMs",
            reason: "must not be below baseDelayMs".to_string(),
        });
    }
    Ok(())
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Merge `overlay` onto `base`, recursing into objects.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is kept.
pub fn apply_overrides<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_WS_URL") {
        settings.connection.endpoint = v;
    }
    if let Some(v) = env.u64("PARLEY_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }

    // ── Heartbeat ───────────────────────────────────────────────────
    if let Some(v) = env.u64("PARLEY_HEARTBEAT_OUT_MS", 0, 600_000) {
        settings.heartbeat.outgoing_ms = v;
    }
    if let Some(v) = env.u64("PARLEY_HEARTBEAT_IN_MS", 0, 600_000) {
        settings.heartbeat.incoming_ms = v;
    }

    // ── Reconnect ───────────────────────────────────────────────────
    if let Some(v) = env.u64("PARLEY_RECONNECT_MAX_ATTEMPTS", 0, 10_000) {
        settings.reconnect.max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
    }
    if let Some(v) = env.u64("PARLEY_RECONNECT_BASE_MS", 1, 3_600_000) {
        settings.reconnect.base_delay_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("PARLEY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::TransportKind;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"connection": {"endpoint": "a", "connectTimeoutMs": 1}});
        let source = serde_json::json!({"connection": {"endpoint": "b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["connection"]["endpoint"], "b");
        assert_eq!(merged["connection"]["connectTimeoutMs"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"transports": ["websocket", "sockjs"]});
        let source = serde_json::json!({"transports": ["sockjs"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["transports"], serde_json::json!(["sockjs"]));
    }

    #[test]
    fn null_keeps_default_and_scalar_replaces_section() {
        let defaults = serde_json::json!({"reconnect": {"maxAttempts": 5}, "logging": {"level": "info"}});
        let user = serde_json::json!({"reconnect": {"maxAttempts": null}, "logging": "off"});
        let merged = deep_merge(defaults, user);
        assert_eq!(merged["reconnect"]["maxAttempts"], 5);
        assert_eq!(merged["logging"], "off");
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, ParleySettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection": {"endpoint": "wss://chat.example.com/ws/chat", "transports": ["sockjs"]},
                "reconnect": {"maxAttempts": 3}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.connection.endpoint, "wss://chat.example.com/ws/chat");
        assert_eq!(settings.connection.transports, vec![TransportKind::Sockjs]);
        assert_eq!(settings.reconnect.max_attempts, 3);
        assert_eq!(settings.reconnect.base_delay_ms, 5000);
        assert_eq!(settings.heartbeat.outgoing_ms, 4000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_file_layer(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn wrong_type_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"heartbeat": {"outgoingMs": "soon"}}"#).unwrap();
        assert!(load_file_layer(&path).is_err());
    }

    #[test]
    fn load_rejects_invalid_merged_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"connection": {"transports": []}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "connection.transports", .. }
        ));
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&ParleySettings::default()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_scheme() {
        let mut settings = ParleySettings::default();
        settings.connection.endpoint = "ftp://chat".to_string();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "connection.endpoint", .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_missed_heartbeats() {
        let mut settings = ParleySettings::default();
        settings.heartbeat.max_missed = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let mut settings = ParleySettings::default();
        settings.reconnect.max_delay_ms = 10;
        assert!(validate(&settings).is_err());
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("PARLEY_WS_URL", "ws://10.0.0.5:9000/ws/chat"),
                ("PARLEY_HEARTBEAT_OUT_MS", "0"),
                ("PARLEY_RECONNECT_MAX_ATTEMPTS", "4"),
                ("PARLEY_LOG_LEVEL", "debug"),
                ("PARLEY_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.connection.endpoint, "ws://10.0.0.5:9000/ws/chat");
        assert_eq!(settings.heartbeat.outgoing_ms, 0);
        assert_eq!(settings.reconnect.max_attempts, 4);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("PARLEY_CONNECT_TIMEOUT_MS", "5"),
                ("PARLEY_HEARTBEAT_IN_MS", "often"),
                ("PARLEY_LOG_JSON", "maybe"),
                ("PARLEY_WS_URL", ""),
            ]),
        );
        assert_eq!(settings, ParleySettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("100", 100, 200), Some(100));
        assert_eq!(parse_u64_range(" 200 ", 100, 200), Some(200));
        assert_eq!(parse_u64_range("201", 100, 200), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
