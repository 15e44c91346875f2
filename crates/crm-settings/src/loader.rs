//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CrmSettings::default()`]
//! 2. If `~/.crm/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `CRM_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use crm_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CrmSettings;

/// Hub home directory (`~/.crm`).
pub fn crm_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".crm")
}

/// Resolve the path to the settings file (`~/.crm/settings.json`).
pub fn settings_path() -> PathBuf {
    crm_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CrmSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CrmSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<CrmSettings> {
    let defaults = serde_json::to_value(CrmSettings::default())?;

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

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CRM_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides(settings: &mut CrmSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CRM_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("CRM_PORT", |s| parse_range::<u16>(s, 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("CRM_SEND_QUEUE_CAPACITY", |s| parse_range(s, 1, 65_536)) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = env.parsed("CRM_IDLE_TIMEOUT_SECS", |s| parse_range(s, 1, 86_400)) {
        settings.server.idle_timeout_secs = Some(v);
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CRM_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.string("CRM_JWT_ALGORITHM") {
        settings.auth.jwt_algorithm = v.to_uppercase();
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("CRM_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.parsed("CRM_DB_POOL_SIZE", |s| parse_range(s, 1, 64)) {
        settings.database.pool_size = v;
    }

    // ── Dashboard ───────────────────────────────────────────────────
    if let Some(v) = env.parsed("CRM_DASHBOARD_ENABLED", parse_bool) {
        settings.dashboard.enabled = v;
    }
    if let Some(v) = env.parsed("CRM_DASHBOARD_INTERVAL_SECS", |s| parse_range(s, 1, 3_600)) {
        settings.dashboard.push_interval_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CRM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("CRM_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

/// Resolve the configured database path against `~/.crm`.
pub fn resolve_db_path(settings: &CrmSettings) -> PathBuf {
    let configured = PathBuf::from(&settings.database.path);
    if configured.is_absolute() {
        configured
    } else {
        crm_home().join(configured)
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var reader ──────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"idleTimeoutSecs": 90}, "im": {"summaryMaxChars": 20}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.idle_timeout_secs, Some(90));
        assert_eq!(settings.im.summary_max_chars, 20);
        assert_eq!(settings.server.send_queue_capacity, 256);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(load_file_layer(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"dashboard": {"pushIntervalSecs": 0}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = CrmSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("CRM_PORT", "9100"),
                ("CRM_JWT_SECRET", "s3cret"),
                ("CRM_JWT_ALGORITHM", "hs512"),
                ("CRM_DASHBOARD_ENABLED", "off"),
                ("CRM_IDLE_TIMEOUT_SECS", "120"),
                ("CRM_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.auth.jwt_secret, "s3cret");
        assert_eq!(settings.auth.jwt_algorithm, "HS512");
        assert!(!settings.dashboard.enabled);
        assert_eq!(settings.server.idle_timeout_secs, Some(120));
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = CrmSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("CRM_PORT", "70000"),
                ("CRM_DB_POOL_SIZE", "0"),
                ("CRM_DASHBOARD_ENABLED", "maybe"),
                ("CRM_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.database.pool_size, 8);
        assert!(settings.dashboard.enabled);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_range_bounds_are_inclusive() {
        assert_eq!(parse_range::<u64>("1", 1, 10), Some(1));
        assert_eq!(parse_range::<u64>("10", 1, 10), Some(10));
        assert_eq!(parse_range::<u64>("11", 1, 10), None);
        assert_eq!(parse_range::<u64>("-1", 1, 10), None);
    }

    #[test]
    fn relative_db_path_resolves_under_home() {
        let settings = CrmSettings::default();
        let path = resolve_db_path(&settings);
        assert!(path.ends_with(".crm/database/crm.db"));
    }

    #[test]
    fn absolute_db_path_is_kept() {
        let mut settings = CrmSettings::default();
        settings.database.path = "/var/lib/crm/crm.db".into();
        assert_eq!(resolve_db_path(&settings), PathBuf::from("/var/lib/crm/crm.db"));
    }
}
