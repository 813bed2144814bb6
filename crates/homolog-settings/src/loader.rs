//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow, lowest to highest priority:
//! 1. Compiled [`AppSettings::default()`]
//! 2. JSON config file, deep-merged over defaults
//! 3. `HOMOLOG_*` environment variables
//! 4. Caller [`Overrides`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AppSettings, Overrides, RETENTION_DAYS_MAX, RETENTION_DAYS_MIN};

/// Load settings from `config_path` (if it exists) with env var and caller
/// overrides applied.
///
/// A missing file yields defaults; an unreadable or syntactically invalid
/// file is an error, so a typo never silently reverts the installation to
/// defaults.
pub fn load_settings(config_path: &Path, overrides: &Overrides) -> Result<AppSettings> {
    let defaults = serde_json::to_value(AppSettings::default())?;

    let merged = if config_path.exists() {
        debug!(path = %config_path.display(), "loading config file");
        let content = std::fs::read_to_string(config_path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(path = %config_path.display(), "config file not found, using defaults");
        defaults
    };

    let mut settings: AppSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings.with_overrides(overrides))
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

/// Apply `HOMOLOG_*` environment variable overrides.
///
/// Invalid values are logged and ignored, falling back to the file/default
/// layer.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    if let Some(v) = read_env_string("HOMOLOG_DB") {
        settings.db_path = v;
    }
    if let Some(v) = read_env_string("HOMOLOG_BACKUPS") {
        settings.backups_dir = v;
    }
    if let Some(v) = read_env_u32("HOMOLOG_RETENTION_DAYS", RETENTION_DAYS_MIN, RETENTION_DAYS_MAX) {
        settings.retention_days = v;
    }
    if let Some(v) = read_env_bool("HOMOLOG_AUTO_BACKUP") {
        settings.auto_backup = v;
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = val.parse::<u32>().ok().filter(|v| (min..=max).contains(v));
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // Env var tests mutate process state; keep names unique per test so
    // parallel execution does not interfere.

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_skips_null_source_values() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_replaces_primitives_and_arrays() {
        let target = serde_json::json!({"a": [1, 2, 3]});
        let source = serde_json::json!({"a": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], serde_json::json!([9]));
    }

    // ── load_settings ───────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            load_settings(&dir.path().join("config.json"), &Overrides::default()).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"retention_days": 7}"#).unwrap();

        let settings = load_settings(&path, &Overrides::default()).unwrap();
        assert_eq!(settings.retention_days, 7);
        // Untouched keys keep their defaults.
        assert_eq!(settings.db_path, "homologador.db");
    }

    #[test]
    fn invalid_json_is_an_error_not_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = load_settings(&path, &Overrides::default());
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"db_pth": "typo.db"}"#).unwrap();

        let result = load_settings(&path, &Overrides::default());
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn caller_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"retention_days": 7}"#).unwrap();

        let settings = load_settings(
            &path,
            &Overrides {
                retention_days: Some(90),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(settings.retention_days, 90);
    }

    // ── env parsing ─────────────────────────────────────────────────

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for v in ["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "off", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_override_applies() {
        unsafe { std::env::set_var("HOMOLOG_RETENTION_DAYS", "14") };
        let mut settings = AppSettings::default();
        apply_env_overrides(&mut settings);
        unsafe { std::env::remove_var("HOMOLOG_RETENTION_DAYS") };
        assert_eq!(settings.retention_days, 14);
    }

    #[test]
    #[allow(unsafe_code)]
    fn invalid_env_value_is_ignored() {
        unsafe { std::env::set_var("HOMOLOG_AUTO_BACKUP", "definitely") };
        let mut settings = AppSettings::default();
        apply_env_overrides(&mut settings);
        unsafe { std::env::remove_var("HOMOLOG_AUTO_BACKUP") };
        assert!(settings.auto_backup, "invalid value must not change the default");
    }
}
