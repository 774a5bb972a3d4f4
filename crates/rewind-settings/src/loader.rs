//! Settings loading: compiled defaults, then `~/.rewind/settings.json`, then
//! `REWIND_*` environment variables.
//!
//! The user file is deep-merged over the defaults: objects merge per key,
//! arrays and scalars replace, `null` leaves the default in place.

use std::path::{Path, PathBuf};

use rewind_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RewindSettings;

/// `~/.rewind`, falling back to `/tmp/.rewind` when `HOME` is unset.
pub fn rewind_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rewind")
}

/// Path of the user settings file.
pub fn settings_path() -> PathBuf {
    rewind_home().join("settings.json")
}

/// Load settings from [`settings_path`] with env overrides.
pub fn load_settings() -> Result<RewindSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides.
///
/// A missing file yields defaults. Unparseable JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RewindSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<RewindSettings> {
    let defaults = serde_json::to_value(RewindSettings::default())?;
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

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let next = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, next);
            }
            Value::Object(base)
        }
        (_, source) => source,
    }
}

fn validate(settings: &RewindSettings) -> Result<()> {
    if settings.resume.git_binary.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "resume.gitBinary must not be empty".into(),
        ));
    }
    Ok(())
}

/// Apply `REWIND_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RewindSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are ignored. Invalid booleans and formats are ignored with a
/// warning.
pub fn apply_overrides(settings: &mut RewindSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("REWIND_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("REWIND_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "REWIND_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }

    // ── Resume ──────────────────────────────────────────────────────
    if let Some(v) = read("REWIND_RESTORE_TREE") {
        match parse_bool(&v) {
            Some(b) => settings.resume.restore_tree = b,
            None => tracing::warn!(key = "REWIND_RESTORE_TREE", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("REWIND_GIT_BIN") {
        settings.resume.git_binary = v;
    }
    if let Some(v) = read("REWIND_WORKDIR") {
        settings.resume.working_directory = Some(v);
    }

    // ── Logs ────────────────────────────────────────────────────────
    if let Some(v) = read("REWIND_LOGS_DIR") {
        settings.logs.directory = Some(v);
    }
}

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
