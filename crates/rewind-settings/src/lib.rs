//! # rewind-settings
//!
//! Layered configuration for rewind.
//!
//! Settings are resolved in three layers, later layers winning:
//! 1. **Compiled defaults**: [`RewindSettings::default()`]
//! 2. **User file**: `~/.rewind/settings.json`, deep-merged over defaults
//! 3. **Environment**: `REWIND_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<RewindSettings> = OnceLock::new();

/// Process-wide settings, loaded on first access.
///
/// Falls back to compiled defaults when loading fails.
pub fn get_settings() -> &'static RewindSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load settings, using defaults");
            RewindSettings::default()
        })
    })
}

/// Install `settings` as the process-wide value.
///
/// Returns the value back if settings were already initialized.
pub fn init_settings(settings: RewindSettings) -> std::result::Result<(), RewindSettings> {
    SETTINGS.set(settings)
}
