//! Settings types with compiled defaults.
//!
//! Every section is `#[serde(default)]` so a partial user file only needs to
//! name the keys it changes.

use std::path::PathBuf;

use rewind_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Snapshot event name as written by the agent.
pub const SNAPSHOT_METHOD: &str = "tree_snapshot";

/// Namespace-prefixed variant of [`SNAPSHOT_METHOD`].
pub const PREFIXED_SNAPSHOT_METHOD: &str = "_rewind/tree_snapshot";

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewindSettings {
    /// Diagnostic output.
    pub logging: LoggingSettings,
    /// Resume behavior.
    pub resume: ResumeSettings,
    /// Where run logs live.
    pub logs: LogsSettings,
}

/// Diagnostic output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Resume behavior settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeSettings {
    /// Materialize the working tree from the latest snapshot.
    pub restore_tree: bool,
    /// Git executable used by the tree restorer.
    pub git_binary: String,
    /// Working tree to restore into. `None` means the process cwd.
    pub working_directory: Option<String>,
    /// Notification methods recognized as snapshot events.
    pub snapshot_methods: Vec<String>,
}

impl Default for ResumeSettings {
    fn default() -> Self {
        Self {
            restore_tree: true,
            git_binary: "git".to_string(),
            working_directory: None,
            snapshot_methods: vec![
                SNAPSHOT_METHOD.to_string(),
                PREFIXED_SNAPSHOT_METHOD.to_string(),
            ],
        }
    }
}

impl ResumeSettings {
    /// Resolved working tree path.
    pub fn working_directory(&self) -> PathBuf {
        self.working_directory
            .as_ref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }
}

/// Run log location settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogsSettings {
    /// Directory holding `<run>.jsonl` files. `None` means `~/.rewind/runs`.
    pub directory: Option<String>,
}

impl LogsSettings {
    /// Resolved log directory.
    pub fn directory(&self) -> PathBuf {
        self.directory
            .as_ref()
            .map_or_else(|| crate::loader::rewind_home().join("runs"), PathBuf::from)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
