//! Working-tree snapshot events and the backward locator.
//!
//! A snapshot is a notification such as
//!
//! ```json
//! {"method": "tree_snapshot",
//!  "params": {"treeHash": "4b825d...", "archive": "file:///runs/r1/snap.bundle",
//!             "changes": ["src/main.rs"], "interrupted": true}}
//! ```
//!
//! Both the bare and the namespace-prefixed method name denote the same event.

use rewind_core::MessageKind;
use rewind_events::StoredLogEntry;
use serde::Serialize;
use serde_json::Value;

/// A recorded working-tree state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshotEvent {
    /// Git tree hash of the recorded state.
    pub tree_hash: String,
    /// Where the restorable archive lives, if one was uploaded.
    pub archive: Option<String>,
    /// Paths or change records captured with the snapshot.
    pub changes: Vec<Value>,
    /// Whether the run was interrupted when the snapshot was taken.
    pub interrupted: bool,
}

impl TreeSnapshotEvent {
    /// Parse snapshot params. A missing or empty tree hash yields `None`.
    pub fn from_params(params: &Value) -> Option<Self> {
        let tree_hash = params
            .get("treeHash")
            .and_then(Value::as_str)
            .filter(|h| !h.trim().is_empty())?;
        let archive = ["archive", "archiveUrl"]
            .iter()
            .find_map(|k| params.get(*k).and_then(Value::as_str))
            .filter(|a| !a.is_empty())
            .map(str::to_owned);
        Some(Self {
            tree_hash: tree_hash.to_owned(),
            archive,
            changes: params
                .get("changes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            interrupted: params
                .get("interrupted")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Whether an archive is available to restore from.
    pub fn is_restorable(&self) -> bool {
        self.archive.is_some()
    }
}

/// Most recent snapshot in `entries`, by position.
///
/// Archive presence is not considered; use
/// [`TreeSnapshotEvent::is_restorable`] to decide whether to apply it.
pub fn locate_latest_snapshot<S: AsRef<str>>(
    entries: &[StoredLogEntry],
    methods: &[S],
) -> Option<TreeSnapshotEvent> {
    entries.iter().rev().find_map(|entry| {
        if entry.kind() != MessageKind::Notification {
            return None;
        }
        let method = entry.method()?;
        if !methods.iter().any(|m| m.as_ref() == method) {
            return None;
        }
        entry.params().and_then(TreeSnapshotEvent::from_params)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
