//! Merge rules shared by the live and resume reconstruction paths.
//!
//! Two rules live here:
//! - **Field merge**: a later partial record overwrites an earlier one field
//!   by field. Absent and `null` fields leave the earlier value in place.
//! - **Chunk coalescing**: adjacent streamed text fragments of the same kind
//!   collapse into one block. A different kind, or any non-text item in
//!   between, starts a new block.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a streamed text fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Text the user typed.
    UserMessage,
    /// Visible agent reply text.
    AgentMessage,
    /// Agent reasoning text.
    AgentThought,
}

/// An item that may hold a text chunk.
pub trait Chunked: Sized {
    /// The chunk kind and text, if this item is a text chunk.
    fn as_chunk(&self) -> Option<(ChunkKind, &str)>;

    /// Build a fresh text-chunk item.
    fn from_chunk(kind: ChunkKind, text: String) -> Self;
}

/// Append a text fragment to `items`, coalescing with the last item when it
/// is a chunk of the same kind.
///
/// The last item is replaced by a new one holding the concatenated text; it
/// is never mutated.
pub fn push_chunk<T: Chunked>(items: &mut Vec<T>, kind: ChunkKind, text: &str) {
    let merged = match items.last().and_then(Chunked::as_chunk) {
        Some((last_kind, prev)) if last_kind == kind => Some(format!("{prev}{text}")),
        _ => None,
    };
    match merged {
        Some(joined) => {
            if let Some(last) = items.last_mut() {
                *last = T::from_chunk(kind, joined);
            }
        }
        None => items.push(T::from_chunk(kind, text.to_owned())),
    }
}

/// Copy the fields of `source` onto `target`.
///
/// Keys listed in `skip` are ignored, as are `null` values.
pub fn merge_fields(target: &mut Map<String, Value>, source: &Map<String, Value>, skip: &[&str]) {
    for (key, value) in source {
        if value.is_null() || skip.contains(&key.as_str()) {
            continue;
        }
        let _ = target.insert(key.clone(), value.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
