//! Tool-call registry: an arena of [`ToolCall`] records keyed by tool-call id.
//!
//! Items that reference a tool call hold a [`ToolCallKey`], never the record
//! itself. Merging an update rewrites the arena slot, so every holder of the
//! key observes the latest fields while keeping its original position.

use std::collections::HashMap;

use rewind_core::merge_fields;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::update::DISCRIMINATOR;

/// Nested object whose keys merge one level deep instead of being replaced.
const META: &str = "_meta";

/// Index of a tool call inside its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallKey(usize);

/// Latest known state of one tool call.
///
/// Well-known fields have typed accessors; everything the agent sent is kept
/// in [`fields`](Self::fields) so unmodeled extensions survive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable tool-call id.
    pub id: String,
    /// Merged update fields, minus the discriminator and id.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ToolCall {
    /// A record with no fields yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Merge `update` into this record. Later values win per field.
    ///
    /// `_meta` merges key by key so a result-only update does not erase the
    /// name and input reported earlier.
    pub fn apply(&mut self, update: &Map<String, Value>) {
        let previous_meta = self.fields.get(META).and_then(Value::as_object).cloned();
        merge_fields(&mut self.fields, update, &[DISCRIMINATOR, "toolCallId"]);
        if let (Some(mut meta), Some(Value::Object(incoming))) = (previous_meta, update.get(META)) {
            merge_fields(&mut meta, incoming, &[]);
            let _ = self.fields.insert(META.to_owned(), Value::Object(meta));
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Human-readable title.
    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    /// Tool kind (`read`, `edit`, `execute`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.str_field("kind")
    }

    /// Execution status (`pending`, `in_progress`, `completed`, `failed`).
    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    /// Raw tool input.
    pub fn raw_input(&self) -> Option<&Value> {
        self.fields.get("rawInput")
    }

    /// Raw tool output.
    pub fn raw_output(&self) -> Option<&Value> {
        self.fields.get("rawOutput")
    }

    /// Produced content blocks.
    pub fn content(&self) -> Option<&Value> {
        self.fields.get("content")
    }

    /// Affected file locations.
    pub fn locations(&self) -> Option<&Value> {
        self.fields.get("locations")
    }

    /// Implementation metadata (`_meta`).
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.fields.get(META).and_then(Value::as_object)
    }
}

/// Outcome of [`ToolCallRegistry::upsert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was created.
    Created(ToolCallKey),
    /// An existing record was updated.
    Merged(ToolCallKey),
}

impl Upsert {
    /// Key of the affected record.
    pub fn key(self) -> ToolCallKey {
        match self {
            Self::Created(key) | Self::Merged(key) => key,
        }
    }
}

/// Arena of tool calls in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct ToolCallRegistry {
    calls: Vec<ToolCall>,
    by_id: HashMap<String, ToolCallKey>,
}

impl ToolCallRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge into the record for `id`, creating it if unknown.
    pub fn upsert(&mut self, id: &str, update: &Map<String, Value>) -> Upsert {
        if let Some(key) = self.merge(id, update) {
            return Upsert::Merged(key);
        }
        let key = ToolCallKey(self.calls.len());
        let mut call = ToolCall::new(id);
        call.apply(update);
        self.calls.push(call);
        let _ = self.by_id.insert(id.to_owned(), key);
        Upsert::Created(key)
    }

    /// Merge into the record for `id`. Unknown ids are left alone.
    pub fn merge(&mut self, id: &str, update: &Map<String, Value>) -> Option<ToolCallKey> {
        let key = *self.by_id.get(id)?;
        self.calls[key.0].apply(update);
        Some(key)
    }

    /// Record behind `key`.
    pub fn get(&self, key: ToolCallKey) -> Option<&ToolCall> {
        self.calls.get(key.0)
    }

    /// Record for `id`.
    pub fn lookup(&self, id: &str) -> Option<&ToolCall> {
        self.by_id.get(id).and_then(|key| self.get(*key))
    }

    /// Whether `id` has been seen.
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of tool calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolCall> {
        self.calls.iter()
    }

    /// Consume the registry, yielding records in first-seen order.
    pub fn into_calls(self) -> Vec<ToolCall> {
        self.calls
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    // ── upsert / merge ──

    #[test]
    fn upsert_creates_then_merges() {
        let mut reg = ToolCallRegistry::new();
        let first = reg.upsert("t1", &fields(json!({"title": "Read", "status": "pending"})));
        assert_matches!(first, Upsert::Created(_));
        let second = reg.upsert("t1", &fields(json!({"status": "in_progress"})));
        assert_eq!(second, Upsert::Merged(first.key()));
        assert_eq!(reg.len(), 1);
        let call = reg.lookup("t1").unwrap();
        assert_eq!(call.title(), Some("Read"));
        assert_eq!(call.status(), Some("in_progress"));
    }

    #[test]
    fn merge_ignores_unknown_id() {
        let mut reg = ToolCallRegistry::new();
        assert_eq!(reg.merge("ghost", &fields(json!({"status": "completed"}))), None);
        assert!(reg.is_empty());
        assert!(!reg.contains("ghost"));
    }

    #[test]
    fn discriminator_and_id_not_stored() {
        let mut reg = ToolCallRegistry::new();
        let key = reg
            .upsert(
                "t1",
                &fields(json!({"sessionUpdate": "tool_call", "toolCallId": "t1", "kind": "read"})),
            )
            .key();
        let call = reg.get(key).unwrap();
        assert_eq!(call.id, "t1");
        assert!(!call.fields.contains_key("sessionUpdate"));
        assert!(!call.fields.contains_key("toolCallId"));
        assert_eq!(call.kind(), Some("read"));
    }

    #[test]
    fn meta_merges_per_key() {
        let mut call = ToolCall::new("t1");
        call.apply(&fields(json!({"_meta": {"toolName": "Bash", "toolInput": {"cmd": "ls"}}})));
        call.apply(&fields(json!({"_meta": {"toolResponse": "ok"}})));
        let meta = call.meta().unwrap();
        assert_eq!(meta["toolName"], "Bash");
        assert_eq!(meta["toolResponse"], "ok");
    }

    #[test]
    fn typed_accessors() {
        let mut call = ToolCall::new("t1");
        call.apply(&fields(json!({
            "rawInput": {"path": "a.rs"},
            "rawOutput": "done",
            "content": [{"type": "content"}],
            "locations": [{"path": "a.rs"}]
        })));
        assert_eq!(call.raw_input(), Some(&json!({"path": "a.rs"})));
        assert_eq!(call.raw_output(), Some(&json!("done")));
        assert!(call.content().is_some());
        assert!(call.locations().is_some());
        assert_eq!(call.title(), None);
    }

    #[test]
    fn iteration_is_first_seen_order() {
        let mut reg = ToolCallRegistry::new();
        let _ = reg.upsert("b", &Map::new());
        let _ = reg.upsert("a", &Map::new());
        let _ = reg.upsert("b", &fields(json!({"status": "completed"})));
        let ids: Vec<_> = reg.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn serializes_flat() {
        let mut call = ToolCall::new("t1");
        call.apply(&fields(json!({"title": "Edit"})));
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"id": "t1", "title": "Edit"})
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_update() -> impl Strategy<Value = Map<String, Value>> {
            proptest::collection::btree_map(
                prop_oneof![
                    Just("title".to_owned()),
                    Just("status".to_owned()),
                    Just("kind".to_owned()),
                    Just("rawOutput".to_owned()),
                ],
                "[a-z]{1,5}".prop_map(Value::String),
                0..4,
            )
            .prop_map(|m| m.into_iter().collect())
        }

        proptest! {
            #[test]
            fn later_updates_win_per_field(updates in proptest::collection::vec(arb_update(), 1..8)) {
                let mut reg = ToolCallRegistry::new();
                for u in &updates {
                    let _ = reg.upsert("t1", u);
                }
                prop_assert_eq!(reg.len(), 1);
                let call = reg.lookup("t1").unwrap();
                for key in ["title", "status", "kind", "rawOutput"] {
                    let expected = updates.iter().rev().find_map(|u| u.get(key));
                    prop_assert_eq!(call.fields.get(key), expected);
                }
            }
        }
    }
}
