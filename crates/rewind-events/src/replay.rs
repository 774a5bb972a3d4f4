//! Resume-path conversation replay over a persisted log.
//!
//! Stored logs do not reliably keep request/response correlation, so this
//! fold does not try to pair them. A turn boundary is inferred whenever a user
//! message shows up: the assistant output accumulated so far is flushed as one
//! assistant turn and a new user turn starts. Whatever remains at the end of
//! the batch is flushed as a final assistant turn.

use rewind_core::{ChunkKind, Chunked, MessageKind, push_chunk};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

use crate::log::StoredLogEntry;
use crate::registry::{ToolCall, ToolCallRegistry, Upsert};
use crate::update::{
    SESSION_PROMPT, SESSION_UPDATE, SessionUpdate, ToolCallFields, content_text, prompt_text,
};

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human.
    User,
    /// The agent.
    Assistant,
}

/// Text block inside a conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Visible text.
    Text {
        /// Block text.
        text: String,
    },
    /// Agent reasoning.
    Thought {
        /// Block text.
        text: String,
    },
}

impl Chunked for ContentBlock {
    fn as_chunk(&self) -> Option<(ChunkKind, &str)> {
        match self {
            Self::Text { text } => Some((ChunkKind::AgentMessage, text.as_str())),
            Self::Thought { text } => Some((ChunkKind::AgentThought, text.as_str())),
        }
    }

    fn from_chunk(kind: ChunkKind, text: String) -> Self {
        match kind {
            ChunkKind::AgentThought => Self::Thought { text },
            ChunkKind::AgentMessage | ChunkKind::UserMessage => Self::Text { text },
        }
    }
}

/// Tool invocation summary attached to an assistant turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallInfo {
    /// Tool-call id.
    pub id: String,
    /// Tool name.
    pub name: Option<String>,
    /// Tool input.
    pub input: Option<Value>,
    /// Tool response, once reported.
    pub response: Option<Value>,
}

impl ToolCallInfo {
    /// Summarize a merged tool call.
    ///
    /// Implementation metadata under `_meta` wins; the protocol's `title`,
    /// `rawInput` and `rawOutput` fill the gaps.
    pub fn from_call(call: &ToolCall) -> Self {
        let meta = call.meta();
        Self {
            id: call.id.clone(),
            name: meta_lookup(meta, &["toolName", "name"])
                .and_then(Value::as_str)
                .or_else(|| call.title())
                .map(str::to_owned),
            input: meta_lookup(meta, &["toolInput", "input"])
                .or_else(|| call.raw_input())
                .cloned(),
            response: meta_lookup(meta, &["toolResponse", "response"])
                .or_else(|| call.raw_output())
                .cloned(),
        }
    }
}

/// Find the first of `keys` in `_meta`, or one level down inside a nested
/// vendor object such as `_meta.claudeCode`.
fn meta_lookup<'a>(meta: Option<&'a Map<String, Value>>, keys: &[&str]) -> Option<&'a Value> {
    let meta = meta?;
    let direct = |obj: &'a Map<String, Value>| keys.iter().find_map(|k| obj.get(*k));
    direct(meta).or_else(|| meta.values().filter_map(Value::as_object).find_map(direct))
}

/// Whether an update names a tool or its input, as opposed to only carrying
/// a result for a call reported earlier.
fn carries_identity(fields: &Map<String, Value>) -> bool {
    let meta = fields.get("_meta").and_then(Value::as_object);
    meta_lookup(meta, &["toolName", "name", "toolInput", "input"]).is_some()
        || fields.contains_key("title")
        || fields.contains_key("rawInput")
}

/// One role-tagged turn rebuilt from a persisted log.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Speaker.
    pub role: Role,
    /// Text blocks in order.
    pub content: Vec<ContentBlock>,
    /// Tool calls made during this turn, in first-seen order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallInfo>,
}

impl ConversationTurn {
    /// All text blocks joined, thoughts excluded.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Thought { .. } => None,
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fold state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ReplayState {
    output: Vec<ConversationTurn>,
    blocks: Vec<ContentBlock>,
    tools: ToolCallRegistry,
    /// A tool call landed after the last text block.
    chunk_barrier: bool,
    /// The last user turn came from a `session/prompt` request and nothing
    /// has followed it yet.
    prompt_echo: bool,
}

impl ReplayState {
    fn has_pending(&self) -> bool {
        !self.blocks.is_empty() || !self.tools.is_empty()
    }

    fn flush_assistant(&mut self) {
        if !self.has_pending() {
            return;
        }
        let tools = std::mem::take(&mut self.tools);
        self.output.push(ConversationTurn {
            role: Role::Assistant,
            content: std::mem::take(&mut self.blocks),
            tool_calls: tools.iter().map(ToolCallInfo::from_call).collect(),
        });
        self.chunk_barrier = false;
    }

    fn push_user(&mut self, text: String, from_prompt: bool) {
        self.flush_assistant();
        self.output.push(ConversationTurn {
            role: Role::User,
            content: vec![ContentBlock::Text { text }],
            tool_calls: Vec::new(),
        });
        self.prompt_echo = from_prompt;
    }

    fn handle_user_chunk(&mut self, text: &str) {
        // echo of a prompt that was already recorded as a request
        if self.prompt_echo {
            return;
        }
        self.push_user(text.to_owned(), false);
    }

    fn handle_agent_chunk(&mut self, kind: ChunkKind, text: &str) {
        self.prompt_echo = false;
        if self.chunk_barrier {
            self.blocks.push(ContentBlock::from_chunk(kind, text.to_owned()));
            self.chunk_barrier = false;
        } else {
            push_chunk(&mut self.blocks, kind, text);
        }
    }

    fn handle_tool(&mut self, tc: &ToolCallFields, is_update: bool) {
        if is_update && !carries_identity(&tc.fields) && !self.tools.contains(&tc.id) {
            trace!(tool_call_id = %tc.id, "dropping result for unknown tool call");
            return;
        }
        self.prompt_echo = false;
        if let Upsert::Created(_) = self.tools.upsert(&tc.id, &tc.fields) {
            self.chunk_barrier = true;
        }
    }

    fn handle_update(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::Chunk {
                kind: ChunkKind::UserMessage,
                content,
            } => {
                if let Some(text) = content_text(content) {
                    self.handle_user_chunk(text);
                }
            }
            SessionUpdate::Chunk { kind, content } => {
                if let Some(text) = content_text(content) {
                    self.handle_agent_chunk(*kind, text);
                }
            }
            SessionUpdate::ToolCall(tc) => self.handle_tool(tc, false),
            SessionUpdate::ToolCallUpdate(tc) => self.handle_tool(tc, true),
            SessionUpdate::Plan(_)
            | SessionUpdate::AvailableCommands(_)
            | SessionUpdate::CurrentMode(_)
            | SessionUpdate::Other { .. } => {}
        }
    }

    fn handle_entry(&mut self, entry: &StoredLogEntry) {
        match (entry.kind(), entry.method()) {
            (MessageKind::Notification, Some(SESSION_UPDATE)) => {
                if let Some(update) = entry.params().and_then(SessionUpdate::from_params) {
                    self.handle_update(&update);
                }
            }
            (MessageKind::Request, Some(SESSION_PROMPT)) => {
                if let Some(text) = entry.params().and_then(prompt_text) {
                    self.push_user(text, true);
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<ConversationTurn> {
        self.flush_assistant();
        self.output
    }
}

/// Rebuild role-tagged turns from persisted entries.
pub fn replay_conversation(entries: &[StoredLogEntry]) -> Vec<ConversationTurn> {
    let mut state = ReplayState::default();
    for entry in entries {
        state.handle_entry(entry);
    }
    state.finish()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
