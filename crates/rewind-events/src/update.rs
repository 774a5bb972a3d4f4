//! Typed view of `session/update` notification payloads.
//!
//! The payload lives at `params.update` and is discriminated by its
//! `sessionUpdate` field:
//!
//! ```json
//! {"method": "session/update",
//!  "params": {"sessionId": "s1",
//!             "update": {"sessionUpdate": "agent_message_chunk",
//!                        "content": {"type": "text", "text": "He"}}}}
//! ```

use rewind_core::ChunkKind;
use serde_json::{Map, Value};

/// Method of a prompt request.
pub const SESSION_PROMPT: &str = "session/prompt";
/// Method of a session update notification.
pub const SESSION_UPDATE: &str = "session/update";
/// Side-channel diagnostic notification.
pub const CONSOLE_LOG: &str = "console/log";
/// User-initiated shell execution notification.
pub const SHELL_EXECUTION: &str = "shell/execution";

/// Discriminator key inside an update payload.
pub const DISCRIMINATOR: &str = "sessionUpdate";

/// One parsed session update.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// Streamed content fragment.
    Chunk {
        /// Which stream the fragment belongs to.
        kind: ChunkKind,
        /// Raw content block.
        content: Value,
    },
    /// First report of a tool call.
    ToolCall(ToolCallFields),
    /// Incremental change to a tool call.
    ToolCallUpdate(ToolCallFields),
    /// Agent plan, kept verbatim.
    Plan(Value),
    /// Slash-command list, kept verbatim.
    AvailableCommands(Value),
    /// Session mode switch, kept verbatim.
    CurrentMode(Value),
    /// Update kind this crate does not model.
    Other {
        /// The `sessionUpdate` value.
        kind: String,
        /// Whole update object.
        payload: Value,
    },
}

/// Tool-call fields carried by `tool_call` and `tool_call_update`.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallFields {
    /// Stable tool-call id.
    pub id: String,
    /// Every field of the update, discriminator included.
    pub fields: Map<String, Value>,
}

impl SessionUpdate {
    /// Parse the update carried by a `session/update` params object.
    ///
    /// Returns `None` when there is no `update` object or no discriminator.
    /// Tool-call updates without a `toolCallId` are treated as unmodeled.
    pub fn from_params(params: &Value) -> Option<Self> {
        let update = params.get("update")?;
        let obj = update.as_object()?;
        let kind = obj.get(DISCRIMINATOR)?.as_str()?;
        let content = || obj.get("content").cloned().unwrap_or(Value::Null);

        let parsed = match kind {
            "user_message_chunk" => Self::Chunk {
                kind: ChunkKind::UserMessage,
                content: content(),
            },
            "agent_message_chunk" => Self::Chunk {
                kind: ChunkKind::AgentMessage,
                content: content(),
            },
            "agent_thought_chunk" => Self::Chunk {
                kind: ChunkKind::AgentThought,
                content: content(),
            },
            "tool_call" | "tool_call_update" => {
                let Some(id) = obj.get("toolCallId").and_then(Value::as_str) else {
                    return Some(Self::Other {
                        kind: kind.to_owned(),
                        payload: update.clone(),
                    });
                };
                let fields = ToolCallFields {
                    id: id.to_owned(),
                    fields: obj.clone(),
                };
                if kind == "tool_call" {
                    Self::ToolCall(fields)
                } else {
                    Self::ToolCallUpdate(fields)
                }
            }
            "plan" => Self::Plan(update.clone()),
            "available_commands_update" => Self::AvailableCommands(update.clone()),
            "current_mode_update" => Self::CurrentMode(update.clone()),
            other => Self::Other {
                kind: other.to_owned(),
                payload: update.clone(),
            },
        };
        Some(parsed)
    }

    /// The `sessionUpdate` discriminator this value was parsed from.
    pub fn discriminator(&self) -> &str {
        match self {
            Self::Chunk { kind, .. } => match kind {
                ChunkKind::UserMessage => "user_message_chunk",
                ChunkKind::AgentMessage => "agent_message_chunk",
                ChunkKind::AgentThought => "agent_thought_chunk",
            },
            Self::ToolCall(_) => "tool_call",
            Self::ToolCallUpdate(_) => "tool_call_update",
            Self::Plan(_) => "plan",
            Self::AvailableCommands(_) => "available_commands_update",
            Self::CurrentMode(_) => "current_mode_update",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// Text of a content block, if it is a text block.
pub fn content_text(content: &Value) -> Option<&str> {
    match content.get("type").and_then(Value::as_str) {
        Some("text") | None => content.get("text").and_then(Value::as_str),
        Some(_) => None,
    }
}

/// Whether a prompt content block is meant for the agent only.
///
/// Blocks flagged `_meta.hidden` or `_meta.systemContext`, and blocks whose
/// `annotations.audience` excludes `"user"`, are hidden.
pub fn is_hidden_block(block: &Value) -> bool {
    let meta_flag = |key: &str| {
        block
            .get("_meta")
            .and_then(|m| m.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    if meta_flag("hidden") || meta_flag("systemContext") {
        return true;
    }
    block
        .get("annotations")
        .and_then(|a| a.get("audience"))
        .and_then(Value::as_array)
        .is_some_and(|audience| !audience.iter().any(|r| r == "user"))
}

/// First visible text block of a `session/prompt` request's params.
pub fn prompt_text(params: &Value) -> Option<String> {
    params
        .get("prompt")?
        .as_array()?
        .iter()
        .filter(|block| !is_hidden_block(block))
        .find_map(|block| {
            block
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| *t == "text")
                .and_then(|_| block.get("text"))
                .and_then(Value::as_str)
        })
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
