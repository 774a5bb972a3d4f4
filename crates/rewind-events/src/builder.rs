//! Live turn reconstruction.
//!
//! Folds an ordered [`SessionEvent`] sequence into a [`Timeline`] of turns and
//! standalone items. The fold is pure: hosts may re-run it over the full
//! history on every new event and get identical results for identical input.
//!
//! Turn boundaries come from request/response correlation:
//!
//! - a `session/prompt` request opens a turn keyed by its request id and makes
//!   it the open turn that receives updates
//! - the matching response completes that turn; a new prompt never does
//! - updates that arrive while no turn is open are dropped

use std::collections::HashMap;

use rewind_core::{ChunkKind, Chunked, RequestId, ResponseOutcome, WireMessage, push_chunk};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::event::SessionEvent;
use crate::registry::{ToolCall, ToolCallKey, ToolCallRegistry, Upsert};
use crate::update::{
    CONSOLE_LOG, SESSION_PROMPT, SHELL_EXECUTION, SessionUpdate, content_text, prompt_text,
};

/// One entry in a turn's item list.
///
/// While a turn is being built, tool calls are held as registry keys
/// (`TurnItem<ToolCallKey>`); finished turns carry the merged records.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnItem<T = ToolCall> {
    /// Coalesced text chunk.
    Text {
        /// Stream the text belongs to.
        kind: ChunkKind,
        /// Concatenated text.
        text: String,
    },
    /// Non-text chunk (image, resource link, ...), kept verbatim.
    Content {
        /// Stream the content belongs to.
        kind: ChunkKind,
        /// Raw content block.
        content: Value,
    },
    /// Tool call, positioned where it was first reported.
    ToolCall {
        /// The tool call.
        call: T,
    },
    /// Agent plan update.
    Plan {
        /// Verbatim update payload.
        update: Value,
    },
    /// Available slash-command list update.
    AvailableCommands {
        /// Verbatim update payload.
        update: Value,
    },
    /// Session mode change.
    ModeChange {
        /// Verbatim update payload.
        update: Value,
    },
    /// Diagnostic console record.
    Console {
        /// Severity (`log`, `info`, `warn`, `error`, ...).
        level: String,
        /// Message text.
        message: String,
    },
}

impl<T> Chunked for TurnItem<T> {
    fn as_chunk(&self) -> Option<(ChunkKind, &str)> {
        match self {
            Self::Text { kind, text } => Some((*kind, text.as_str())),
            _ => None,
        }
    }

    fn from_chunk(kind: ChunkKind, text: String) -> Self {
        Self::Text { kind, text }
    }
}

impl TurnItem<ToolCallKey> {
    fn resolve(self, registry: &ToolCallRegistry) -> Option<TurnItem> {
        Some(match self {
            Self::ToolCall { call } => TurnItem::ToolCall {
                call: registry.get(call)?.clone(),
            },
            Self::Text { kind, text } => TurnItem::Text { kind, text },
            Self::Content { kind, content } => TurnItem::Content { kind, content },
            Self::Plan { update } => TurnItem::Plan { update },
            Self::AvailableCommands { update } => TurnItem::AvailableCommands { update },
            Self::ModeChange { update } => TurnItem::ModeChange { update },
            Self::Console { level, message } => TurnItem::Console { level, message },
        })
    }
}

/// One user prompt and everything the agent produced for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Id of the originating `session/prompt` request.
    pub request_id: RequestId,
    /// First visible text block of the prompt.
    pub user_text: Option<String>,
    /// Agent output in arrival order.
    pub items: Vec<TurnItem>,
    /// Whether the prompt response has arrived.
    pub complete: bool,
    /// Stop reason from a successful response.
    pub stop_reason: Option<String>,
    /// Response time minus request time, once complete.
    pub duration_ms: Option<i64>,
    /// Error object from a failed response.
    pub error: Option<Value>,
}

/// A timeline entry that does not belong to any turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StandaloneItem {
    /// Shell command the user ran directly.
    #[serde(rename_all = "camelCase")]
    ShellExecution {
        /// Command line.
        command: String,
        /// Captured output.
        output: Option<String>,
        /// Exit status.
        exit_code: Option<i64>,
        /// Arrival time.
        timestamp_ms: i64,
    },
}

/// Entry in a [`Timeline`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TimelineEntry {
    /// A prompt turn.
    Turn(Turn),
    /// A standalone item.
    Standalone(StandaloneItem),
}

/// Reconstructed session in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Timeline {
    /// Turns and standalone items, interleaved.
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Turns only.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.entries.iter().filter_map(|e| match e {
            TimelineEntry::Turn(turn) => Some(turn),
            TimelineEntry::Standalone(_) => None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fold state
// ─────────────────────────────────────────────────────────────────────────────

struct TurnState {
    request_id: RequestId,
    user_text: Option<String>,
    items: Vec<TurnItem<ToolCallKey>>,
    registry: ToolCallRegistry,
    complete: bool,
    stop_reason: Option<String>,
    /// Starts at `-request_ts`; the response timestamp is added on completion.
    duration_ms: i64,
    error: Option<Value>,
}

impl TurnState {
    fn finish(self) -> Turn {
        let registry = self.registry;
        Turn {
            request_id: self.request_id,
            user_text: self.user_text,
            items: self
                .items
                .into_iter()
                .filter_map(|item| item.resolve(&registry))
                .collect(),
            complete: self.complete,
            stop_reason: self.stop_reason,
            duration_ms: self.complete.then_some(self.duration_ms),
            error: self.error,
        }
    }

    fn apply_update(&mut self, update: &SessionUpdate) {
        match update {
            // user text already came from the prompt request
            SessionUpdate::Chunk {
                kind: ChunkKind::UserMessage,
                ..
            } => {}
            SessionUpdate::Chunk { kind, content } => match content_text(content) {
                Some(text) => push_chunk(&mut self.items, *kind, text),
                None => self.items.push(TurnItem::Content {
                    kind: *kind,
                    content: content.clone(),
                }),
            },
            SessionUpdate::ToolCall(tc) => {
                if let Upsert::Created(key) = self.registry.upsert(&tc.id, &tc.fields) {
                    self.items.push(TurnItem::ToolCall { call: key });
                }
            }
            SessionUpdate::ToolCallUpdate(tc) => {
                if self.registry.merge(&tc.id, &tc.fields).is_none() {
                    trace!(tool_call_id = %tc.id, "dropping update for unknown tool call");
                }
            }
            SessionUpdate::Plan(v) => self.items.push(TurnItem::Plan { update: v.clone() }),
            SessionUpdate::AvailableCommands(v) => {
                self.items.push(TurnItem::AvailableCommands { update: v.clone() });
            }
            SessionUpdate::CurrentMode(v) => {
                self.items.push(TurnItem::ModeChange { update: v.clone() });
            }
            SessionUpdate::Other { kind, .. } => {
                trace!(kind = %kind, "ignoring unmodeled session update");
            }
        }
    }
}

enum Slot {
    Turn(usize),
    Standalone(StandaloneItem),
}

#[derive(Default)]
struct BuildState {
    slots: Vec<Slot>,
    turns: Vec<TurnState>,
    pending: HashMap<RequestId, usize>,
    open: Option<usize>,
}

impl BuildState {
    fn open_turn(&mut self) -> Option<&mut TurnState> {
        self.open.and_then(|idx| self.turns.get_mut(idx))
    }

    fn handle_prompt(&mut self, id: &RequestId, params: &Value, ts: i64) {
        let idx = self.turns.len();
        self.turns.push(TurnState {
            request_id: id.clone(),
            user_text: prompt_text(params),
            items: Vec::new(),
            registry: ToolCallRegistry::new(),
            complete: false,
            stop_reason: None,
            duration_ms: ts.saturating_neg(),
            error: None,
        });
        self.slots.push(Slot::Turn(idx));
        let _ = self.pending.insert(id.clone(), idx);
        self.open = Some(idx);
    }

    fn handle_response(&mut self, id: &RequestId, outcome: &ResponseOutcome, ts: i64) {
        let Some(idx) = self.pending.remove(id) else {
            trace!(request_id = %id, "response does not match a pending prompt");
            return;
        };
        if self.open == Some(idx) {
            self.open = None;
        }
        let Some(turn) = self.turns.get_mut(idx) else {
            return;
        };
        turn.complete = true;
        turn.duration_ms = turn.duration_ms.saturating_add(ts);
        match outcome {
            ResponseOutcome::Result(result) => {
                turn.stop_reason = result
                    .get("stopReason")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
            }
            ResponseOutcome::Error(err) => turn.error = Some(err.clone()),
        }
    }

    fn handle_console(&mut self, params: &Value) {
        let Some(turn) = self.open_turn() else {
            return;
        };
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("log")
            .to_owned();
        let message = match params.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        turn.items.push(TurnItem::Console { level, message });
    }

    fn handle_shell(&mut self, params: &Value, ts: i64) {
        let Some(command) = params.get("command").and_then(Value::as_str) else {
            return;
        };
        self.slots.push(Slot::Standalone(StandaloneItem::ShellExecution {
            command: command.to_owned(),
            output: params
                .get("output")
                .and_then(Value::as_str)
                .map(str::to_owned),
            exit_code: params.get("exitCode").and_then(Value::as_i64),
            timestamp_ms: ts,
        }));
    }

    fn handle_event(&mut self, event: &SessionEvent) {
        let ts = event.timestamp_ms;
        match &event.message {
            WireMessage::Request { id, method, params } if method == SESSION_PROMPT => {
                self.handle_prompt(id, params, ts);
            }
            WireMessage::Request { .. } => {}
            WireMessage::Response { id, outcome } => self.handle_response(id, outcome, ts),
            WireMessage::Notification { method, params } => {
                if let Some(update) = &event.update {
                    match self.open_turn() {
                        Some(turn) => turn.apply_update(update),
                        None => trace!(kind = update.discriminator(), "no open turn, dropping update"),
                    }
                } else if method == CONSOLE_LOG {
                    self.handle_console(params);
                } else if method == SHELL_EXECUTION {
                    self.handle_shell(params, ts);
                }
            }
        }
    }

    fn finish(self) -> Timeline {
        let mut turns: Vec<Option<TurnState>> = self.turns.into_iter().map(Some).collect();
        let entries = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Turn(idx) => turns
                    .get_mut(idx)
                    .and_then(Option::take)
                    .map(|t| TimelineEntry::Turn(t.finish())),
                Slot::Standalone(item) => Some(TimelineEntry::Standalone(item)),
            })
            .collect();
        Timeline { entries }
    }
}

/// Fold a live event sequence into a timeline.
pub fn build_timeline(events: &[SessionEvent]) -> Timeline {
    let mut state = BuildState::default();
    for event in events {
        state.handle_event(event);
    }
    state.finish()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
