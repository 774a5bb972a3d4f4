//! # rewind-events
//!
//! Conversation reconstruction from agent session messages.
//!
//! Two folds share one set of merge rules:
//!
//! - [`build_timeline`]: the live path. Turns are delimited by
//!   `session/prompt` request/response correlation.
//! - [`replay_conversation`]: the resume path over a persisted log. Turns are
//!   inferred from user messages alone.
//!
//! Tool calls are tracked in a [`ToolCallRegistry`] arena so an item keeps its
//! position while later updates change its fields.

#![deny(unsafe_code)]

pub mod builder;
pub mod errors;
pub mod event;
pub mod log;
pub mod registry;
pub mod replay;
pub mod update;

pub use builder::{StandaloneItem, Timeline, TimelineEntry, Turn, TurnItem, build_timeline};
pub use errors::LogParseError;
pub use event::SessionEvent;
pub use log::{ParsedLog, StoredLogEntry, parse_line, parse_log};
pub use registry::{ToolCall, ToolCallKey, ToolCallRegistry, Upsert};
pub use replay::{ContentBlock, ConversationTurn, Role, ToolCallInfo, replay_conversation};
pub use update::SessionUpdate;
