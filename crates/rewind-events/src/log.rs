//! Persisted run logs: one JSON record per line.
//!
//! ```json
//! {"type": "notification", "timestamp": "2025-01-01T00:00:00Z",
//!  "notification": {"method": "session/update", "params": {...}}}
//! ```
//!
//! Bad lines are skipped one at a time. A batch parse never fails.

use chrono::{DateTime, Utc};
use rewind_core::{Direction, MessageKind, classify, infer_direction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::LogParseError;

/// One persisted record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredLogEntry {
    /// Record type as written by the recorder.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Wall-clock time the record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The wire message (any of `id`, `method`, `params`, `result`, `error`).
    pub notification: Value,
}

impl StoredLogEntry {
    /// Method name, if any.
    pub fn method(&self) -> Option<&str> {
        self.notification.get("method").and_then(Value::as_str)
    }

    /// Params object, if any.
    pub fn params(&self) -> Option<&Value> {
        self.notification.get("params")
    }

    /// Shape of the stored message.
    pub fn kind(&self) -> MessageKind {
        classify(&self.notification)
    }

    /// Direction inferred from shape.
    pub fn direction(&self) -> Option<Direction> {
        infer_direction(&self.notification)
    }

    /// Whether this is a notification with the given method.
    pub fn is_notification(&self, method: &str) -> bool {
        self.kind() == MessageKind::Notification && self.method() == Some(method)
    }
}

/// Result of parsing a whole log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedLog {
    /// Valid records in file order.
    pub entries: Vec<StoredLogEntry>,
    /// Number of non-blank lines that were rejected.
    pub skipped: usize,
}

/// Parse one line. `line_no` is 1-based and only used for errors.
///
/// A timestamp that is not valid ISO-8601 is dropped; the record is kept.
pub fn parse_line(line: &str, line_no: usize) -> Result<StoredLogEntry, LogParseError> {
    let value: Value = serde_json::from_str(line).map_err(|source| LogParseError::InvalidJson {
        line: line_no,
        source,
    })?;
    let Value::Object(mut record) = value else {
        return Err(LogParseError::NotAnObject { line: line_no });
    };

    let record_type = match record.remove("type") {
        Some(Value::String(t)) => t,
        _ => {
            return Err(LogParseError::MissingField {
                line: line_no,
                field: "type",
            });
        }
    };
    let notification = match record.remove("notification") {
        Some(n @ Value::Object(_)) => n,
        _ => {
            return Err(LogParseError::MissingField {
                line: line_no,
                field: "notification",
            });
        }
    };
    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());

    Ok(StoredLogEntry {
        record_type,
        timestamp,
        notification,
    })
}

/// Parse a newline-delimited log, skipping invalid lines.
pub fn parse_log(content: &str) -> ParsedLog {
    let mut parsed = ParsedLog::default();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, idx + 1) {
            Ok(entry) => parsed.entries.push(entry),
            Err(err) => {
                debug!(line = err.line(), error = %err, "skipping invalid log line");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
