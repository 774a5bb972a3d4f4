//! Live session events: a wire message plus its arrival time.

use rewind_core::{WireError, WireMessage};
use serde_json::Value;

use crate::log::StoredLogEntry;
use crate::update::{SESSION_UPDATE, SessionUpdate};

/// One message in a session's append-only event sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    /// The message as received.
    pub message: WireMessage,
    /// Arrival time in milliseconds. Monotonic within a session.
    pub timestamp_ms: i64,
    /// Parsed payload when the message is a `session/update` notification.
    pub update: Option<SessionUpdate>,
}

impl SessionEvent {
    /// Wrap a message, parsing its session update if it carries one.
    pub fn new(message: WireMessage, timestamp_ms: i64) -> Self {
        let update = match &message {
            WireMessage::Notification { method, params } if method == SESSION_UPDATE => {
                SessionUpdate::from_params(params)
            }
            _ => None,
        };
        Self {
            message,
            timestamp_ms,
            update,
        }
    }

    /// Build from a raw JSON message.
    pub fn from_value(value: &Value, timestamp_ms: i64) -> Result<Self, WireError> {
        Ok(Self::new(WireMessage::from_value(value)?, timestamp_ms))
    }

    /// Convert persisted entries into live events.
    ///
    /// Entries without a timestamp take the previous event's time so the
    /// sequence stays monotonic. Entries whose message shape is unknown are
    /// dropped.
    pub fn from_stored(entries: &[StoredLogEntry]) -> Vec<Self> {
        let mut last_ms = 0;
        entries
            .iter()
            .filter_map(|entry| {
                let message = WireMessage::from_value(&entry.notification).ok()?;
                let ts = entry
                    .timestamp
                    .map_or(last_ms, |t| t.timestamp_millis().max(last_ms));
                last_ms = ts;
                Some(Self::new(message, ts))
            })
            .collect()
    }
}
