//! JSON-RPC wire messages exchanged between the client and the agent.
//!
//! Every message crossing the session transport is one of three shapes:
//!
//! | shape        | keys                          | direction |
//! |--------------|-------------------------------|-----------|
//! | request      | `id` + `method` (+ `params`)  | client    |
//! | notification | `method` (+ `params`), no id  | agent     |
//! | response     | `id` + `result` or `error`    | agent     |
//!
//! [`classify`] is the single place that decides which shape a raw value has.
//! It is total: anything else maps to [`MessageKind::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::WireError;

/// A JSON-RPC request id. Either an integer or a string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
}

impl RequestId {
    /// Read an id from a raw JSON value. Nulls, floats and other shapes are not ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// Outcome carried by a response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseOutcome {
    /// Successful result payload.
    Result(Value),
    /// Error object.
    Error(Value),
}

/// One message as received on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum WireMessage {
    /// Client-originated call expecting a response.
    Request {
        /// Correlation id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Parameters (`null` when absent).
        params: Value,
    },
    /// Fire-and-forget message.
    Notification {
        /// Method name.
        method: String,
        /// Parameters (`null` when absent).
        params: Value,
    },
    /// Reply to an earlier request.
    Response {
        /// Id of the request being answered.
        id: RequestId,
        /// Result or error.
        outcome: ResponseOutcome,
    },
}

/// Shape of a raw message, as decided by [`classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `id` + `method`.
    Request,
    /// `method` without `id`.
    Notification,
    /// `id` + `result` or `error`.
    Response,
    /// Anything else.
    Unknown,
}

/// Which side of the session produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The user-facing client.
    Client,
    /// The remote agent.
    Agent,
}

/// Decide the shape of a raw message.
pub fn classify(value: &Value) -> MessageKind {
    let Some(obj) = value.as_object() else {
        return MessageKind::Unknown;
    };
    classify_object(obj)
}

fn classify_object(obj: &Map<String, Value>) -> MessageKind {
    let has_id = obj.get("id").and_then(RequestId::from_value).is_some();
    let has_method = obj.get("method").is_some_and(Value::is_string);
    let has_outcome = obj.contains_key("result") || obj.get("error").is_some_and(|e| !e.is_null());

    match (has_id, has_method, has_outcome) {
        (true, true, _) => MessageKind::Request,
        (false, true, _) => MessageKind::Notification,
        (true, false, true) => MessageKind::Response,
        _ => MessageKind::Unknown,
    }
}

/// Infer who sent a message from its shape alone.
///
/// Persisted logs do not always record direction, so requests are taken to
/// come from the client and everything else from the agent.
pub fn infer_direction(value: &Value) -> Option<Direction> {
    match classify(value) {
        MessageKind::Request => Some(Direction::Client),
        MessageKind::Notification | MessageKind::Response => Some(Direction::Agent),
        MessageKind::Unknown => None,
    }
}

impl WireMessage {
    /// Build a typed message from a raw value.
    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let obj = value.as_object().ok_or(WireError::NotAnObject)?;
        let params = || obj.get("params").cloned().unwrap_or(Value::Null);
        let method = || {
            obj.get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let id = obj.get("id").and_then(RequestId::from_value);

        match (classify_object(obj), id) {
            (MessageKind::Request, Some(id)) => Ok(Self::Request {
                id,
                method: method(),
                params: params(),
            }),
            (MessageKind::Notification, _) => Ok(Self::Notification {
                method: method(),
                params: params(),
            }),
            (MessageKind::Response, Some(id)) => {
                let outcome = match obj.get("error") {
                    Some(err) if !err.is_null() => ResponseOutcome::Error(err.clone()),
                    _ => ResponseOutcome::Result(obj.get("result").cloned().unwrap_or(Value::Null)),
                };
                Ok(Self::Response { id, outcome })
            }
            _ => Err(WireError::Unrecognized {
                keys: obj.keys().cloned().collect(),
            }),
        }
    }

    /// Shape of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request { .. } => MessageKind::Request,
            Self::Notification { .. } => MessageKind::Notification,
            Self::Response { .. } => MessageKind::Response,
        }
    }

    /// Method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } => None,
        }
    }

    /// Correlation id, for requests and responses.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => Some(id),
            Self::Notification { .. } => None,
        }
    }

    /// Parameters, for requests and notifications.
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Request { params, .. } | Self::Notification { params, .. } => Some(params),
            Self::Response { .. } => None,
        }
    }

    /// Direction implied by this message's shape.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Request { .. } => Direction::Client,
            Self::Notification { .. } | Self::Response { .. } => Direction::Agent,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
