//! Error types for persisted log decoding.

use thiserror::Error;

/// Why one persisted log line was rejected.
///
/// These never escape a batch parse: [`parse_log`] logs them and counts the
/// line as skipped.
///
/// [`parse_log`]: crate::log::parse_log
#[derive(Debug, Error)]
pub enum LogParseError {
    /// The line is not valid JSON.
    #[error("line {line}: invalid JSON: {source}")]
    InvalidJson {
        /// 1-based line number.
        line: usize,
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// The line decoded but is not a JSON object.
    #[error("line {line}: record is not an object")]
    NotAnObject {
        /// 1-based line number.
        line: usize,
    },
    /// A required field is missing or has the wrong type.
    #[error("line {line}: missing or invalid field `{field}`")]
    MissingField {
        /// 1-based line number.
        line: usize,
        /// Field name.
        field: &'static str,
    },
}

impl LogParseError {
    /// Line number the error refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::InvalidJson { line, .. }
            | Self::NotAnObject { line }
            | Self::MissingField { line, .. } => *line,
        }
    }
}
