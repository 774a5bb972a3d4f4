//! Error types for wire message decoding.

use thiserror::Error;

/// Errors raised when a raw value cannot be turned into a [`WireMessage`].
///
/// [`classify`] never fails; this type only exists for callers that need a
/// typed message and want to know why one could not be built.
///
/// [`WireMessage`]: crate::wire::WireMessage
/// [`classify`]: crate::wire::classify
#[derive(Debug, Error)]
pub enum WireError {
    /// The value is not a JSON object.
    #[error("wire message is not a JSON object")]
    NotAnObject,
    /// The object matched no request, notification or response shape.
    #[error("unrecognized wire message shape (keys: {})", keys.join(", "))]
    Unrecognized {
        /// Top-level keys present on the object.
        keys: Vec<String>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_an_object_display() {
        assert_eq!(
            WireError::NotAnObject.to_string(),
            "wire message is not a JSON object"
        );
    }

    #[test]
    fn unrecognized_lists_keys() {
        let err = WireError::Unrecognized {
            keys: vec!["id".into(), "foo".into()],
        };
        assert_eq!(
            err.to_string(),
            "unrecognized wire message shape (keys: id, foo)"
        );
    }
}
