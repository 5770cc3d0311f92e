//! `namespace:path` kind syntax.

use crate::ProtocolError;

/// Check that `kind` has exactly one colon separating a non-empty namespace
/// from a non-empty path.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidKind`] describing the first violation.
pub fn validate_kind(kind: &str) -> Result<(), ProtocolError> {
    let reason = if kind.is_empty() {
        "kind is empty"
    } else {
        match kind.matches(':').count() {
            0 => "missing ':' separator",
            1 if kind.starts_with(':') => "namespace is empty",
            1 if kind.ends_with(':') => "path is empty",
            1 => return Ok(()),
            _ => "more than one ':' separator",
        }
    };
    Err(ProtocolError::InvalidKind { kind: kind.to_owned(), reason })
}

/// Validate `kind` and split it into `(namespace, path)`.
///
/// # Errors
///
/// See [`validate_kind`].
pub fn split_kind(kind: &str) -> Result<(&str, &str), ProtocolError> {
    validate_kind(kind)?;
    kind.split_once(':').ok_or_else(|| ProtocolError::InvalidKind {
        kind: kind.to_owned(),
        reason: "missing ':' separator",
    })
}

#[cfg(test)]
#[path = "kind_test.rs"]
mod tests;
