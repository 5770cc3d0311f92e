//! Client error taxonomy.
//!
//! A caller of a request always receives either a response or exactly one of
//! these errors. Errors are `Clone` so a single connect outcome can be handed
//! to every caller waiting on the same attempt.

use std::time::Duration;

use frames::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure: connect failure or timeout, mid-session
    /// disconnect, send failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Frame-format or kind-syntax violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer answered with a nonzero status.
    #[error("remote error {status} for {kind} (request {request_id}): {message}")]
    Remote { status: u8, kind: String, request_id: u64, message: String },

    /// No response arrived within the request timeout.
    #[error("request {request_id} ({kind}) timed out after {timeout:?}")]
    Timeout { kind: String, request_id: u64, timeout: Duration },

    /// The connection is not in a usable state.
    #[error("connection closed: {0}")]
    Closed(String),
}

impl ClientError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub(crate) fn closed(message: impl Into<String>) -> Self {
        Self::Closed(message.into())
    }

    /// Grepable error code, stable across releases.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "E_CONNECTION",
            Self::Protocol(_) => "E_PROTOCOL",
            Self::Remote { .. } => "E_REMOTE",
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::Closed(_) => "E_CLOSED",
        }
    }

    /// Whether retrying the same operation may succeed without caller changes.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. } | Self::Closed(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
