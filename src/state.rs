//! Connection state machine values.

use std::fmt;

use serde::Serialize;

/// Lifecycle of a client connection. Exactly one state holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial/terminal: no transport.
    Closed,
    /// Transport open in progress.
    Connecting,
    /// Transport open, ready for traffic.
    Connected,
    /// Caller-initiated shutdown in progress.
    Closing,
    /// Transport lost or connect failed, not caller-initiated.
    Failed,
}

impl ConnectionState {
    /// States from which a fresh connect attempt may start.
    #[must_use]
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holder for the current state. Callers serialize access through the
/// engine's lock; [`StateCell::set`] reports whether anything changed.
#[derive(Debug)]
pub(crate) struct StateCell {
    current: ConnectionState,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self { current: ConnectionState::Closed }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.current
    }

    /// Move to `next`. Returns `Some((previous, next))` on a material change,
    /// `None` when `next` equals the current state.
    pub(crate) fn set(&mut self, next: ConnectionState) -> Option<(ConnectionState, ConnectionState)> {
        let previous = self.current;
        if previous == next {
            return None;
        }
        self.current = next;
        Some((previous, next))
    }
}
