//! Callback plumbing: exception handler, listener registry and the callback
//! execution context.
//!
//! DESIGN
//! ======
//! The read loop never runs user code. It snapshots the matching listeners
//! and submits one job per invocation to a [`CallbackExecutor`]. The default
//! [`SerialExecutor`] runs jobs one at a time on its own task, in submission
//! order, so events and state transitions are observed in the order they
//! happened. A panicking job is caught and logged; the executor keeps going.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::ClientError;
use crate::state::ConnectionState;

// =============================================================================
// EXCEPTION HANDLER
// =============================================================================

/// Receives every failure that is not returned directly to a caller, plus
/// remote errors and timeouts (which are also returned to their caller).
///
/// All methods default to structured `tracing` output.
pub trait ExceptionHandler: Send + Sync {
    fn on_connection_error(&self, err: &ClientError) {
        warn!(code = err.error_code(), error = %err, "ecws: connection error");
    }

    fn on_protocol_error(&self, err: &ClientError) {
        warn!(code = err.error_code(), error = %err, "ecws: protocol error");
    }

    fn on_remote_error(&self, err: &ClientError) {
        warn!(code = err.error_code(), error = %err, "ecws: remote error");
    }

    fn on_timeout(&self, err: &ClientError) {
        warn!(code = err.error_code(), error = %err, "ecws: request timed out");
    }
}

/// Exception handler that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {}

// =============================================================================
// EXECUTOR
// =============================================================================

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Execution context for listener and exception-handler callbacks.
pub trait CallbackExecutor: Send + Sync {
    /// Schedule `job`. Must not run it inline on the caller's stack.
    fn execute(&self, job: Job);
}

/// Runs jobs sequentially on a dedicated Tokio task.
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialExecutor {
    /// Spawn the executor task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("ecws: callback panicked; continuing with next callback");
                }
            }
        });
        Self { tx }
    }
}

impl CallbackExecutor for SerialExecutor {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("ecws: callback executor stopped; dropping callback");
        }
    }
}

// =============================================================================
// LISTENER REGISTRY
// =============================================================================

/// Handle returned by listener registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An EVENT frame as delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub payload: Vec<u8>,
}

pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;
pub type StateListener = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    by_kind: HashMap<String, Vec<(ListenerId, EventListener)>>,
    any: Vec<(ListenerId, EventListener)>,
    state: Vec<(ListenerId, StateListener)>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    inner: Mutex<Listeners>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn allocate(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_event(&self, kind: &str, listener: EventListener) -> ListenerId {
        let id = self.allocate();
        self.lock()
            .by_kind
            .entry(kind.to_owned())
            .or_default()
            .push((id, listener));
        id
    }

    pub(crate) fn add_any(&self, listener: EventListener) -> ListenerId {
        let id = self.allocate();
        self.lock().any.push((id, listener));
        id
    }

    pub(crate) fn add_state(&self, listener: StateListener) -> ListenerId {
        let id = self.allocate();
        self.lock().state.push((id, listener));
        id
    }

    /// Unregister a listener of any type. Returns `false` if it was unknown.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.any.len() + inner.state.len();
        inner.any.retain(|(lid, _)| *lid != id);
        inner.state.retain(|(lid, _)| *lid != id);
        let mut removed = before != inner.any.len() + inner.state.len();
        for listeners in inner.by_kind.values_mut() {
            let len = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            removed |= len != listeners.len();
        }
        inner.by_kind.retain(|_, listeners| !listeners.is_empty());
        removed
    }

    /// Listeners for `kind` followed by the catch-all listeners.
    pub(crate) fn event_listeners(&self, kind: &str) -> Vec<EventListener> {
        let inner = self.lock();
        inner
            .by_kind
            .get(kind)
            .into_iter()
            .flatten()
            .chain(inner.any.iter())
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn state_listeners(&self) -> Vec<StateListener> {
        self.lock()
            .state
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

#[cfg(test)]
#[path = "listeners_test.rs"]
mod tests;
