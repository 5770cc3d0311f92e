//! Pending-request table.
//!
//! DESIGN
//! ======
//! Each outstanding request owns a oneshot completion and, once armed, the
//! abort handle of its timeout task. Every completion path (response,
//! timeout, close/drain) first *removes* the entry under the table lock, so
//! whichever path removes it wins and the others find nothing. A request is
//! therefore completed exactly once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::ClientError;

/// Successful RESPONSE delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub request_id: u64,
    pub kind: String,
    pub payload: Vec<u8>,
}

impl Response {
    /// Payload decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub(crate) type Completion = oneshot::Sender<Result<Response, ClientError>>;

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) kind: String,
    pub(crate) started: Instant,
    pub(crate) timeout: Duration,
    completion: Completion,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    pub(crate) fn new(kind: impl Into<String>, timeout: Duration, completion: Completion) -> Self {
        Self { kind: kind.into(), started: Instant::now(), timeout, completion, timer: None }
    }

    /// Cancel the timeout task (if armed) and deliver `result`. A caller that
    /// already dropped its receiver is ignored.
    pub(crate) fn complete(self, result: Result<Response, ClientError>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        let _ = self.completion.send(result);
    }

    /// Cancel the timeout task without delivering anything.
    pub(crate) fn discard(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingRequest>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert if absent. Hands the request back if the id is already taken.
    pub(crate) fn insert(&self, request_id: u64, request: PendingRequest) -> Result<(), PendingRequest> {
        match self.lock().entry(request_id) {
            Entry::Occupied(_) => Err(request),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Attach a timeout task to a still-pending request. Returns `false` (and
    /// aborts the task) when the request already completed.
    pub(crate) fn arm_timer(&self, request_id: u64, timer: AbortHandle) -> bool {
        if let Some(entry) = self.lock().get_mut(&request_id) {
            entry.timer = Some(timer);
            return true;
        }
        timer.abort();
        false
    }

    pub(crate) fn remove(&self, request_id: u64) -> Option<PendingRequest> {
        self.lock().remove(&request_id)
    }

    /// Remove and return every pending request.
    pub(crate) fn drain(&self) -> Vec<(u64, PendingRequest)> {
        self.lock().drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
