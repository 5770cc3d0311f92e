//! Connection metrics.
//!
//! DESIGN
//! ======
//! Counters are monotonic atomics updated by the engine on the hot path with
//! relaxed ordering; callers only ever see a copied [`MetricsSnapshot`].
//! Nothing here resets for the lifetime of the client.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::state::ConnectionState;

#[derive(Debug, Default)]
pub(crate) struct Metrics {
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    events_sent: AtomicU64,
    events_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    protocol_errors: AtomicU64,
    timeouts: AtomicU64,
    late_responses: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeats_received: AtomicU64,
    reconnect_attempts: AtomicU64,
    /// Last observed round-trip time in microseconds; `u64::MAX` = never observed.
    last_rtt_micros: AtomicU64,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self { last_rtt_micros: AtomicU64::new(u64::MAX), ..Self::default() }
    }

    pub(crate) fn record_frame_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(as_u64(bytes), Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(as_u64(bytes), Ordering::Relaxed);
    }

    pub(crate) fn record_request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_received(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late_response(&self) {
        self.late_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rtt(&self, rtt: Duration) {
        let micros = u64::try_from(rtt.as_micros()).unwrap_or(u64::MAX - 1);
        self.last_rtt_micros.store(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_received(&self, at: Instant) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(at);
    }

    pub(crate) fn snapshot(&self, state: ConnectionState, pending_count: usize) -> MetricsSnapshot {
        let last_rtt_micros = match self.last_rtt_micros.load(Ordering::Relaxed) {
            u64::MAX => None,
            micros => Some(micros),
        };
        let last_heartbeat_age_ms = self
            .last_heartbeat
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX));

        MetricsSnapshot {
            state,
            pending_count,
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            last_rtt_micros,
            last_heartbeat_age_ms,
        }
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Point-in-time copy of the connection metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub state: ConnectionState,
    pub pending_count: usize,
    pub requests_sent: u64,
    pub responses_received: u64,
    pub events_sent: u64,
    pub events_received: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub protocol_errors: u64,
    pub timeouts: u64,
    /// Responses dropped because no request was pending for their id.
    pub late_responses: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
    pub reconnect_attempts: u64,
    /// Round-trip time of the most recently completed request.
    pub last_rtt_micros: Option<u64>,
    /// Milliseconds since the last heartbeat arrived from the peer.
    pub last_heartbeat_age_ms: Option<u64>,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt_micros.map(Duration::from_micros)
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
