//! Reconnection backoff: exponential, capped, with bounded random jitter.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    min: Duration,
    max: Duration,
    jitter: Duration,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration, jitter: Duration) -> Self {
        Self { min, max, jitter, next: min }
    }

    /// Return the next delay plus a random jitter in `[0, jitter)` and double
    /// the base for the following attempt, capped at the maximum.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let jitter = random_jitter(self.jitter);
        self.next_delay_with(jitter)
    }

    /// Deterministic variant of [`Backoff::next_delay`] with caller-chosen jitter.
    pub(crate) fn next_delay_with(&mut self, jitter: Duration) -> Duration {
        let base = self.next;
        self.next = base.saturating_mul(2).min(self.max);
        base + jitter
    }

    /// A successful connection starts the next failure cycle from the minimum.
    pub(crate) fn reset(&mut self) {
        self.next = self.min;
    }
}

fn random_jitter(bound: Duration) -> Duration {
    let bound_micros = u64::try_from(bound.as_micros()).unwrap_or(u64::MAX);
    if bound_micros == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..bound_micros))
}
