//! Exponential backoff with additive jitter.
//!
//! `delay(attempt) = 2^attempt * base + uniform(0, jitter)`

use rand::Rng;
use std::time::Duration;

/// Cap on the exponent so huge retry counts can't overflow.
const MAX_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Deterministic base, doubled per attempt (default: 1s).
    pub base: Duration,
    /// Upper bound of the random addend (default: 500ms).
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: Duration::from_millis(1000), jitter: Duration::from_millis(500) }
    }
}

impl Backoff {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// The non-random component for `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(1u32 << attempt.min(MAX_EXPONENT))
    }

    /// Full delay to wait after failed `attempt`, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { rand::rng().random_range(0..=jitter_ms) };
        self.base_delay(attempt).saturating_add(Duration::from_millis(jitter))
    }
}
