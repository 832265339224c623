//! Exponential backoff with jitter for connector retries (spec.md 4.8): base
//! 2s, cap 60s, overall 10-minute budget before the operation escalates to
//! `NeedsOperatorAttention`.

use std::time::Duration;

use rand_core::{OsRng, RngCore};

pub const BASE_DELAY: Duration = Duration::from_secs(2);
pub const MAX_DELAY: Duration = Duration::from_secs(60);
pub const BUDGET: Duration = Duration::from_secs(10 * 60);

/// Tracks the elapsed retry time for one connector operation so the caller
/// can tell when the backoff budget is exhausted.
pub struct Backoff {
    attempt: u32,
    elapsed: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns `None` once the 10-minute budget has been exhausted;
    /// otherwise returns the delay to wait before the next attempt and
    /// advances the internal counters.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.elapsed >= BUDGET {
            return None;
        }
        let exp = BASE_DELAY.saturating_mul(1 << self.attempt.min(16));
        let capped = exp.min(MAX_DELAY);
        let jitter_ms = (OsRng.next_u32() % (capped.as_millis() as u32 + 1)) as u64;
        let delay = Duration::from_millis(capped.as_millis() as u64 / 2 + jitter_ms / 2);
        self.attempt += 1;
        self.elapsed += delay;
        Some(delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_capped_and_budget_eventually_exhausts() {
        let mut backoff = Backoff::new();
        let mut count = 0;
        while let Some(delay) = backoff.next_delay() {
            assert!(delay <= MAX_DELAY);
            count += 1;
            assert!(count < 10_000, "backoff never exhausted its budget");
        }
        assert!(count > 0);
    }
}
