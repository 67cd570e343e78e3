use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Capped-exponential reconnect backoff with deterministic jitter.
///
/// `delay(attempt) = min(base * 2^attempt, max)`, shortened by up to 25%
/// of jitter drawn from an RNG seeded by `(seed, attempt)`. The same policy
/// always produces the same sequence, so reconnect timing is testable; the
/// raw sequence is non-decreasing and bounded above by `max`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    seed: u64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, seed: u64) -> Self {
        Self { base, max, seed }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = (self.base.as_millis() as u64).max(1);
        let max_ms = (self.max.as_millis() as u64).max(base_ms);

        let shift = attempt.min(32);
        let raw_ms = base_ms
            .checked_shl(shift)
            .unwrap_or(u64::MAX)
            .min(max_ms);

        let mut rng = SmallRng::seed_from_u64(
            self.seed ^ (u64::from(attempt)).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        let jitter_fraction: f64 = rng.gen_range(0.0..0.25);
        let jitter_ms = (raw_ms as f64 * jitter_fraction) as u64;

        Duration::from_millis(raw_ms - jitter_ms)
    }
}
