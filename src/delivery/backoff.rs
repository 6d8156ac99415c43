// ============================================================================
// Backoff
// ============================================================================
//
// delay(n) = min(base * 2^(n-1), max)          n = 1, 2, ...
// jitter   = delay + U[0, ratio) * delay, clamped to max
//
// With ratio <= 1 a jittered delay never exceeds the next un-jittered one,
// so successive jittered delays are non-decreasing.
//
// ============================================================================

use rand::Rng;
use std::time::Duration;
use submission_config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            base: base.min(max),
            max,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn from_retry_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.jitter_ratio)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay after the `attempt`-th failure (1-based). Pure.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Add jitter drawn from `rng`
    pub fn with_jitter<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        if self.jitter_ratio == 0.0 || delay.is_zero() {
            return delay.min(self.max);
        }
        let spread = delay.mul_f64(self.jitter_ratio);
        let extra = spread.mul_f64(rng.gen_range(0.0..1.0));
        delay.saturating_add(extra).min(self.max)
    }

    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.with_jitter(self.delay(attempt), rng)
    }
}
