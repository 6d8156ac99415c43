// ============================================================================
// Retry Configuration
// ============================================================================

use crate::constants::*;
use crate::env_parse;
use std::time::Duration;

/// Backoff policy for retryable gateway failures
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Forward attempts within one handling cycle (first attempt included)
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the computed delay added as random jitter, in [0, 1]
    pub jitter_ratio: f64,
    /// Waits longer than this are not slept in-process; the message goes back
    /// to the broker instead
    pub in_process_ceiling_ms: u64,
    /// Broker redeliveries tolerated before a requeue becomes a dead-letter
    pub max_redeliveries: u32,
}

impl RetryConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_attempts: env_parse("RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS),
            base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS),
            jitter_ratio: env_parse("RETRY_JITTER_RATIO", DEFAULT_RETRY_JITTER_RATIO),
            in_process_ceiling_ms: env_parse(
                "RETRY_IN_PROCESS_CEILING_MS",
                DEFAULT_RETRY_IN_PROCESS_CEILING_MS,
            ),
            max_redeliveries: env_parse("RETRY_MAX_REDELIVERIES", DEFAULT_RETRY_MAX_REDELIVERIES),
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn in_process_ceiling(&self) -> Duration {
        Duration::from_millis(self.in_process_ceiling_ms)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.base_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "RETRY_BASE_DELAY_MS ({}) must not exceed RETRY_MAX_DELAY_MS ({})",
                self.base_delay_ms,
                self.max_delay_ms
            );
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            anyhow::bail!(
                "RETRY_JITTER_RATIO must be within [0, 1], got {}",
                self.jitter_ratio
            );
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            jitter_ratio: DEFAULT_RETRY_JITTER_RATIO,
            in_process_ceiling_ms: DEFAULT_RETRY_IN_PROCESS_CEILING_MS,
            max_redeliveries: DEFAULT_RETRY_MAX_REDELIVERIES,
        }
    }
}
