use crate::gateway::FailureCause;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Forwarding history of one message within one handling cycle.
///
/// Lives only as long as the handler task; broker redeliveries start a fresh one.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAttempt {
    count: u32,
    first_attempt_at: Option<DateTime<Utc>>,
    last_failure: Option<FailureCause>,
    delays: Vec<Duration>,
}

impl DeliveryAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a gateway call; returns the 1-based attempt number
    pub fn begin(&mut self) -> u32 {
        if self.first_attempt_at.is_none() {
            self.first_attempt_at = Some(Utc::now());
        }
        self.count += 1;
        self.count
    }

    pub fn record_failure(&mut self, cause: FailureCause) {
        self.last_failure = Some(cause);
    }

    pub fn record_delay(&mut self, delay: Duration) {
        self.delays.push(delay);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn first_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.first_attempt_at
    }

    pub fn last_failure(&self) -> Option<&FailureCause> {
        self.last_failure.as_ref()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn into_delays(self) -> Vec<Duration> {
        self.delays
    }
}
