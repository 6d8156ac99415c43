// ============================================================================
// Dead Letter Records
// ============================================================================
//
// Every message nacked without requeue is also written to the log under
// target "dlq", so it can be recovered even when the broker has no
// dead-letter exchange configured. Ops can filter on `target=dlq`.
//
// ============================================================================

use crate::delivery::attempt::DeliveryAttempt;
use crate::delivery::state::DeliveryState;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use submission_types::SCHEMA_NAME;
use tracing::error;

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterRecord {
    pub schema: &'static str,
    /// Absent when the payload never got far enough to yield one
    pub artifact_id: Option<String>,
    pub delivery_tag: u64,
    pub terminal_state: String,
    /// Stable reason code (`schema_violation`, `permanent_failure`, ...)
    pub reason: String,
    pub detail: String,
    pub attempts: u32,
    pub redelivery_count: u32,
    /// When the first gateway call of this handling cycle started
    pub first_attempt_at: Option<String>,
    pub last_failure: Option<String>,
    pub payload_excerpt: String,
    pub dead_lettered_at: i64,
}

impl DeadLetterRecord {
    pub fn new(
        state: DeliveryState,
        reason: &str,
        detail: impl Into<String>,
        delivery_tag: u64,
    ) -> Self {
        Self {
            schema: SCHEMA_NAME,
            artifact_id: None,
            delivery_tag,
            terminal_state: state.to_string(),
            reason: reason.to_string(),
            detail: detail.into(),
            attempts: 0,
            redelivery_count: 0,
            first_attempt_at: None,
            last_failure: None,
            payload_excerpt: String::new(),
            dead_lettered_at: Utc::now().timestamp(),
        }
    }

    pub fn artifact_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn attempts(mut self, attempts: u32, redelivery_count: u32) -> Self {
        self.attempts = attempts;
        self.redelivery_count = redelivery_count;
        self
    }

    /// Copy the forwarding history of the failed handling cycle
    pub fn history(mut self, attempt: &DeliveryAttempt) -> Self {
        self.attempts = attempt.count();
        self.first_attempt_at = attempt
            .first_attempt_at()
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));
        self.last_failure = attempt.last_failure().map(ToString::to_string);
        self
    }

    pub fn payload(mut self, raw: &[u8], max_bytes: usize) -> Self {
        self.payload_excerpt = payload_excerpt(raw, max_bytes);
        self
    }

    pub fn emit(&self) {
        error!(
            target: "dlq",
            artifact_id = self.artifact_id.as_deref().unwrap_or("-"),
            delivery_tag = self.delivery_tag,
            terminal_state = %self.terminal_state,
            reason = %self.reason,
            attempts = self.attempts,
            redelivery_count = self.redelivery_count,
            last_failure = self.last_failure.as_deref().unwrap_or("-"),
            record = %serde_json::to_string(self).unwrap_or_default(),
            "DLQ_MESSAGE: {}",
            self.detail
        );
    }
}

/// Lossy UTF-8 rendering of at most `max_bytes` of a payload
pub fn payload_excerpt(raw: &[u8], max_bytes: usize) -> String {
    if raw.len() <= max_bytes {
        return String::from_utf8_lossy(raw).into_owned();
    }
    let mut excerpt = String::from_utf8_lossy(&raw[..max_bytes]).into_owned();
    // A multi-byte sequence cut at the boundary decodes as U+FFFD
    if excerpt.ends_with('\u{FFFD}') {
        excerpt.pop();
    }
    format!("{}...({} bytes total)", excerpt, raw.len())
}
