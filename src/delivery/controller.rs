// ============================================================================
// Delivery Controller
// ============================================================================
//
// Drives one broker message through
//
//   Received -> Validating -> Forwarding -> {Delivered|Rejected|Exhausted|Requeued}
//
// and settles it:
//
//   Delivered            -> ack
//   Rejected, Exhausted  -> nack(requeue=false), plus a `dlq` log record
//   Requeued             -> back onto the queue with redelivery_count + 1
//
// Retryable gateway failures are retried in-process with backoff until
// max_attempts is reached. A wait longer than the in-process ceiling hands
// the message back to the broker instead, unless the broker has already
// redelivered it max_redeliveries times.
//
// ============================================================================

use crate::delivery::attempt::DeliveryAttempt;
use crate::delivery::backoff::BackoffPolicy;
use crate::delivery::dlq::{payload_excerpt, DeadLetterRecord};
use crate::delivery::state::{DeliveryState, Disposition};
use crate::error::ListenerResult;
use crate::gateway::{EventForwarder, ForwardOutcome};
use crate::health::HealthReporter;
use crate::schema::{decode, validate};
use async_trait::async_trait;
use std::time::Duration;
use submission_config::RetryConfig;
use submission_metrics::{
    MESSAGES_DEAD_LETTERED_TOTAL, MESSAGES_DELIVERED_TOTAL, MESSAGES_IN_FLIGHT,
    MESSAGES_RECEIVED_TOTAL, MESSAGES_REJECTED_TOTAL, MESSAGES_REQUEUED_TOTAL,
};
use submission_types::SubmissionEvent;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_PAYLOAD_EXCERPT_BYTES: usize = 512;

/// A broker message as seen by the controller
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
    /// How many times the broker has already delivered this message
    pub redelivery_count: u32,
}

impl InboundMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            delivery_tag: 0,
            redelivery_count: 0,
        }
    }

    pub fn with_delivery_tag(mut self, delivery_tag: u64) -> Self {
        self.delivery_tag = delivery_tag;
        self
    }

    pub fn with_redelivery_count(mut self, redelivery_count: u32) -> Self {
        self.redelivery_count = redelivery_count;
        self
    }
}

/// Final result of processing one message
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub state: DeliveryState,
    pub disposition: Disposition,
    pub artifact_id: Option<Uuid>,
    /// Gateway calls made
    pub attempts: u32,
    /// Waits slept between attempts, in order
    pub delays: Vec<Duration>,
    /// Why the message did not reach Delivered
    pub cause: Option<String>,
}

/// Broker-side settlement of a message
#[async_trait]
pub trait DeliverySettler: Send + Sync {
    async fn ack(&self) -> ListenerResult<()>;
    async fn dead_letter(&self) -> ListenerResult<()>;
    /// Hand the message back so a later delivery sees a higher redelivery count
    async fn requeue(&self) -> ListenerResult<()>;
}

pub struct DeliveryController<F> {
    forwarder: F,
    policy: BackoffPolicy,
    max_attempts: u32,
    in_process_ceiling: Duration,
    max_redeliveries: u32,
    payload_excerpt_bytes: usize,
    health: HealthReporter,
}

/// State tracker for one message
struct Run {
    state: DeliveryState,
    artifact_id: Option<Uuid>,
    attempt: DeliveryAttempt,
    reason: &'static str,
    cause: Option<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: DeliveryState::Received,
            artifact_id: None,
            attempt: DeliveryAttempt::new(),
            reason: "",
            cause: None,
        }
    }

    fn advance(&mut self, next: DeliveryState) -> ListenerResult<()> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    fn finish(&mut self, next: DeliveryState, reason: &'static str, cause: String) -> ListenerResult<()> {
        self.advance(next)?;
        self.reason = reason;
        self.cause = Some(cause);
        Ok(())
    }
}

impl<F: EventForwarder> DeliveryController<F> {
    pub fn new(forwarder: F, retry: &RetryConfig, health: HealthReporter) -> Self {
        Self {
            forwarder,
            policy: BackoffPolicy::from_retry_config(retry),
            max_attempts: retry.max_attempts.max(1),
            in_process_ceiling: retry.in_process_ceiling(),
            max_redeliveries: retry.max_redeliveries,
            payload_excerpt_bytes: DEFAULT_PAYLOAD_EXCERPT_BYTES,
            health,
        }
    }

    pub fn with_payload_excerpt_bytes(mut self, bytes: usize) -> Self {
        self.payload_excerpt_bytes = bytes;
        self
    }

    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    /// Process a message and settle it with the broker
    pub async fn handle_delivery<S>(&self, message: &InboundMessage, settler: &S) -> DeliveryReport
    where
        S: DeliverySettler + ?Sized,
    {
        MESSAGES_IN_FLIGHT.inc();
        let _in_flight = InFlightGuard;

        let report = self.process(message).await;

        let settled = match report.disposition {
            Disposition::Ack => settler.ack().await,
            Disposition::DeadLetter => settler.dead_letter().await,
            Disposition::Requeue => settler.requeue().await,
        };
        if let Err(e) = settled {
            // The broker keeps the message unacknowledged and redelivers it
            warn!(
                delivery_tag = message.delivery_tag,
                disposition = ?report.disposition,
                error = %e,
                "Failed to settle message with broker"
            );
        }

        report
    }

    /// Run the state machine for one message without settling it
    pub async fn process(&self, message: &InboundMessage) -> DeliveryReport {
        MESSAGES_RECEIVED_TOTAL.inc();

        let mut run = Run::new();
        if let Err(e) = self.drive(message, &mut run).await {
            // Only an illegal transition can land here
            error!(
                delivery_tag = message.delivery_tag,
                error = %e,
                error_code = e.error_code(),
                "Delivery state machine violated, rejecting message"
            );
            run.state = DeliveryState::Rejected;
            run.reason = "illegal_transition";
            run.cause = Some(e.to_string());
            MESSAGES_REJECTED_TOTAL
                .with_label_values(&["illegal_transition"])
                .inc();
        }

        self.conclude(message, run)
    }

    async fn drive(&self, message: &InboundMessage, run: &mut Run) -> ListenerResult<()> {
        run.advance(DeliveryState::Validating)?;

        let payload = match validate(&message.payload) {
            Ok(payload) => payload,
            Err(violation) => {
                warn!(
                    delivery_tag = message.delivery_tag,
                    violation = violation.code(),
                    error = %violation,
                    payload = %payload_excerpt(&message.payload, self.payload_excerpt_bytes),
                    "Rejecting message that violates artifact.submitted.v1"
                );
                MESSAGES_REJECTED_TOTAL
                    .with_label_values(&["schema_violation"])
                    .inc();
                return run.finish(DeliveryState::Rejected, "schema_violation", violation.to_string());
            }
        };

        let event = match decode(&payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    delivery_tag = message.delivery_tag,
                    artifact_id = payload.artifact_id(),
                    error = %e,
                    payload = %payload_excerpt(&message.payload, self.payload_excerpt_bytes),
                    "Validated payload failed to decode"
                );
                MESSAGES_REJECTED_TOTAL
                    .with_label_values(&["decode_error"])
                    .inc();
                return run.finish(DeliveryState::Rejected, "decode_error", e.to_string());
            }
        };
        run.artifact_id = Some(event.uuid());

        run.advance(DeliveryState::Forwarding)?;
        self.forward_with_retry(&event, message, run).await
    }

    async fn forward_with_retry(
        &self,
        event: &SubmissionEvent,
        message: &InboundMessage,
        run: &mut Run,
    ) -> ListenerResult<()> {
        loop {
            let attempt = run.attempt.begin();

            let (cause, retry_after) = match self.forwarder.forward(event).await {
                ForwardOutcome::Delivered => {
                    self.health.record_delivery();
                    info!(
                        artifact_id = %event.artifact_id,
                        state = %event.submission_state,
                        attempt,
                        "Submission event delivered"
                    );
                    return run.advance(DeliveryState::Delivered);
                }
                ForwardOutcome::PermanentFailure { cause } => {
                    let detail = cause.to_string();
                    run.attempt.record_failure(cause);
                    return run.finish(DeliveryState::Exhausted, "permanent_failure", detail);
                }
                ForwardOutcome::RetryableFailure { cause, retry_after } => (cause, retry_after),
            };

            self.health.record_retryable_failure();
            let detail = cause.to_string();
            run.attempt.record_failure(cause);

            if attempt >= self.max_attempts {
                return run.finish(
                    DeliveryState::Exhausted,
                    "max_attempts",
                    format!("{} (after {} attempts)", detail, attempt),
                );
            }

            let delay = self.next_delay(attempt, retry_after);
            if delay > self.in_process_ceiling {
                if message.redelivery_count >= self.max_redeliveries {
                    return run.finish(
                        DeliveryState::Exhausted,
                        "max_redeliveries",
                        format!(
                            "{} (redelivered {} times)",
                            detail, message.redelivery_count
                        ),
                    );
                }
                info!(
                    artifact_id = %event.artifact_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    redelivery_count = message.redelivery_count,
                    "Backoff exceeds in-process ceiling, returning message to broker"
                );
                return run.finish(DeliveryState::Requeued, "requeued", detail);
            }

            run.advance(DeliveryState::Forwarding)?;
            warn!(
                artifact_id = %event.artifact_id,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                cause = %detail,
                "Forward failed, retrying"
            );
            tokio::time::sleep(delay).await;
            run.attempt.record_delay(delay);
        }
    }

    /// Backoff for `attempt`, raised to the server's Retry-After hint
    fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = {
            let mut rng = rand::thread_rng();
            self.policy.jittered_delay(attempt, &mut rng)
        };
        match retry_after {
            Some(hint) => backoff.max(hint),
            None => backoff,
        }
    }

    fn conclude(&self, message: &InboundMessage, run: Run) -> DeliveryReport {
        let disposition = run.state.disposition().unwrap_or(Disposition::DeadLetter);

        match disposition {
            Disposition::Ack => {
                MESSAGES_DELIVERED_TOTAL.inc();
            }
            Disposition::Requeue => {
                MESSAGES_REQUEUED_TOTAL.inc();
            }
            Disposition::DeadLetter => {
                let state_label = match run.state {
                    DeliveryState::Exhausted => "exhausted",
                    _ => "rejected",
                };
                MESSAGES_DEAD_LETTERED_TOTAL
                    .with_label_values(&[state_label])
                    .inc();

                let mut record = DeadLetterRecord::new(
                    run.state,
                    run.reason,
                    run.cause.clone().unwrap_or_default(),
                    message.delivery_tag,
                )
                .attempts(run.attempt.count(), message.redelivery_count)
                .history(&run.attempt)
                .payload(&message.payload, self.payload_excerpt_bytes);
                if let Some(id) = run.artifact_id {
                    record = record.artifact_id(id.to_string());
                }
                record.emit();
            }
        }

        debug!(
            delivery_tag = message.delivery_tag,
            state = %run.state,
            attempts = run.attempt.count(),
            "Message processing finished"
        );

        DeliveryReport {
            state: run.state,
            disposition,
            artifact_id: run.artifact_id,
            attempts: run.attempt.count(),
            cause: run.cause,
            delays: run.attempt.into_delays(),
        }
    }
}

struct InFlightGuard;

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        MESSAGES_IN_FLIGHT.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FailureCause;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysRetryable {
        calls: AtomicU32,
        retry_after: Option<Duration>,
    }

    #[async_trait]
    impl EventForwarder for AlwaysRetryable {
        async fn forward(&self, _event: &SubmissionEvent) -> ForwardOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ForwardOutcome::RetryableFailure {
                cause: FailureCause::Status {
                    code: 503,
                    body: String::new(),
                },
                retry_after: self.retry_after,
            }
        }
    }

    const PENDING: &[u8] = br#"{"artifactId":"6a4e924f-fde0-4460-93c5-03bfb8ed7980","submissionState":"PENDING","submittedAt":"2023-12-07T15:30:00Z","version":"v1"}"#;

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ratio: 0.0,
            in_process_ceiling_ms: 5_000,
            max_redeliveries: 3,
        }
    }

    fn controller(forwarder: AlwaysRetryable, retry: RetryConfig) -> DeliveryController<AlwaysRetryable> {
        DeliveryController::new(forwarder, &retry, HealthReporter::new("q", "http://gw", 30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_raises_delay() {
        let c = controller(
            AlwaysRetryable {
                calls: AtomicU32::new(0),
                retry_after: Some(Duration::from_secs(2)),
            },
            retry(2),
        );
        let report = c.process(&InboundMessage::new(PENDING)).await;
        assert_eq!(report.state, DeliveryState::Exhausted);
        assert_eq!(report.delays, vec![Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_above_ceiling_requeues() {
        let c = controller(
            AlwaysRetryable {
                calls: AtomicU32::new(0),
                retry_after: Some(Duration::from_secs(60)),
            },
            retry(5),
        );
        let report = c.process(&InboundMessage::new(PENDING)).await;
        assert_eq!(report.state, DeliveryState::Requeued);
        assert_eq!(report.disposition, Disposition::Requeue);
        assert_eq!(report.attempts, 1);
        assert!(report.delays.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_limit_turns_requeue_into_dead_letter() {
        let c = controller(
            AlwaysRetryable {
                calls: AtomicU32::new(0),
                retry_after: Some(Duration::from_secs(60)),
            },
            retry(5),
        );
        let message = InboundMessage::new(PENDING).with_redelivery_count(3);
        let report = c.process(&message).await;
        assert_eq!(report.state, DeliveryState::Exhausted);
        assert_eq!(report.disposition, Disposition::DeadLetter);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_streak_reported_to_health() {
        let health = HealthReporter::new("q", "http://gw", 30);
        let c = DeliveryController::new(
            AlwaysRetryable {
                calls: AtomicU32::new(0),
                retry_after: None,
            },
            &retry(3),
            health.clone(),
        );
        c.process(&InboundMessage::new(PENDING)).await;
        assert_eq!(health.retry_streak(), 3);
        assert!(health.is_live());
        assert_eq!(c.forwarder().calls.load(Ordering::SeqCst), 3);
    }
}
