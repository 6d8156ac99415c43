#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use submission_config::RetryConfig;
use submission_listener::delivery::{DeliveryController, DeliverySettler, Disposition};
use submission_listener::error::ListenerResult;
use submission_listener::gateway::{EventForwarder, FailureCause, ForwardOutcome};
use submission_listener::health::HealthReporter;
use submission_types::SubmissionEvent;

pub const ARTIFACT_ID: &str = "6a4e924f-fde0-4460-93c5-03bfb8ed7980";

/// Forwarder that replays a script, then answers Delivered
pub struct ScriptedForwarder {
    script: Mutex<VecDeque<ForwardOutcome>>,
    calls: AtomicU32,
    seen: Mutex<Vec<SubmissionEvent>>,
}

impl ScriptedForwarder {
    pub fn new(script: impl IntoIterator<Item = ForwardOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn delivering() -> Self {
        Self::new([])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SubmissionEvent> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventForwarder for ScriptedForwarder {
    async fn forward(&self, event: &SubmissionEvent) -> ForwardOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(event.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ForwardOutcome::Delivered)
    }
}

/// Forwarder that never succeeds
pub struct FailingForwarder {
    outcome: ForwardOutcome,
    calls: AtomicU32,
}

impl FailingForwarder {
    pub fn retryable() -> Self {
        Self {
            outcome: server_error(),
            calls: AtomicU32::new(0),
        }
    }

    /// 503 with a Retry-After hint
    pub fn throttled(retry_after: Duration) -> Self {
        Self {
            outcome: ForwardOutcome::RetryableFailure {
                cause: FailureCause::Status {
                    code: 503,
                    body: String::new(),
                },
                retry_after: Some(retry_after),
            },
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventForwarder for FailingForwarder {
    async fn forward(&self, _event: &SubmissionEvent) -> ForwardOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Settler that records what the controller asked for
#[derive(Default)]
pub struct RecordingSettler {
    settled: Mutex<Vec<Disposition>>,
}

impl RecordingSettler {
    pub fn settled(&self) -> Vec<Disposition> {
        self.settled.lock().unwrap().clone()
    }

    fn push(&self, disposition: Disposition) {
        self.settled.lock().unwrap().push(disposition);
    }
}

#[async_trait]
impl DeliverySettler for RecordingSettler {
    async fn ack(&self) -> ListenerResult<()> {
        self.push(Disposition::Ack);
        Ok(())
    }

    async fn dead_letter(&self) -> ListenerResult<()> {
        self.push(Disposition::DeadLetter);
        Ok(())
    }

    async fn requeue(&self) -> ListenerResult<()> {
        self.push(Disposition::Requeue);
        Ok(())
    }
}

pub fn server_error() -> ForwardOutcome {
    ForwardOutcome::RetryableFailure {
        cause: FailureCause::Status {
            code: 503,
            body: "Service Unavailable".to_string(),
        },
        retry_after: None,
    }
}

pub fn bad_request() -> ForwardOutcome {
    ForwardOutcome::PermanentFailure {
        cause: FailureCause::Status {
            code: 400,
            body: "Bad Request".to_string(),
        },
    }
}

/// Deterministic retry policy: 100ms doubling to 1s, no jitter
pub fn retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter_ratio: 0.0,
        in_process_ceiling_ms: 10_000,
        max_redeliveries: 10,
    }
}

pub fn health() -> HealthReporter {
    HealthReporter::new("artifact.submitted.queue", "http://gw/api/artifacts", 30)
}

pub fn controller<F: EventForwarder>(forwarder: F, retry: RetryConfig) -> DeliveryController<F> {
    DeliveryController::new(forwarder, &retry, health())
}

pub fn pending_event() -> Value {
    json!({
        "artifactId": ARTIFACT_ID,
        "submissionState": "PENDING",
        "submittedAt": "2023-12-07T15:30:00.000Z",
        "version": "v1"
    })
}

pub fn success_event(tx_id: &str) -> Value {
    json!({
        "artifactId": ARTIFACT_ID,
        "submissionState": "SUCCESS",
        "submittedAt": "2023-12-07T15:30:00.000Z",
        "blockchainTxId": tx_id,
        "peerId": "peer0.org1.example.com",
        "version": "v1"
    })
}

pub fn to_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}
