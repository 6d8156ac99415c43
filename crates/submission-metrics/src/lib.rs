//! Prometheus metrics for the submission listener
//!
//! All counters are process-wide and safe to increment from concurrent
//! message handlers:
//! - Message outcomes (received, delivered, rejected, dead-lettered, requeued)
//! - Gateway forward attempts and latency
//! - Broker connection health

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder, opts,
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
};

// ============================================================================
// Message Metrics
// ============================================================================

pub static MESSAGES_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "submission_messages_received_total",
        "Messages received from the artifact.submitted queue"
    ))
    .expect("Failed to register MESSAGES_RECEIVED_TOTAL metric")
});

pub static MESSAGES_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "submission_messages_delivered_total",
        "Messages forwarded to the gateway and acknowledged"
    ))
    .expect("Failed to register MESSAGES_DELIVERED_TOTAL metric")
});

/// Messages rejected before forwarding, by reason (schema_violation, decode_error)
pub static MESSAGES_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "submission_messages_rejected_total",
            "Messages rejected before forwarding"
        ),
        &["reason"]
    )
    .expect("Failed to register MESSAGES_REJECTED_TOTAL metric")
});

/// Messages routed to the dead-letter path, by terminal state
pub static MESSAGES_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "submission_messages_dead_lettered_total",
            "Messages nacked without requeue"
        ),
        &["state"]
    )
    .expect("Failed to register MESSAGES_DEAD_LETTERED_TOTAL metric")
});

pub static MESSAGES_REQUEUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "submission_messages_requeued_total",
        "Messages returned to the broker for redelivery"
    ))
    .expect("Failed to register MESSAGES_REQUEUED_TOTAL metric")
});

pub static MESSAGES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "submission_messages_in_flight",
        "Messages currently being handled"
    ))
    .expect("Failed to register MESSAGES_IN_FLIGHT metric")
});

// ============================================================================
// Gateway Metrics
// ============================================================================

/// Forward attempts by outcome (delivered, retryable, permanent)
pub static FORWARD_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "submission_forward_attempts_total",
            "Gateway forward attempts"
        ),
        &["outcome"]
    )
    .expect("Failed to register FORWARD_ATTEMPTS_TOTAL metric")
});

pub static FORWARD_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "submission_forward_latency_seconds",
        "Gateway forward latency in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register FORWARD_LATENCY_SECONDS metric")
});

// ============================================================================
// Broker Metrics
// ============================================================================

pub static BROKER_RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "submission_broker_reconnects_total",
        "Broker connection attempts after the first"
    ))
    .expect("Failed to register BROKER_RECONNECTS_TOTAL metric")
});

pub static BROKER_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "submission_broker_connected",
        "1 while subscribed to the queue, 0 otherwise"
    ))
    .expect("Failed to register BROKER_CONNECTED metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
