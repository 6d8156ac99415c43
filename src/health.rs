// ============================================================================
// Health Reporter
// ============================================================================
//
// Shared handle observed by the /health routes and written by the broker
// connection and the delivery controller. All state is atomic.
//
// - ready: subscribed to the queue and not shutting down
// - live:  the broker has not failed more than `max_connect_failures`
//          consecutive connection attempts. Gateway failures never affect
//          liveness.
//
// ============================================================================

use crate::amqp::ConnectionState;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use submission_config::Config;

pub const SERVICE_NAME: &str = "submission-listener";

#[derive(Clone)]
pub struct HealthReporter {
    inner: Arc<HealthInner>,
}

struct HealthInner {
    queue: String,
    api_gateway_url: String,
    max_connect_failures: u32,
    broker_state: AtomicU8,
    connect_failures: AtomicU32,
    retry_streak: AtomicU32,
    shutting_down: AtomicBool,
}

/// JSON body of GET /health
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
    pub ready: bool,
    pub live: bool,
    pub broker: &'static str,
    pub consecutive_connect_failures: u32,
    pub retry_streak: u32,
    pub queue: String,
    pub api_gateway_url: String,
}

impl HealthReporter {
    pub fn new(
        queue: impl Into<String>,
        api_gateway_url: impl Into<String>,
        max_connect_failures: u32,
    ) -> Self {
        Self {
            inner: Arc::new(HealthInner {
                queue: queue.into(),
                api_gateway_url: api_gateway_url.into(),
                max_connect_failures,
                broker_state: AtomicU8::new(ConnectionState::Disconnected as u8),
                connect_failures: AtomicU32::new(0),
                retry_streak: AtomicU32::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.amqp.queue.clone(),
            config.gateway.base_url.clone(),
            config.amqp.max_connect_failures,
        )
    }

    // ===== Broker connection =====

    pub fn set_broker_state(&self, state: ConnectionState) {
        self.inner.broker_state.store(state as u8, Ordering::SeqCst);
    }

    pub fn broker_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.broker_state.load(Ordering::SeqCst))
    }

    /// Returns the new consecutive failure count
    pub fn record_connect_failure(&self) -> u32 {
        self.inner.connect_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_connect_success(&self) {
        self.inner.connect_failures.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_connect_failures(&self) -> u32 {
        self.inner.connect_failures.load(Ordering::SeqCst)
    }

    // ===== Delivery =====

    pub fn record_retryable_failure(&self) {
        self.inner.retry_streak.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.inner.retry_streak.store(0, Ordering::Relaxed);
    }

    /// Retryable gateway failures since the last successful delivery
    pub fn retry_streak(&self) -> u32 {
        self.inner.retry_streak.load(Ordering::Relaxed)
    }

    // ===== Lifecycle =====

    pub fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.broker_state() == ConnectionState::Subscribed && !self.is_shutting_down()
    }

    pub fn is_live(&self) -> bool {
        self.consecutive_connect_failures() <= self.inner.max_connect_failures
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let ready = self.is_ready();
        let live = self.is_live();
        HealthSnapshot {
            status: if ready && live { "healthy" } else { "unhealthy" },
            service: SERVICE_NAME,
            timestamp: Utc::now().to_rfc3339(),
            ready,
            live,
            broker: self.broker_state().as_str(),
            consecutive_connect_failures: self.consecutive_connect_failures(),
            retry_streak: self.retry_streak(),
            queue: self.inner.queue.clone(),
            api_gateway_url: self.inner.api_gateway_url.clone(),
        }
    }
}
