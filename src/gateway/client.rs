// ============================================================================
// Gateway Client
// ============================================================================
//
// One authenticated HTTP call per forward():
//
//   {method} {base_url}/{artifactId}{path_suffix}
//   X-API-Key: <api key>
//   X-Service-Role: <service role>
//   {"submissionState", "submittedAt", "blockchainTxId"?, "peerId"?}
//
// ============================================================================

use crate::error::{ListenerError, ListenerResult};
use crate::gateway::outcome::{classify_status, parse_retry_after, FailureCause, ForwardOutcome};
use crate::gateway::EventForwarder;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use submission_config::GatewayConfig;
use submission_metrics::{FORWARD_ATTEMPTS_TOTAL, FORWARD_LATENCY_SECONDS};
use submission_types::SubmissionEvent;
use tracing::{debug, info, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const SERVICE_ROLE_HEADER: &str = "X-Service-Role";

const USER_AGENT: &str = concat!("submission-listener/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt kept in a failure cause
const MAX_BODY_EXCERPT: usize = 512;

/// HTTP client for the API gateway artifact endpoint
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    method: Method,
    path_suffix: String,
    api_key: String,
    service_role: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> ListenerResult<Self> {
        let method = Method::from_bytes(config.method.as_bytes()).map_err(|_| {
            ListenerError::Config(format!("invalid gateway method '{}'", config.method))
        })?;

        // Connection pooling and keep-alive; the timeout bounds every call
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(USER_AGENT)
            .build()?;

        info!(
            base_url = %config.base_url,
            method = %method,
            service_role = %config.service_role,
            timeout_secs = config.timeout_secs,
            "Gateway client initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            method,
            path_suffix: config.path_suffix.clone(),
            api_key: config.api_key.clone(),
            service_role: config.service_role.clone(),
        })
    }

    /// Status endpoint for one artifact, with the id spelled as received
    pub fn endpoint_for(&self, event: &SubmissionEvent) -> String {
        format!("{}/{}{}", self.base_url, event.artifact_id, self.path_suffix)
    }

    /// JSON body sent to the gateway; optional fields are omitted when absent.
    /// `submittedAt` is passed through untouched since the gateway dedupes on it.
    pub fn request_body(event: &SubmissionEvent) -> Value {
        let mut body = json!({
            "submissionState": event.submission_state.as_str(),
            "submittedAt": event.submitted_at.as_str(),
        });
        if let Some(tx_id) = &event.blockchain_tx_id {
            body["blockchainTxId"] = json!(tx_id);
        }
        if let Some(peer_id) = &event.peer_id {
            body["peerId"] = json!(peer_id);
        }
        body
    }

    /// Send one request and classify the result
    pub async fn send(&self, event: &SubmissionEvent) -> ForwardOutcome {
        let url = self.endpoint_for(event);
        let started = Instant::now();

        debug!(
            artifact_id = %event.artifact_id,
            method = %self.method,
            url = %url,
            "Forwarding submission event"
        );

        let result = self
            .client
            .request(self.method.clone(), &url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(SERVICE_ROLE_HEADER, &self.service_role)
            .json(&Self::request_body(event))
            .send()
            .await;

        let outcome = match result {
            Ok(response) => {
                let code = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, chrono::Utc::now()));
                let body = if response.status().is_success() {
                    String::new()
                } else {
                    let mut text = response.text().await.unwrap_or_default();
                    truncate_utf8(&mut text, MAX_BODY_EXCERPT);
                    text
                };
                classify_status(code, retry_after, body)
            }
            Err(e) => classify_transport_error(&e),
        };

        FORWARD_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
        FORWARD_ATTEMPTS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();

        match &outcome {
            ForwardOutcome::Delivered => debug!(
                artifact_id = %event.artifact_id,
                state = %event.submission_state,
                "Gateway accepted submission update"
            ),
            ForwardOutcome::RetryableFailure { cause, .. } => warn!(
                artifact_id = %event.artifact_id,
                cause = %cause,
                "Gateway call failed (retryable)"
            ),
            ForwardOutcome::PermanentFailure { cause } => warn!(
                artifact_id = %event.artifact_id,
                cause = %cause,
                "Gateway rejected submission update"
            ),
        }

        outcome
    }
}

#[async_trait]
impl EventForwarder for GatewayClient {
    async fn forward(&self, event: &SubmissionEvent) -> ForwardOutcome {
        self.send(event).await
    }
}

fn classify_transport_error(e: &reqwest::Error) -> ForwardOutcome {
    if e.is_builder() {
        return ForwardOutcome::PermanentFailure {
            cause: FailureCause::InvalidRequest(e.to_string()),
        };
    }

    let cause = if e.is_timeout() {
        FailureCause::Timeout
    } else if e.is_connect() {
        FailureCause::Connect(e.to_string())
    } else {
        FailureCause::Network(e.to_string())
    };

    ForwardOutcome::RetryableFailure {
        cause,
        retry_after: None,
    }
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
