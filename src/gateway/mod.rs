// ============================================================================
// API Gateway Client
// ============================================================================
//
// Forwards decoded submission events to the API gateway and classifies each
// call as Delivered, RetryableFailure or PermanentFailure. Retrying is the
// delivery controller's job; the client makes exactly one HTTP call per
// forward().
//
// ============================================================================

pub mod client;
pub mod outcome;

pub use client::GatewayClient;
pub use outcome::{FailureCause, ForwardOutcome};

use async_trait::async_trait;
use submission_types::SubmissionEvent;

/// Anything that can deliver an event downstream.
///
/// Implemented by [`GatewayClient`]; the delivery controller depends only on
/// this trait so it can be driven by stubs in tests.
#[async_trait]
pub trait EventForwarder: Send + Sync {
    async fn forward(&self, event: &SubmissionEvent) -> ForwardOutcome;
}
