// ============================================================================
// Delivery
// ============================================================================
//
// Per-message pipeline between the queue consumer and the gateway client:
// - state.rs      - DeliveryState machine and broker dispositions
// - backoff.rs    - exponential backoff with jitter
// - attempt.rs    - forwarding history of one message
// - dlq.rs        - dead-letter log records
// - controller.rs - validate, decode, forward, retry, settle
//
// ============================================================================

pub mod attempt;
pub mod backoff;
pub mod controller;
pub mod dlq;
pub mod state;

pub use attempt::DeliveryAttempt;
pub use backoff::BackoffPolicy;
pub use controller::{DeliveryController, DeliveryReport, DeliverySettler, InboundMessage};
pub use dlq::{payload_excerpt, DeadLetterRecord};
pub use state::{DeliveryState, Disposition};
