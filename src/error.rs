use crate::delivery::DeliveryState;
use thiserror::Error;

pub type ListenerResult<T> = Result<T, ListenerError>;

/// Errors that escape a single message's pipeline or the process glue.
///
/// Per-message outcomes (schema violations, gateway failures) are not errors
/// at this level; they are terminal states of the delivery controller.
#[derive(Error, Debug)]
pub enum ListenerError {
    // ===== Broker Errors =====
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Broker connection closed")]
    ConnectionClosed,

    // ===== HTTP Errors =====
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Delivery Errors =====
    #[error("Illegal delivery state transition: {from} -> {to}")]
    IllegalTransition { from: DeliveryState, to: DeliveryState },

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ListenerError {
    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            ListenerError::Broker(_) => "BROKER_ERROR",
            ListenerError::ConnectionClosed => "CONNECTION_CLOSED",
            ListenerError::Http(_) => "HTTP_ERROR",
            ListenerError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            ListenerError::Config(_) => "CONFIG_ERROR",
            ListenerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the broker connection must be re-established after this error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ListenerError::Broker(_) | ListenerError::ConnectionClosed
        )
    }
}
