// ============================================================================
// Submission Config - Centralized configuration management
// ============================================================================
//
// Loads the listener configuration from environment variables (and a local
// .env file when present) with defaults matching the deployed service.
//
// ============================================================================

mod amqp;
mod constants;
mod gateway;
mod logging;
mod retry;

pub use amqp::AmqpConfig;
pub use gateway::GatewayConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use retry::RetryConfig;

use anyhow::Result;
use constants::*;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for the submission listener
#[derive(Clone, Debug)]
pub struct Config {
    pub amqp: AmqpConfig,
    pub gateway: GatewayConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    /// Port of the /health and /metrics server
    pub health_port: u16,
    /// Time in-flight handlers get to finish after a shutdown signal
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            amqp: AmqpConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            retry: RetryConfig::from_env(),
            logging: LoggingConfig::from_env()?,
            health_port: env_parse("HEALTH_PORT", DEFAULT_HEALTH_PORT),
            shutdown_grace_secs: env_parse("SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS),
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject combinations the listener cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gateway.api_key.trim().is_empty() {
            anyhow::bail!("API_KEY must be set to the key provisioned for this service");
        }
        if !(self.gateway.base_url.starts_with("http://")
            || self.gateway.base_url.starts_with("https://"))
        {
            anyhow::bail!(
                "API_GATEWAY_URL must be an http(s) URL, got '{}'",
                self.gateway.base_url
            );
        }
        if self.gateway.method.is_empty()
            || !self.gateway.method.chars().all(|c| c.is_ascii_alphabetic())
        {
            anyhow::bail!("API_GATEWAY_METHOD '{}' is not an HTTP verb", self.gateway.method);
        }
        if self.gateway.timeout_secs == 0 {
            anyhow::bail!("API_GATEWAY_TIMEOUT_SECS must be greater than zero");
        }
        if self.amqp.prefetch == 0 {
            anyhow::bail!("RABBITMQ_PREFETCH must be at least 1");
        }
        if self.amqp.queue.is_empty() {
            anyhow::bail!("RABBITMQ_QUEUE must not be empty");
        }
        if self.amqp.reconnect_base_ms > self.amqp.reconnect_max_ms {
            anyhow::bail!("RABBITMQ_RECONNECT_BASE_MS must not exceed RABBITMQ_RECONNECT_MAX_MS");
        }
        self.retry.validate()?;
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// ============================================================================
// Environment helpers
// ============================================================================

pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when unset or unparsable
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
