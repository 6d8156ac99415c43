// ============================================================================
// RabbitMQ Configuration
// ============================================================================

use crate::constants::*;
use crate::{env_opt, env_parse, env_string};
use std::time::Duration;

/// Broker connection and subscription settings
#[derive(Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Queue carrying artifact.submitted messages
    pub queue: String,
    /// Max unacknowledged messages held by this consumer, and max concurrent handlers
    pub prefetch: u16,
    pub heartbeat_secs: u16,
    /// When set, the listener declares this exchange plus a bound dead-letter
    /// queue and attaches them to the main queue
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_queue: String,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Consecutive failed connection attempts after which the process reports not-live
    pub max_connect_failures: u32,
}

impl AmqpConfig {
    pub(crate) fn from_env() -> Self {
        let queue = env_string("RABBITMQ_QUEUE", DEFAULT_RABBITMQ_QUEUE);
        let dead_letter_queue =
            env_opt("RABBITMQ_DEAD_LETTER_QUEUE").unwrap_or_else(|| format!("{}.dlq", queue));

        Self {
            host: env_string("RABBITMQ_HOST", DEFAULT_RABBITMQ_HOST),
            port: env_parse("RABBITMQ_PORT", DEFAULT_RABBITMQ_PORT),
            username: env_string("RABBITMQ_USER", DEFAULT_RABBITMQ_USER),
            password: env_string("RABBITMQ_PASS", DEFAULT_RABBITMQ_PASS),
            vhost: env_string("RABBITMQ_VHOST", DEFAULT_RABBITMQ_VHOST),
            queue,
            prefetch: env_parse("RABBITMQ_PREFETCH", DEFAULT_PREFETCH),
            heartbeat_secs: env_parse("RABBITMQ_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS),
            dead_letter_exchange: env_opt("RABBITMQ_DEAD_LETTER_EXCHANGE"),
            dead_letter_queue,
            reconnect_base_ms: env_parse("RABBITMQ_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS),
            reconnect_max_ms: env_parse("RABBITMQ_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS),
            max_connect_failures: env_parse(
                "RABBITMQ_MAX_CONNECT_FAILURES",
                DEFAULT_MAX_CONNECT_FAILURES,
            ),
        }
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    /// Broker address with the password masked, for logs
    pub fn display_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.vhost.trim_start_matches('/')
        )
    }
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RABBITMQ_HOST.to_string(),
            port: DEFAULT_RABBITMQ_PORT,
            username: DEFAULT_RABBITMQ_USER.to_string(),
            password: DEFAULT_RABBITMQ_PASS.to_string(),
            vhost: DEFAULT_RABBITMQ_VHOST.to_string(),
            queue: DEFAULT_RABBITMQ_QUEUE.to_string(),
            prefetch: DEFAULT_PREFETCH,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            dead_letter_exchange: None,
            dead_letter_queue: format!("{}.dlq", DEFAULT_RABBITMQ_QUEUE),
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
            max_connect_failures: DEFAULT_MAX_CONNECT_FAILURES,
        }
    }
}

impl std::fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("uri", &self.display_uri())
            .field("queue", &self.queue)
            .field("prefetch", &self.prefetch)
            .field("heartbeat_secs", &self.heartbeat_secs)
            .field("dead_letter_exchange", &self.dead_letter_exchange)
            .field("dead_letter_queue", &self.dead_letter_queue)
            .field("reconnect_base_ms", &self.reconnect_base_ms)
            .field("reconnect_max_ms", &self.reconnect_max_ms)
            .field("max_connect_failures", &self.max_connect_failures)
            .finish()
    }
}
