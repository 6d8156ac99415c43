// ============================================================================
// Configuration Constants
// ============================================================================

// Broker
pub(crate) const DEFAULT_RABBITMQ_HOST: &str = "localhost";
pub(crate) const DEFAULT_RABBITMQ_PORT: u16 = 5672;
pub(crate) const DEFAULT_RABBITMQ_USER: &str = "user";
pub(crate) const DEFAULT_RABBITMQ_PASS: &str = "password";
pub(crate) const DEFAULT_RABBITMQ_VHOST: &str = "/";
pub(crate) const DEFAULT_RABBITMQ_QUEUE: &str = "artifact.submitted.queue";
pub(crate) const DEFAULT_PREFETCH: u16 = 1;
pub(crate) const DEFAULT_HEARTBEAT_SECS: u16 = 600;
pub(crate) const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub(crate) const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
// 30 attempts was the startup connect budget of the first listener
pub(crate) const DEFAULT_MAX_CONNECT_FAILURES: u32 = 30;

// Gateway
pub(crate) const DEFAULT_API_GATEWAY_URL: &str = "http://api-gateway:3000/api/artifacts";
pub(crate) const DEFAULT_API_GATEWAY_METHOD: &str = "PATCH";
pub(crate) const DEFAULT_API_GATEWAY_PATH_SUFFIX: &str = "/status";
pub(crate) const DEFAULT_API_GATEWAY_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_SERVICE_ROLE: &str = "submitter_listener";

// Retry
pub(crate) const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub(crate) const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;
pub(crate) const DEFAULT_RETRY_JITTER_RATIO: f64 = 0.2;
pub(crate) const DEFAULT_RETRY_IN_PROCESS_CEILING_MS: u64 = 10_000;
pub(crate) const DEFAULT_RETRY_MAX_REDELIVERIES: u32 = 10;

// Process
pub(crate) const DEFAULT_HEALTH_PORT: u16 = 8000;
pub(crate) const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
pub(crate) const DEFAULT_RUST_LOG: &str = "info";
pub(crate) const DEFAULT_PAYLOAD_EXCERPT_BYTES: usize = 512;
