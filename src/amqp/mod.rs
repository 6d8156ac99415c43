// ============================================================================
// RabbitMQ
// ============================================================================
//
// - connection.rs - BrokerConnection and its reconnect state machine
// - topology.rs   - queue / dead-letter declarations
// - metadata.rs   - redelivery count and requeue headers
// - consumer.rs   - subscription loop and handler tasks
//
// ============================================================================

pub mod connection;
pub mod consumer;
pub mod metadata;
pub mod topology;

pub use connection::{BrokerConnection, ConnectionState};
pub use consumer::QueueConsumer;
pub use metadata::{redelivery_count, requeue_headers};
