// ============================================================================
// Queue Topology
// ============================================================================
//
// Without a dead-letter exchange: the queue is declared durable with no
// arguments.
//
// With RABBITMQ_DEAD_LETTER_EXCHANGE set:
//
//   <dlx> (direct, durable) --[routing key = <dlq>]--> <dlq> (durable)
//   <queue> (durable, x-dead-letter-exchange=<dlx>,
//                     x-dead-letter-routing-key=<dlq>)
//
// A queue that already exists with different arguments makes the declare
// fail with PRECONDITION_FAILED; that surfaces as a connection failure.
//
// ============================================================================

use crate::error::ListenerResult;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};
use submission_config::AmqpConfig;
use tracing::info;

pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const DEAD_LETTER_ROUTING_KEY_ARG: &str = "x-dead-letter-routing-key";

fn durable() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

/// Arguments for the main queue declare
pub fn queue_arguments(config: &AmqpConfig) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(exchange) = &config.dead_letter_exchange {
        args.insert(
            ShortString::from(DEAD_LETTER_EXCHANGE_ARG),
            AMQPValue::LongString(LongString::from(exchange.as_str())),
        );
        args.insert(
            ShortString::from(DEAD_LETTER_ROUTING_KEY_ARG),
            AMQPValue::LongString(LongString::from(config.dead_letter_queue.as_str())),
        );
    }
    args
}

pub async fn declare(channel: &Channel, config: &AmqpConfig) -> ListenerResult<()> {
    if let Some(exchange) = &config.dead_letter_exchange {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(&config.dead_letter_queue, durable(), FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &config.dead_letter_queue,
                exchange,
                &config.dead_letter_queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(
            exchange = %exchange,
            dead_letter_queue = %config.dead_letter_queue,
            "Dead-letter topology declared"
        );
    }

    let queue = channel
        .queue_declare(&config.queue, durable(), queue_arguments(config))
        .await?;
    info!(
        queue = %config.queue,
        messages = queue.message_count(),
        consumers = queue.consumer_count(),
        "Queue declared"
    );

    Ok(())
}
