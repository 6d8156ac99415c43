// ============================================================================
// Queue Consumer
// ============================================================================
//
// One logical subscription to the artifact.submitted queue.
//
// - basic.qos(prefetch) bounds what the broker pushes; a semaphore of the
//   same size bounds concurrent handler tasks.
// - Each message is handled in its own task and settled only after the
//   delivery controller reaches a terminal state.
// - Requeue republishes a copy stamped with the next redelivery count and
//   acks the delivered copy. A plain nack(requeue=true) comes back with nothing
//   but the `redelivered` flag on classic queues, so the redelivery limit
//   would never trip.
// - On a broker error or stream end the connection is re-established with
//   backoff; unacknowledged messages are redelivered by the broker. Any
//   other error stops the consumer.
// - On shutdown the subscription is cancelled, in-flight handlers get a
//   grace period, and whatever is still running is aborted unacknowledged.
//
// ============================================================================

use crate::amqp::metadata::requeue_headers;
use crate::amqp::BrokerConnection;
use crate::delivery::{DeliveryController, DeliverySettler, InboundMessage};
use crate::error::{ListenerError, ListenerResult};
use crate::gateway::EventForwarder;
use crate::health::HealthReporter;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::Channel;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use submission_config::AmqpConfig;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Settles one delivery on the channel it arrived on
pub struct BrokerSettler {
    channel: Channel,
    queue: String,
    delivery: Delivery,
    redelivery_count: u32,
}

impl BrokerSettler {
    pub fn new(channel: Channel, queue: String, delivery: Delivery, redelivery_count: u32) -> Self {
        Self {
            channel,
            queue,
            delivery,
            redelivery_count,
        }
    }

    async fn nack(&self, requeue: bool) -> ListenerResult<()> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeliverySettler for BrokerSettler {
    async fn ack(&self) -> ListenerResult<()> {
        self.delivery.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn dead_letter(&self) -> ListenerResult<()> {
        self.nack(false).await
    }

    async fn requeue(&self) -> ListenerResult<()> {
        let headers = requeue_headers(
            self.delivery.properties.headers().as_ref(),
            self.redelivery_count,
        );
        let properties = self.delivery.properties.clone().with_headers(headers);

        let published = async {
            self.channel
                .basic_publish(
                    "",
                    &self.queue,
                    BasicPublishOptions::default(),
                    &self.delivery.data,
                    properties,
                )
                .await?
                .await?;
            Ok::<_, lapin::Error>(())
        }
        .await;

        match published {
            Ok(()) => {
                debug!(
                    delivery_tag = self.delivery.delivery_tag,
                    redelivery_count = self.redelivery_count + 1,
                    "Republished message to queue"
                );
                self.ack().await
            }
            Err(e) => {
                // Fall back to a broker requeue; the count is lost for this round
                warn!(error = %e, "Republish failed, requeueing in place");
                self.nack(true).await?;
                Err(e.into())
            }
        }
    }
}

/// Why a subscription stopped
enum SubscriptionEnd {
    Shutdown,
    Lost(ListenerError),
}

pub struct QueueConsumer<F> {
    connection: BrokerConnection,
    controller: Arc<DeliveryController<F>>,
    config: AmqpConfig,
    health: HealthReporter,
    grace: Duration,
    consumer_tag: String,
}

impl<F: EventForwarder + 'static> QueueConsumer<F> {
    pub fn new(
        config: AmqpConfig,
        controller: Arc<DeliveryController<F>>,
        health: HealthReporter,
        grace: Duration,
    ) -> Self {
        let consumer_tag = format!("submission-listener-{}", uuid::Uuid::new_v4());
        Self {
            connection: BrokerConnection::new(config.clone(), health.clone()),
            controller,
            config,
            health,
            grace,
            consumer_tag,
        }
    }

    /// Consume until `shutdown` flips to true or a non-broker error occurs
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ListenerResult<()> {
        let semaphore = Arc::new(Semaphore::new(usize::from(self.config.prefetch.max(1))));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut fatal = None;

        info!(
            queue = %self.config.queue,
            prefetch = self.config.prefetch,
            consumer_tag = %self.consumer_tag,
            "Queue consumer starting"
        );

        loop {
            let channel = match self.connection.connect(&mut shutdown).await? {
                Some(channel) => channel,
                None => break,
            };

            match self
                .consume(&channel, &semaphore, &mut tasks, &mut shutdown)
                .await
            {
                SubscriptionEnd::Shutdown => break,
                SubscriptionEnd::Lost(e) if e.is_connection_error() => {
                    self.connection.mark_lost(&e).await
                }
                SubscriptionEnd::Lost(e) => {
                    error!(error = %e, error_code = e.error_code(), "Queue consumer failed");
                    fatal = Some(e);
                    break;
                }
            }
        }

        self.health.begin_shutdown();
        info!("Queue consumer stopping");
        drain(&mut tasks, self.grace).await;
        self.connection.close().await;
        info!("Queue consumer stopped");
        fatal.map_or(Ok(()), Err)
    }

    async fn consume(
        &mut self,
        channel: &Channel,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SubscriptionEnd {
        let mut consumer = match self.subscribe(channel).await {
            Ok(consumer) => consumer,
            Err(e) => return SubscriptionEnd::Lost(e),
        };
        self.connection.mark_subscribed();
        info!(queue = %self.config.queue, "Subscribed, waiting for artifact.submitted messages");

        let controller = &self.controller;
        let queue = &self.config.queue;
        let end = dispatch(&mut consumer, semaphore, tasks, shutdown, |delivery: Delivery| {
            let controller = Arc::clone(controller);
            let message = InboundMessage::from(&delivery);
            let settler = BrokerSettler::new(
                channel.clone(),
                queue.clone(),
                delivery,
                message.redelivery_count,
            );
            async move {
                debug!(
                    delivery_tag = message.delivery_tag,
                    redelivery_count = message.redelivery_count,
                    bytes = message.payload.len(),
                    "Message received"
                );
                controller.handle_delivery(&message, &settler).await;
            }
        })
        .await;

        if let SubscriptionEnd::Shutdown = end {
            self.cancel(channel).await;
        }
        end
    }

    async fn subscribe(&self, channel: &Channel) -> ListenerResult<lapin::Consumer> {
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                &self.config.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    async fn cancel(&self, channel: &Channel) {
        self.health.begin_shutdown();
        if let Err(e) = channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(error = %e, "Failed to cancel consumer");
        }
    }
}

/// Pull deliveries and run `handle` on each in its own task.
///
/// A permit is taken before pulling, so no more than the semaphore's size
/// of handlers ever run at once.
async fn dispatch<S, T, E, H, Fut>(
    deliveries: &mut S,
    semaphore: &Arc<Semaphore>,
    tasks: &mut JoinSet<()>,
    shutdown: &mut watch::Receiver<bool>,
    mut handle: H,
) -> SubscriptionEnd
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Into<ListenerError>,
    H: FnMut(T) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        reap(tasks);

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return SubscriptionEnd::Lost(ListenerError::Internal(
                        "handler semaphore closed".to_string(),
                    ))
                }
            },
            _ = shutdown.changed() => return SubscriptionEnd::Shutdown,
        };

        let next = tokio::select! {
            next = deliveries.next() => next,
            _ = shutdown.changed() => return SubscriptionEnd::Shutdown,
        };

        let item = match next {
            Some(Ok(item)) => item,
            Some(Err(e)) => return SubscriptionEnd::Lost(e.into()),
            None => return SubscriptionEnd::Lost(ListenerError::ConnectionClosed),
        };

        let handler = handle(item);
        tasks.spawn(async move {
            let _permit = permit;
            handler.await;
        });
    }
}

/// Collect finished handler tasks without waiting
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                error!(error = %e, "Message handler panicked");
            }
        }
    }
}

/// Wait up to `grace` for in-flight handlers, then abort the rest.
/// Aborted messages stay unacknowledged and are redelivered by the broker.
async fn drain(tasks: &mut JoinSet<()>, grace: Duration) {
    if tasks.is_empty() {
        return;
    }

    info!(
        in_flight = tasks.len(),
        grace_secs = grace.as_secs(),
        "Waiting for in-flight messages"
    );
    let finished = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Message handler panicked");
                }
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            remaining = tasks.len(),
            "Grace period elapsed, aborting in-flight messages (broker will redeliver)"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}
