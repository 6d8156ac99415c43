// ============================================================================
// Submission Listener
// ============================================================================
//
// Consumes artifact.submitted.v1 events from RabbitMQ, validates them and
// forwards each one to the API gateway. A message is acknowledged only after
// the gateway confirmed it.
//
//   QueueConsumer -> DeliveryController -> schema::{validate, decode}
//                                       -> GatewayClient
//                 <- ack / nack(requeue=false) / republish + ack
//
// HealthReporter observes the broker connection and the retry streak and is
// served on /health next to /metrics.
//
// ============================================================================

pub mod amqp;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod health;
pub mod routes;
pub mod schema;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use submission_config::Config;
use tokio::sync::watch;
use tracing::{error, info};

use amqp::QueueConsumer;
use delivery::DeliveryController;
use gateway::GatewayClient;
use health::HealthReporter;

/// Run the listener until `shutdown` flips to true
pub async fn run(config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    let health = HealthReporter::from_config(&config);

    let gateway =
        GatewayClient::new(&config.gateway).context("Failed to initialize gateway client")?;
    let controller = Arc::new(
        DeliveryController::new(gateway, &config.retry, health.clone())
            .with_payload_excerpt_bytes(config.logging.payload_excerpt_bytes),
    );

    // Health and metrics server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health server on {}", addr))?;
    info!("Health server listening on {}", addr);

    let app = routes::create_router(health.clone());
    let mut server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let consumer = QueueConsumer::new(
        config.amqp.clone(),
        controller,
        health,
        config.shutdown_grace(),
    );
    let consumed = consumer.run(shutdown).await;

    match server.await {
        Ok(Ok(())) => info!("Health server stopped"),
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
    }

    consumed.context("Queue consumer failed")?;
    info!("Submission listener stopped");
    Ok(())
}
