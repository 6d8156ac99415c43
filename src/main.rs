use anyhow::Result;
use submission_config::{Config, LogFormat, LoggingConfig};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.logging);

    info!("=== Submission Listener Starting ===");
    info!("RabbitMQ: {}", config.amqp.display_uri());
    info!("Queue: {}", config.amqp.queue);
    info!("API Gateway: {} {}", config.gateway.method, config.gateway.base_url);
    info!(config = ?config, "Configuration loaded");

    // Shutdown flag - flips to true on SIGTERM/Ctrl-C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    submission_listener::run(config, shutdown_rx).await
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(logging.rust_log.clone());
    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, initiating graceful shutdown...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("SIGINT received, initiating graceful shutdown...");
                    }
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl-C only");
            }
        }
    }

    tokio::signal::ctrl_c().await.ok();
    info!("Ctrl-C received, initiating graceful shutdown...");
}
