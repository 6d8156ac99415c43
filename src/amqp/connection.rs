// ============================================================================
// Broker Connection
// ============================================================================
//
// Owns the AMQP connection and its reconnect state machine:
//
//   Disconnected -> Connecting -> Connected -> Subscribed
//                      ^  |                       |
//                      |  v                       v
//                    Backoff <---------------- (lost)
//
// Any state -> Closed on shutdown. The HealthReporter mirrors every
// transition; readiness is only reported in Subscribed.
//
// ============================================================================

use crate::amqp::topology;
use crate::delivery::BackoffPolicy;
use crate::error::{ListenerError, ListenerResult};
use crate::health::HealthReporter;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use submission_config::AmqpConfig;
use submission_metrics::{BROKER_CONNECTED, BROKER_RECONNECTS_TOTAL};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Subscribed = 3,
    Backoff = 4,
    Closed = 5,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Backoff => "backoff",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Subscribed,
            4 => ConnectionState::Backoff,
            5 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connecting, Backoff)
            | (Connected, Subscribed)
            | (Connected, Backoff)
            | (Subscribed, Backoff)
            | (Backoff, Connecting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct BrokerConnection {
    config: AmqpConfig,
    health: HealthReporter,
    backoff: BackoffPolicy,
    state: ConnectionState,
    connection: Option<Connection>,
    /// Connection attempts made so far, successful or not
    attempts: u64,
}

impl BrokerConnection {
    pub fn new(config: AmqpConfig, health: HealthReporter) -> Self {
        let backoff = BackoffPolicy::new(config.reconnect_base(), config.reconnect_max(), 0.2);
        health.set_broker_state(ConnectionState::Disconnected);
        Self {
            config,
            health,
            backoff,
            state: ConnectionState::Disconnected,
            connection: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// AMQP URI assembled from the config; the password never reaches a log
    pub fn uri(config: &AmqpConfig) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority = AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            host: config.host.clone(),
            port: config.port,
        };
        uri.vhost = config.vhost.clone();
        uri.query.heartbeat = Some(config.heartbeat_secs);
        uri
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            // Not fatal for the connection, but worth knowing about
            error!(from = %self.state, to = %next, "Unexpected broker state transition");
        }
        debug!(from = %self.state, to = %next, "Broker connection state");
        self.state = next;
        self.health.set_broker_state(next);
        BROKER_CONNECTED.set(i64::from(next == ConnectionState::Subscribed));
    }

    /// Connect, declare topology and open a channel, retrying with capped
    /// exponential backoff. Returns `None` when shutdown is requested first.
    pub async fn connect(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ListenerResult<Option<Channel>> {
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }

            self.transition(ConnectionState::Connecting);
            if self.attempts > 0 {
                BROKER_RECONNECTS_TOTAL.inc();
            }
            self.attempts += 1;

            info!(uri = %self.config.display_uri(), "Connecting to RabbitMQ");
            match self.open_channel().await {
                Ok(channel) => {
                    self.health.record_connect_success();
                    self.transition(ConnectionState::Connected);
                    info!(queue = %self.config.queue, "Connected to RabbitMQ");
                    return Ok(Some(channel));
                }
                Err(e) => {
                    failures += 1;
                    let consecutive = self.health.record_connect_failure();
                    let delay = self.next_delay(failures);
                    self.transition(ConnectionState::Backoff);
                    warn!(
                        error = %e,
                        consecutive_failures = consecutive,
                        max_failures = self.config.max_connect_failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "RabbitMQ connection failed"
                    );
                    if consecutive == self.config.max_connect_failures + 1 {
                        error!(
                            consecutive_failures = consecutive,
                            "RabbitMQ unreachable beyond the connect budget, reporting not live"
                        );
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(None),
                    }
                }
            }
        }
    }

    async fn open_channel(&mut self) -> ListenerResult<Channel> {
        let connection =
            Connection::connect_uri(Self::uri(&self.config), ConnectionProperties::default())
                .await?;
        let channel = connection.create_channel().await?;
        topology::declare(&channel, &self.config).await?;
        self.connection = Some(connection);
        Ok(channel)
    }

    fn next_delay(&self, failures: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.backoff.jittered_delay(failures, &mut rng)
    }

    pub fn mark_subscribed(&mut self) {
        self.transition(ConnectionState::Subscribed);
    }

    /// The subscription ended unexpectedly; the next `connect` starts over
    pub async fn mark_lost(&mut self, error: &ListenerError) {
        warn!(error = %error, error_code = error.error_code(), "Lost RabbitMQ subscription");
        self.transition(ConnectionState::Backoff);
        if let Some(connection) = self.connection.take() {
            // Best effort; the socket is usually already gone
            let _ = connection.close(0, "reconnecting").await;
        }
    }

    pub async fn close(&mut self) {
        self.transition(ConnectionState::Closed);
        if let Some(connection) = self.connection.take() {
            match connection.close(200, "shutdown").await {
                Ok(()) => info!("RabbitMQ connection closed"),
                Err(e) => debug!(error = %e, "RabbitMQ connection close failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_from_config() {
        let config = AmqpConfig {
            host: "rabbitmq".to_string(),
            port: 5673,
            username: "listener".to_string(),
            password: "s3cret".to_string(),
            vhost: "artifacts".to_string(),
            heartbeat_secs: 600,
            ..AmqpConfig::default()
        };

        let uri = BrokerConnection::uri(&config);
        assert_eq!(uri.authority.host, "rabbitmq");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "listener");
        assert_eq!(uri.authority.userinfo.password, "s3cret");
        assert_eq!(uri.vhost, "artifacts");
        assert_eq!(uri.query.heartbeat, Some(600));
    }

    #[test]
    fn test_state_machine() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Backoff));
        assert!(Backoff.can_transition_to(Connecting));
        assert!(Connected.can_transition_to(Subscribed));
        assert!(Subscribed.can_transition_to(Backoff));
        assert!(Subscribed.can_transition_to(Closed));

        assert!(!Disconnected.can_transition_to(Subscribed));
        assert!(!Backoff.can_transition_to(Subscribed));
        assert!(!Closed.can_transition_to(Connecting));
    }

    #[test]
    fn test_state_roundtrips_through_u8() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Subscribed,
            ConnectionState::Backoff,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_new_connection_reports_disconnected() {
        let health = HealthReporter::new("q", "http://gw", 30);
        health.set_broker_state(ConnectionState::Subscribed);
        let connection = BrokerConnection::new(AmqpConfig::default(), health.clone());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!health.is_ready());
    }

    // Real time: lapin drives its socket outside the tokio clock
    #[tokio::test]
    async fn test_connect_backs_off_until_shutdown() {
        // Bind and drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = AmqpConfig {
            host: "127.0.0.1".to_string(),
            port,
            reconnect_base_ms: 10,
            reconnect_max_ms: 20,
            max_connect_failures: 2,
            ..AmqpConfig::default()
        };
        let health = HealthReporter::new("q", "http://gw", 2);
        let mut connection = BrokerConnection::new(config, health.clone());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let observer = async {
            tokio::time::timeout(Duration::from_secs(10), async {
                while health.consecutive_connect_failures() < 3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("connect failures never accumulated");

            assert!(!health.is_ready());
            assert!(!health.is_live());
            shutdown_tx.send(true).unwrap();
        };

        let (result, ()) = tokio::join!(connection.connect(&mut shutdown_rx), observer);

        assert!(matches!(result, Ok(None)));
        assert_eq!(connection.state(), ConnectionState::Backoff);
        assert_eq!(health.broker_state(), ConnectionState::Backoff);
        assert!(health.consecutive_connect_failures() >= 3);
    }
}
