//! [`MqttPublisher`] – publishes envelopes to a TLS MQTT broker.
//!
//! The broker session is established once and kept alive by a background
//! Tokio task driving the `rumqttc` event loop.  Reconnection after a dropped
//! session is the transport library's behaviour; the task only logs the
//! error and backs off before polling again.
//!
//! Publishing is fire-and-forget at the application layer.  The publisher
//! waits a bounded time for a live session, hands the payload to the client
//! and returns.  Failures are reported to the caller instead of being
//! swallowed.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use lockscan_types::{PublishEnvelope, ScanError};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::publisher::Publisher;

/// Broker connection settings.
#[derive(Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Empty disables username/password authentication.
    pub username: String,
    pub password: String,
    /// CA certificate (PEM) the broker's certificate must chain to.  `None`
    /// selects a plain TCP transport.
    pub ca_cert: Option<PathBuf>,
    pub keep_alive: Duration,
    /// MQTT QoS level: 0, 1 or 2.
    pub qos: u8,
    /// How long `publish` waits for a live broker session.
    pub connect_timeout: Duration,
    /// Back-off after an event-loop error before polling again.
    pub reconnect_delay: Duration,
    /// Capacity of the client's request channel.
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8883,
            client_id: "lockscan".to_string(),
            username: String::new(),
            password: String::new(),
            ca_cert: None,
            keep_alive: Duration::from_secs(60),
            qos: 0,
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            capacity: 10,
        }
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("ca_cert", &self.ca_cert)
            .field("keep_alive", &self.keep_alive)
            .field("qos", &self.qos)
            .finish()
    }
}

/// Map a numeric QoS level onto the client's enum.
pub fn qos_from_level(level: u8) -> Result<QoS, ScanError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ScanError::Config(format!(
            "invalid MQTT QoS level {other} (expected 0, 1 or 2)"
        ))),
    }
}

/// Build the `rumqttc` options for `config`.
///
/// # Errors
///
/// Returns [`ScanError::Config`] for an empty host or client id, or an
/// unreadable CA certificate.
pub fn build_options(config: &MqttConfig) -> Result<MqttOptions, ScanError> {
    if config.host.trim().is_empty() {
        return Err(ScanError::Config("broker host must not be empty".to_string()));
    }
    if config.client_id.trim().is_empty() {
        return Err(ScanError::Config("MQTT client id must not be empty".to_string()));
    }

    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);

    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }

    if let Some(path) = &config.ca_cert {
        let ca = fs::read(path).map_err(|e| {
            ScanError::Config(format!("cannot read CA certificate {}: {e}", path.display()))
        })?;
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    } else {
        warn!(host = %config.host, "no CA certificate configured, using plain TCP");
    }

    Ok(options)
}

/// MQTT broker sink.
///
/// Must be created inside a Tokio runtime: [`MqttPublisher::connect`] spawns
/// the event-loop task on the current runtime.
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    connect_timeout: Duration,
    connected: watch::Receiver<bool>,
    event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Start the broker session.
    ///
    /// Returns as soon as the event loop is running; the TCP/TLS handshake
    /// happens in the background.  A broker that cannot be reached is logged
    /// by the event loop and reported by [`publish`][Publisher::publish].
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] when the options are invalid.
    #[instrument(name = "mqtt_connect", skip_all, fields(host = %config.host, port = config.port))]
    pub fn connect(config: &MqttConfig) -> Result<Self, ScanError> {
        let qos = qos_from_level(config.qos)?;
        let options = build_options(config)?;
        let (client, eventloop) = AsyncClient::new(options, config.capacity);
        let (connected_tx, connected_rx) = watch::channel(false);

        info!(client_id = %config.client_id, "starting MQTT session");
        let event_loop = tokio::spawn(drive_event_loop(
            eventloop,
            connected_tx,
            config.reconnect_delay,
        ));

        Ok(Self {
            client,
            qos,
            connect_timeout: config.connect_timeout,
            connected: connected_rx,
            event_loop,
        })
    }

    /// `true` while a broker session is up.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Send an MQTT DISCONNECT and let the event loop wind down.
    pub async fn disconnect(&self) -> Result<(), ScanError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| ScanError::BrokerConnect(format!("disconnect failed: {e}")))
    }

    async fn await_session(&self) -> Result<(), ScanError> {
        let mut connected = self.connected.clone();
        let ready = tokio::time::timeout(self.connect_timeout, async move {
            connected.wait_for(|up| *up).await.is_ok()
        })
        .await;

        match ready {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScanError::BrokerConnect(
                "MQTT event loop has stopped".to_string(),
            )),
            Err(_) => Err(ScanError::BrokerConnect(format!(
                "no broker session within {:?}",
                self.connect_timeout
            ))),
        }
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    #[instrument(name = "mqtt_publish", skip_all, fields(topic = %envelope.topic()))]
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), ScanError> {
        if let Err(e) = self.await_session().await {
            error!(error = %e, "broker unavailable, record not published");
            return Err(e);
        }

        self.client
            .publish(envelope.topic(), self.qos, false, envelope.payload().to_vec())
            .await
            .map_err(|e| {
                error!(error = %e, "failed to hand record to MQTT client");
                ScanError::BrokerPublish(e.to_string())
            })?;

        info!(bytes = envelope.payload().len(), "record published");
        Ok(())
    }
}

/// Poll the `rumqttc` event loop until the client disconnects or every
/// client handle has been dropped.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    connected: watch::Sender<bool>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "connected to MQTT broker");
                connected.send_replace(true);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                debug!(pkid = ack.pkid, "publish acknowledged");
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker closed the session");
                connected.send_replace(false);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("disconnected from MQTT broker");
                connected.send_replace(false);
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                debug!("all MQTT client handles dropped");
                connected.send_replace(false);
                break;
            }
            Err(e) => {
                connected.send_replace(false);
                error!(error = %e, "MQTT connection error");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}
