//! The publish seam.
//!
//! The scan session never speaks MQTT directly.  It hands a
//! [`PublishEnvelope`] to a [`Publisher`], which translates it into the
//! protocol of the outside world.
//!
//! - [`MqttPublisher`][crate::mqtt::MqttPublisher] – publishes to a TLS MQTT
//!   broker.

use async_trait::async_trait;
use lockscan_types::{PublishEnvelope, ScanError};

/// Every broker sink must implement this trait.
///
/// # Contract
///
/// * `publish` transmits the envelope's payload to its topic once.  It is
///   fire-and-forget at the application layer: no retry and no delivery
///   confirmation beyond what the transport session provides.  Failures to
///   hand the message to the transport are returned to the caller.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), ScanError>;
}
