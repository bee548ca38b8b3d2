//! `lockscan-middleware` – moves scan results out of the process.
//!
//! # Modules
//!
//! - [`bus`] – in-process broadcast bus carrying
//!   [`SessionEvent`][lockscan_types::SessionEvent]s from the scan session to
//!   whatever front end renders them.
//! - [`publisher`] – the [`Publisher`] trait every broker sink implements.
//! - [`mqtt`] – [`MqttPublisher`]: TLS MQTT client that keeps one broker
//!   session alive in the background and publishes envelopes to it.

pub mod bus;
pub mod mqtt;
pub mod publisher;

pub use bus::{EventBus, SessionSubscriber};
pub use mqtt::{MqttConfig, MqttPublisher};
pub use publisher::Publisher;
