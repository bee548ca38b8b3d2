//! `lockscan-runtime` – drives the scan pipeline.
//!
//! # Modules
//!
//! - [`session`] – [`ScanSession`][session::ScanSession]: the capture loop /
//!   input driver state machine.  It pulls frames from a
//!   [`Camera`][lockscan_hal::Camera], runs them through a
//!   [`Decoder`][lockscan_perception::Decoder] and the record parser, and
//!   hands the first valid record to a
//!   [`Publisher`][lockscan_middleware::Publisher] exactly once.  Manual
//!   entry goes through the same parse-and-publish path.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.
//!
//! Front ends are thin drivers: they call into the session and render the
//! [`SessionEvent`][lockscan_types::SessionEvent]s it emits on the
//! [`EventBus`][lockscan_middleware::EventBus].

pub mod session;
pub mod telemetry;

pub use session::{ScanSession, SessionConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
