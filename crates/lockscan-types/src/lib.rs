//! `lockscan-types` – shared data model for the scan pipeline.
//!
//! # Modules
//!
//! - [`record`] – [`ScanRecord`] and the record parser
//!   ([`parse_record`]) that turns `subjectId-resourceId-pin` text into a
//!   validated record.
//! - [`envelope`] – [`PublishEnvelope`], the wire form of a record bound to
//!   its broker topic.

pub mod envelope;
pub mod record;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use envelope::{PublishEnvelope, validate_topic};
pub use record::{RECORD_DELIMITER, ScanRecord, parse_record};

/// Raw text extracted from a barcode image or typed by the operator.
///
/// Carries no structure of its own; it is produced once per capture cycle and
/// consumed immediately by the record parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DecodedPayload {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for DecodedPayload {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// States of the capture loop / input driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// No active capture.
    Idle,
    /// Pulling frames from the capture device.
    Scanning,
    /// Waiting for one manually typed code.
    FormEntry,
    /// A record was published; the capture device has been released.
    Done,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Scanning => write!(f, "scanning"),
            ScanState::FormEntry => write!(f, "form-entry"),
            ScanState::Done => write!(f, "done"),
        }
    }
}

/// What a scan session does when a decoded payload is not a valid record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseFailurePolicy {
    /// Report the rejection and keep scanning.
    #[default]
    Continue,
    /// Report the rejection and end the session.
    Abort,
}

impl fmt::Display for ParseFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailurePolicy::Continue => write!(f, "continue"),
            ParseFailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

impl FromStr for ParseFailurePolicy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(ParseFailurePolicy::Continue),
            "abort" => Ok(ParseFailurePolicy::Abort),
            other => Err(ScanError::Config(format!(
                "unknown parse failure policy {other:?} (expected continue or abort)"
            ))),
        }
    }
}

/// Event emitted by a scan session on the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the session that produced the event.
    pub session_id: Uuid,
    pub payload: SessionEventPayload,
}

impl SessionEvent {
    pub fn new(session_id: Uuid, payload: SessionEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            payload,
        }
    }
}

/// Variants of data routed over the session event bus.
///
/// PINs never travel on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEventPayload {
    StateChanged { from: ScanState, to: ScanState },
    /// A decoded or typed payload failed record validation.
    PayloadRejected { reason: String },
    RecordPublished {
        topic: String,
        subject_id: String,
        resource_id: String,
    },
    PublishFailed { reason: String },
    DeviceFault { device: String, details: String },
}

/// Error taxonomy of the scan pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error(
        "Malformed record: expected `subjectId-resourceId-pin`, got {parts} part(s), {empty_parts} empty"
    )]
    MalformedRecord { parts: usize, empty_parts: usize },

    #[error("Capture device {device} unavailable: {details}")]
    DeviceUnavailable { device: String, details: String },

    #[error("Broker connection error: {0}")]
    BrokerConnect(String),

    #[error("Broker publish error: {0}")]
    BrokerPublish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ScanState,
    },

    #[error("Scan cancelled")]
    Cancelled,
}
