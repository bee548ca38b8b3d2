//! [`PublishEnvelope`] – the wire form of a [`ScanRecord`] plus its topic.
//!
//! The published JSON object has the stable key set `user_id`, `id`, `pin`
//! and, when the active flag is enabled, `"state": true`.  Key order is not
//! part of the contract.

use serde::Serialize;

use crate::{ScanError, ScanRecord};

/// Check that `topic` can be published to: non-empty and free of the MQTT
/// wildcards `+` and `#`.
///
/// # Errors
///
/// Returns [`ScanError::Config`] naming the rejected topic.
pub fn validate_topic(topic: &str) -> Result<(), ScanError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(ScanError::Config(format!("invalid publish topic {topic:?}")));
    }
    Ok(())
}

/// Borrowed JSON shape of a published record.
#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(flatten)]
    record: &'a ScanRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<bool>,
}

/// A serialized record bound for a single broker topic.
///
/// Built once per successful parse and consumed once by a publisher; nothing
/// queues or buffers envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEnvelope {
    topic: String,
    record: ScanRecord,
    payload: Vec<u8>,
}

impl PublishEnvelope {
    /// Serialize `record` for `topic`.
    ///
    /// `include_state` adds the `"state": true` active flag.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] for an empty topic or one containing MQTT
    /// wildcards, and [`ScanError::Serialization`] if the record cannot be
    /// encoded.
    pub fn new(
        record: ScanRecord,
        topic: impl Into<String>,
        include_state: bool,
    ) -> Result<Self, ScanError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        let wire = WireRecord {
            record: &record,
            state: include_state.then_some(true),
        };
        let payload =
            serde_json::to_vec(&wire).map_err(|e| ScanError::Serialization(e.to_string()))?;
        Ok(Self {
            topic,
            record,
            payload,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn record(&self) -> &ScanRecord {
        &self.record
    }

    /// The canonical JSON bytes handed to the broker.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Read a record back from a published payload.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Serialization`] if `payload` is not a record
    /// object.  The `state` flag, when present, is ignored.
    pub fn decode_record(payload: &[u8]) -> Result<ScanRecord, ScanError> {
        serde_json::from_slice(payload).map_err(|e| ScanError::Serialization(e.to_string()))
    }
}
