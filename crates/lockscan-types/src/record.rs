//! [`ScanRecord`] and the record parser.
//!
//! A scanned or typed code has the plain-text form
//! `subjectId-resourceId-pin`.  There is no escaping: a `-` inside a field
//! over-splits the payload and the code is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ScanError;

/// Field separator inside a scanned code.
pub const RECORD_DELIMITER: char = '-';

const FIELD_COUNT: usize = 3;

/// The validated three-field record extracted from a code.
///
/// Serializes with the broker's wire keys (`user_id`, `id`, `pin`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "user_id")]
    pub subject_id: String,
    #[serde(rename = "id")]
    pub resource_id: String,
    pub pin: String,
}

impl ScanRecord {
    pub fn new(
        subject_id: impl Into<String>,
        resource_id: impl Into<String>,
        pin: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            resource_id: resource_id.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Debug for ScanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRecord")
            .field("subject_id", &self.subject_id)
            .field("resource_id", &self.resource_id)
            .field("pin", &"<redacted>")
            .finish()
    }
}

impl FromStr for ScanRecord {
    type Err = ScanError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_record(raw)
    }
}

/// Parse `subjectId-resourceId-pin` into a [`ScanRecord`].
///
/// Exactly three non-empty parts are accepted verbatim; no trimming or
/// character-class checks are applied.
///
/// # Errors
///
/// Returns [`ScanError::MalformedRecord`] for any other part count or when a
/// part is empty (leading, trailing or doubled delimiter).
pub fn parse_record(raw: &str) -> Result<ScanRecord, ScanError> {
    let parts: Vec<&str> = raw.split(RECORD_DELIMITER).collect();
    let empty_parts = parts.iter().filter(|p| p.is_empty()).count();

    if parts.len() != FIELD_COUNT || empty_parts > 0 {
        return Err(ScanError::MalformedRecord {
            parts: parts.len(),
            empty_parts,
        });
    }

    Ok(ScanRecord::new(parts[0], parts[1], parts[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_fields_in_order() {
        let record = parse_record("u1-box9-4321").unwrap();
        assert_eq!(record.subject_id, "u1");
        assert_eq!(record.resource_id, "box9");
        assert_eq!(record.pin, "4321");
    }

    #[test]
    fn accepts_any_non_empty_field_verbatim() {
        let record = parse_record(" a b -ÿ√-0000 ").unwrap();
        assert_eq!(record, ScanRecord::new(" a b ", "ÿ√", "0000 "));
    }

    #[test]
    fn rejects_two_parts() {
        let err = parse_record("onlytwoparts-here").unwrap_err();
        assert_eq!(err, ScanError::MalformedRecord { parts: 2, empty_parts: 0 });
    }

    #[test]
    fn rejects_four_parts() {
        let err = parse_record("a-b-c-d").unwrap_err();
        assert_eq!(err, ScanError::MalformedRecord { parts: 4, empty_parts: 0 });
    }

    #[test]
    fn rejects_wrong_part_counts() {
        for raw in ["", "single", "a-b", "a-b-c-d-e", "--------"] {
            let result = parse_record(raw);
            assert!(
                matches!(result, Err(ScanError::MalformedRecord { .. })),
                "{raw:?} must be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_fields() {
        for raw in ["-b-c", "a-b-", "a--c", "--", "-a-b", "a-b-c-"] {
            let result = parse_record(raw);
            assert!(
                matches!(result, Err(ScanError::MalformedRecord { .. })),
                "{raw:?} must be rejected"
            );
        }
        let err = parse_record("a--c").unwrap_err();
        assert_eq!(err, ScanError::MalformedRecord { parts: 3, empty_parts: 1 });
    }

    #[test]
    fn accepts_every_three_segment_shape() {
        let segments = ["x", "42", "box_9", "PIN", "äö"];
        for a in segments {
            for b in segments {
                let raw = format!("{a}-{b}-{a}{b}");
                let record = parse_record(&raw).unwrap();
                let joined = [record.subject_id, record.resource_id, record.pin]
                    .join(&RECORD_DELIMITER.to_string());
                assert_eq!(joined, raw);
            }
        }
    }

    #[test]
    fn parse_is_idempotent() {
        for raw in ["u1-box9-4321", "a-b-c-d", "nope"] {
            assert_eq!(parse_record(raw), parse_record(raw));
        }
    }

    #[test]
    fn from_str_delegates_to_parser() {
        let record: ScanRecord = "u1-box9-4321".parse().unwrap();
        assert_eq!(record, ScanRecord::new("u1", "box9", "4321"));
        assert!("u1-box9".parse::<ScanRecord>().is_err());
    }

    #[test]
    fn debug_redacts_pin() {
        let record = ScanRecord::new("u1", "box9", "4321");
        let debug_str = format!("{record:?}");
        assert!(!debug_str.contains("4321"), "pin must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
        assert!(debug_str.contains("box9"));
    }
}
