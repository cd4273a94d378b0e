//! Content fingerprints for docket movements
//!
//! A fingerprint is the SHA-256 digest of `(parent_id, occurred_at, text)`.
//! The timestamp is hashed in RFC 3339 with as much fractional precision as
//! it carries, so two instants within the same second stay distinct.
//! Every field is length-prefixed, so no pair of distinct triples hashes the
//! same byte stream, and the parent is always part of the input: identical
//! movements on two different cases never share a fingerprint.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex length of a SHA-256 digest
pub const FINGERPRINT_LEN: usize = 64;

/// Opaque fixed-length content hash (lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Rebuild from a stored value; `None` unless it is 64 lowercase hex digits
    pub fn from_stored(value: &str) -> Option<Self> {
        let valid = value.len() == FINGERPRINT_LEN
            && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of one movement within its parent
pub fn fingerprint(parent_id: &str, occurred_at: &DateTime<Utc>, text: &str) -> Fingerprint {
    let timestamp = occurred_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);

    let mut hasher = Sha256::new();
    for field in [parent_id, timestamp.as_str(), text] {
        hasher.update(field.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(field.as_bytes());
    }

    Fingerprint(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("case-42", &jan_first(), "Filed");
        let b = fingerprint("case-42", &jan_first(), "Filed");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_parent_is_part_of_the_hash() {
        let a = fingerprint("case-42", &jan_first(), "Filed");
        let b = fingerprint("case-43", &jan_first(), "Filed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Same concatenation, different split between parent and text
        let a = fingerprint("case-4", &jan_first(), "2Filed");
        let b = fingerprint("case-42", &jan_first(), "Filed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_changes_fingerprint() {
        let next_day = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_ne!(
            fingerprint("case-42", &jan_first(), "Filed"),
            fingerprint("case-42", &next_day, "Filed")
        );
    }

    #[test]
    fn test_sub_second_instants_differ() {
        let later = jan_first() + chrono::Duration::milliseconds(400);
        assert_ne!(
            fingerprint("case-42", &jan_first(), "Dispatch published"),
            fingerprint("case-42", &later, "Dispatch published")
        );
    }

    #[test]
    fn test_whole_second_hash_input_is_unchanged() {
        // Whole seconds render without a fraction under AutoSi
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"7:case-42");
            hasher.update(b"20:2024-01-01T00:00:00Z");
            hasher.update(b"5:Filed");
            format!("{:x}", hasher.finalize())
        };
        assert_eq!(fingerprint("case-42", &jan_first(), "Filed").as_str(), expected);
    }

    #[test]
    fn test_from_stored_validates_shape() {
        let fp = fingerprint("case-42", &jan_first(), "Filed");
        assert_eq!(Fingerprint::from_stored(fp.as_str()), Some(fp));
        assert!(Fingerprint::from_stored("abc").is_none());
        assert!(Fingerprint::from_stored(&"G".repeat(64)).is_none());
    }
}
