//! Incoming docket movements

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One externally sourced movement, supplied fresh on every run
///
/// Never persisted directly; only its fingerprint and the derived
/// [`EnrichmentRecord`](super::EnrichmentRecord) are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Owning parent. `None` means "the parent being reconciled".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(deserialize_with = "deserialize_occurred_at")]
    pub occurred_at: DateTime<Utc>,

    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_text: Option<String>,
}

impl Event {
    pub fn new(occurred_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            occurred_at,
            text: text.into(),
            supplementary_text: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_supplementary_text(mut self, text: impl Into<String>) -> Self {
        self.supplementary_text = Some(text.into());
        self
    }

    /// True if the event may be reconciled under `parent_id`
    pub fn belongs_to(&self, parent_id: &str) -> bool {
        self.parent_id.as_deref().map_or(true, |p| p == parent_id)
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_occurred_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn deserialize_occurred_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_occurred_at(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!(
            "invalid occurred_at '{}': expected RFC 3339 or YYYY-MM-DD",
            raw
        ))
    })
}
