//! Persisted enrichment results and the analysis payload shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Event;
use crate::services::fingerprinter::Fingerprint;

/// Stored analysis result for one fingerprint of one parent
///
/// Unique per `(parent_id, fingerprint)`. Created on the first successful
/// analysis and updated in place on reprocessing; never deleted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub fingerprint: Fingerprint,
    pub parent_id: String,
    pub occurred_at: DateTime<Utc>,
    pub raw_text: String,
    pub supplementary_text: Option<String>,
    /// Raw payload text as stored, which may predate the structured format
    pub payload: Option<String>,
    pub urgent: bool,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EnrichmentRecord {
    /// Build the row to upsert after a successful analysis
    pub fn from_analysis(
        fingerprint: Fingerprint,
        parent_id: &str,
        event: &Event,
        payload: &StructuredPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            parent_id: parent_id.to_string(),
            occurred_at: event.occurred_at,
            raw_text: event.text.clone(),
            supplementary_text: event.supplementary_text.clone(),
            payload: Some(payload.to_json_string()),
            urgent: payload.urgent(),
            analyzed_at: Some(now),
            created_at: now,
        }
    }
}

/// Keys carrying the human-readable summary, newest shape first
pub const SUMMARY_FIELDS: &[&str] = &["summary", "resumo"];

/// Boolean urgency keys
const URGENT_BOOL_FIELDS: &[&str] = &["urgent", "urgente"];

/// Textual urgency levels accepted under the `urgency` key
const URGENT_LEVELS: &[&str] = &["high", "alta", "urgent", "urgente"];

/// Semi-structured result of an analysis call
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPayload {
    fields: Map<String, Value>,
}

impl StructuredPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parse provider or stored text into an object payload
    ///
    /// A surrounding markdown code fence is stripped first. Returns `None`
    /// for anything that is not a JSON object.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(strip_code_fence(raw)) {
            Ok(Value::Object(fields)) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// First recognised summary field, whatever its JSON type
    pub fn summary_value(&self) -> Option<&Value> {
        SUMMARY_FIELDS.iter().find_map(|k| self.fields.get(*k))
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary_value().and_then(Value::as_str)
    }

    /// Urgency flag across the historical payload shapes; false if absent
    pub fn urgent(&self) -> bool {
        for key in URGENT_BOOL_FIELDS {
            if let Some(Value::Bool(flag)) = self.fields.get(*key) {
                return *flag;
            }
        }

        match self.fields.get("urgency") {
            Some(Value::String(level)) => {
                let level = level.trim().to_lowercase();
                URGENT_LEVELS.contains(&level.as_str())
            }
            Some(Value::Bool(flag)) => *flag,
            _ => false,
        }
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// Strip a ```lang ... ``` fence wrapping the whole text
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. "json") on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}
