//! Validity classification of stored enrichment payloads
//!
//! Upstream analysis fails in several shapes: nothing stored, malformed
//! JSON, well-formed JSON describing its own failure, or a plausible object
//! whose summary is itself an error message. Only content inspection tells
//! these apart from a good result, so the classifier never trusts presence
//! alone.
//!
//! **Algorithm:**
//! 1. No record → `Missing`
//! 2. Payload unset or blank → `Invalid(Empty)`
//! 3. Not a JSON object → `Invalid(TextErrorMarker)` if the raw text carries
//!    a failure marker, else `Invalid(Unparseable)`
//! 4. Object with an error field → `Invalid(StructuredErrorField)`
//! 5. Summary absent, blank, non-string or containing a failure marker →
//!    `Invalid(BadSummary)`
//! 6. Otherwise → `Valid`
//!
//! Unparseable payloads are always reprocessed, even if they might be
//! legitimate free text from an older schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::models::enrichment::{EnrichmentRecord, StructuredPayload};

/// Keys whose presence marks a payload as a recorded failure
pub const ERROR_FIELDS: &[&str] = &["error", "errorReason", "error_reason", "erro"];

/// Case-insensitive substrings that mark text as a failure message
pub const FAILURE_MARKERS: &[&str] = &["error", "erro", "failure", "falha", "failed", "falhou"];

/// Why a stored payload must be regenerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidReason {
    Empty,
    TextErrorMarker,
    Unparseable,
    StructuredErrorField,
    BadSummary,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Empty => "empty",
            InvalidReason::TextErrorMarker => "text-error-marker",
            InvalidReason::Unparseable => "unparseable",
            InvalidReason::StructuredErrorField => "structured-error-field",
            InvalidReason::BadSummary => "bad-summary",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the existing state for one fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Missing,
    Valid,
    Invalid(InvalidReason),
}

/// Classify the stored record (if any) for a fingerprint
pub fn classify(existing: Option<&EnrichmentRecord>) -> Classification {
    match existing {
        None => Classification::Missing,
        Some(record) => match classify_payload(record.payload.as_deref()) {
            Ok(()) => Classification::Valid,
            Err(reason) => Classification::Invalid(reason),
        },
    }
}

/// Check raw payload text; `Ok` means usable as-is
pub fn classify_payload(payload: Option<&str>) -> Result<(), InvalidReason> {
    let raw = match payload {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Err(InvalidReason::Empty),
    };

    match StructuredPayload::parse(raw) {
        None => {
            if contains_failure_marker(raw) {
                Err(InvalidReason::TextErrorMarker)
            } else {
                Err(InvalidReason::Unparseable)
            }
        }
        Some(parsed) => check_structured(&parsed),
    }
}

/// Inspect an already parsed payload
pub fn check_structured(payload: &StructuredPayload) -> Result<(), InvalidReason> {
    if ERROR_FIELDS
        .iter()
        .any(|key| payload.get(key).is_some_and(is_error_value))
    {
        return Err(InvalidReason::StructuredErrorField);
    }

    match payload.summary_value() {
        Some(Value::String(summary))
            if !summary.trim().is_empty() && !contains_failure_marker(summary) =>
        {
            Ok(())
        }
        _ => Err(InvalidReason::BadSummary),
    }
}

/// An error field only counts when it says something
fn is_error_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn contains_failure_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fingerprinter::fingerprint;
    use chrono::Utc;

    fn record_with(payload: Option<&str>) -> EnrichmentRecord {
        let now = Utc::now();
        EnrichmentRecord {
            fingerprint: fingerprint("case-42", &now, "Filed"),
            parent_id: "case-42".to_string(),
            occurred_at: now,
            raw_text: "Filed".to_string(),
            supplementary_text: None,
            payload: payload.map(str::to_string),
            urgent: false,
            analyzed_at: Some(now),
            created_at: now,
        }
    }

    #[test]
    fn test_classification_table() {
        use Classification::*;
        use InvalidReason::*;

        let cases: &[(Option<&str>, Classification)] = &[
            (None, Invalid(Empty)),
            (Some(""), Invalid(Empty)),
            (Some("   \n"), Invalid(Empty)),
            (Some("Error: upstream unavailable"), Invalid(TextErrorMarker)),
            (Some("FALHA na análise"), Invalid(TextErrorMarker)),
            (Some("Petição protocolada"), Invalid(Unparseable)),
            (Some("{not json"), Invalid(Unparseable)),
            (Some("[\"summary\"]"), Invalid(Unparseable)),
            (Some(r#"{"error": "x"}"#), Invalid(StructuredErrorField)),
            (Some(r#"{"summary": "ok", "errorReason": "quota"}"#), Invalid(StructuredErrorField)),
            (Some(r#"{"summary": "ok", "erro": true}"#), Invalid(StructuredErrorField)),
            (Some(r#"{"urgent": true}"#), Invalid(BadSummary)),
            (Some(r#"{"summary": ""}"#), Invalid(BadSummary)),
            (Some(r#"{"summary": 42}"#), Invalid(BadSummary)),
            (Some(r#"{"summary": "Analysis failed"}"#), Invalid(BadSummary)),
            (Some(r#"{"resumo": "Erro ao processar"}"#), Invalid(BadSummary)),
            (Some(r#"{"summary": "Hearing set", "urgent": true}"#), Valid),
            (Some(r#"{"resumo": "Audiência designada"}"#), Valid),
            (Some(r#"{"summary": "Filed", "error": null}"#), Valid),
            (Some(r#"{"summary": "Filed", "error": ""}"#), Valid),
            (Some("```json\n{\"summary\": \"Filed\"}\n```"), Valid),
        ];

        for (payload, expected) in cases {
            let record = record_with(*payload);
            assert_eq!(classify(Some(&record)), *expected, "payload {:?}", payload);
        }
    }

    #[test]
    fn test_no_record_is_missing() {
        assert_eq!(classify(None), Classification::Missing);
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(InvalidReason::Empty.to_string(), "empty");
        assert_eq!(InvalidReason::TextErrorMarker.to_string(), "text-error-marker");
        assert_eq!(InvalidReason::Unparseable.to_string(), "unparseable");
        assert_eq!(InvalidReason::StructuredErrorField.to_string(), "structured-error-field");
        assert_eq!(InvalidReason::BadSummary.to_string(), "bad-summary");
    }
}
