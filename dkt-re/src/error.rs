//! Error types for dkt-re
//!
//! Per-event failures (`AnalysisError`, upsert errors) are counted in the
//! reconciliation summary. Only `ReconcileError` aborts a batch.

use std::time::Duration;
use thiserror::Error;

use crate::services::validity_classifier::InvalidReason;

/// Failure of one analysis call
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Network failure reaching the provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider did not answer within the request timeout
    #[error("Analysis request timed out after {0:?}")]
    Timeout(Duration),

    /// Quota window exhausted; no call was made
    #[error("Analysis quota exceeded ({limit} calls per window)")]
    QuotaExceeded { limit: u32 },

    /// Provider answered with a non-success status
    #[error("Provider error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid API key")]
    InvalidApiKey,

    /// Provider answered but not with a JSON object
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Provider answered with a payload that describes its own failure
    #[error("Provider payload rejected: {0}")]
    Rejected(InvalidReason),
}

impl AnalysisError {
    /// Whether running the same batch later may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AnalysisError::InvalidApiKey)
    }
}

/// Generic cache store failure
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Row exists but cannot be interpreted
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Batch-level reconciliation failure
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Existing records could not be loaded; nothing was written
    #[error("Failed to load records for parent {parent_id}: {source}")]
    Load {
        parent_id: String,
        #[source]
        source: dkt_common::Error,
    },
}
