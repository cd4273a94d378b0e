//! Analysis provider
//!
//! Wraps the expensive external text-analysis call with:
//! - a daily quota checked before every dispatch
//! - a per-call timeout, reported as a retryable error
//! - response validation, so a provider answer that describes its own failure
//!   is returned as an error instead of a payload the caller would persist

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::db::cache::{cache_key, CacheStore};
use crate::error::AnalysisError;
use crate::models::StructuredPayload;
use crate::services::prompt_cache::cached_or_compute;
use crate::services::quota::QuotaCounter;
use crate::services::validity_classifier::check_structured;

/// Generous default; summaries of long filings are slow
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const MOVEMENT_SYSTEM_PROMPT: &str = "You analyse procedural movements of legal cases. \
Reply with ONLY a JSON object, no markdown, with these keys: \
\"summary\" (one or two plain sentences explaining the movement, in the language of the movement), \
\"urgent\" (true if the movement opens a deadline or requires prompt action, else false), \
\"deadline\" (the deadline in YYYY-MM-DD if one is stated, else null).";

const GENERIC_SYSTEM_PROMPT: &str = "You are a concise assistant for a legal practice.";

/// Wire-level access to a text-generation model
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    /// Identifier of the model answering, part of cache keys
    fn model_id(&self) -> &str;

    /// Wait until a request may leave the process
    ///
    /// Called before the quota is charged and outside the request timeout.
    async fn ready(&self) {}

    /// One completion for a system instruction and user message
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError>;
}

/// What to analyse
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub text: &'a str,
    pub supplementary_text: Option<&'a str>,
    /// Caller-supplied context, e.g. the case subject
    pub context_hint: &'a str,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(text: &'a str, context_hint: &'a str) -> Self {
        Self {
            text,
            supplementary_text: None,
            context_hint,
        }
    }

    fn user_message(&self) -> String {
        let mut message = String::new();
        if !self.context_hint.trim().is_empty() {
            message.push_str("Case context: ");
            message.push_str(self.context_hint.trim());
            message.push_str("\n\n");
        }
        message.push_str("Movement: ");
        message.push_str(self.text.trim());
        if let Some(extra) = self.supplementary_text.filter(|s| !s.trim().is_empty()) {
            message.push_str("\n\nAdditional text: ");
            message.push_str(extra.trim());
        }
        message
    }
}

/// Seam between the reconciler and the provider
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest<'_>,
    ) -> Result<StructuredPayload, AnalysisError>;
}

/// Quota- and timeout-enforcing provider over an [`AnalysisTransport`]
pub struct AnalysisProvider {
    transport: Arc<dyn AnalysisTransport>,
    quota: Arc<QuotaCounter>,
    request_timeout: Duration,
}

impl AnalysisProvider {
    pub fn new(transport: Arc<dyn AnalysisTransport>, quota: Arc<QuotaCounter>) -> Self {
        Self {
            transport,
            quota,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn quota(&self) -> &QuotaCounter {
        &self.quota
    }

    /// Pacing wait, quota check, then one timed transport call
    ///
    /// The quota slot is consumed on dispatch regardless of outcome. Time
    /// spent waiting on the transport's pacing counts against neither.
    async fn dispatch(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        self.transport.ready().await;
        let slot = self.quota.try_acquire()?;
        tracing::debug!(
            used = slot.used,
            limit = slot.limit,
            model = %self.transport.model_id(),
            "Dispatching analysis call"
        );

        match tokio::time::timeout(self.request_timeout, self.transport.complete(system, user)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.request_timeout, "Analysis call timed out");
                Err(AnalysisError::Timeout(self.request_timeout))
            }
        }
    }

    /// Free-form generation without validation
    pub async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        self.dispatch(GENERIC_SYSTEM_PROMPT, prompt).await
    }

    /// Generation read through the response cache
    ///
    /// Cache failures never block the call; see [`cached_or_compute`].
    pub async fn generate_cached(
        &self,
        prompt: &str,
        ttl: Duration,
        cache: &dyn CacheStore,
    ) -> Result<String, AnalysisError> {
        let key = cache_key("generate", &[self.transport.model_id(), prompt]);
        cached_or_compute(cache, &key, ttl, || self.generate(prompt)).await
    }
}

#[async_trait]
impl Analyzer for AnalysisProvider {
    async fn analyze(
        &self,
        request: &AnalysisRequest<'_>,
    ) -> Result<StructuredPayload, AnalysisError> {
        let raw = self
            .dispatch(MOVEMENT_SYSTEM_PROMPT, &request.user_message())
            .await?;

        let payload = StructuredPayload::parse(&raw).ok_or_else(|| {
            let preview: String = raw.chars().take(120).collect();
            AnalysisError::InvalidResponse(format!("expected a JSON object, got: {}", preview))
        })?;

        check_structured(&payload).map_err(|reason| {
            tracing::warn!(reason = %reason, "Provider returned an unusable payload");
            AnalysisError::Rejected(reason)
        })?;

        Ok(payload)
    }
}
