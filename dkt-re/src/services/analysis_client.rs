//! HTTP transport for an OpenAI-compatible chat completions endpoint

use async_trait::async_trait;
use dkt_common::config::AnalysisConfig;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::error::AnalysisError;
use crate::services::analysis_provider::AnalysisTransport;

const USER_AGENT: &str = concat!("dkt-re/", env!("CARGO_PKG_VERSION"));
const DEFAULT_REQUESTS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(15) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat completions client with bearer authentication
///
/// Requests are paced by a local rate limiter, awaited through
/// [`AnalysisTransport::ready`] before the provider charges its quota. The
/// limiter only spaces calls out; the daily quota is enforced one layer up.
pub struct HttpAnalysisTransport {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpAnalysisTransport {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or_else(|| {
            tracing::warn!(
                "requests_per_minute is 0, using {}",
                DEFAULT_REQUESTS_PER_MINUTE
            );
            DEFAULT_REQUESTS_PER_MINUTE
        });

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Build from the `[analysis]` TOML section and a resolved API key
    pub fn from_config(config: &AnalysisConfig, api_key: String) -> Result<Self, AnalysisError> {
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.requests_per_minute,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

/// Map a non-success status to the matching error
fn status_error(status: StatusCode, body: String) -> AnalysisError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AnalysisError::InvalidApiKey,
        _ => AnalysisError::Api(status.as_u16(), body),
    }
}

/// First choice's message content from a completions body
fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::InvalidResponse(format!("malformed completion: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| AnalysisError::InvalidResponse("completion has no content".to_string()))
}

#[async_trait]
impl AnalysisTransport for HttpAnalysisTransport {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn ready(&self) {
        self.rate_limiter.until_ready().await;
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.2,
        };

        tracing::debug!(model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Provider returned error status");
            return Err(status_error(status, body));
        }

        extract_content(&body)
    }
}
