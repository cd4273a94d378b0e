//! Analyzer and transport doubles

use async_trait::async_trait;
use dkt_re::error::AnalysisError;
use dkt_re::models::StructuredPayload;
use dkt_re::services::{AnalysisRequest, AnalysisTransport, Analyzer};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Analyzer that summarises by echoing the movement text
///
/// Movements whose text is in the failure set get a transport error.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(texts: &[&str]) -> Self {
        let analyzer = Self::default();
        analyzer
            .failing
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));
        analyzer
    }

    /// Let previously failing movements succeed
    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        request: &AnalysisRequest<'_>,
    ) -> Result<StructuredPayload, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.text.to_string());

        if self.failing.lock().unwrap().contains(request.text) {
            return Err(AnalysisError::Transport("connection reset".to_string()));
        }

        let body = serde_json::json!({
            "summary": format!("Summary of {}", request.text),
            "urgent": request.text.contains("deadline"),
        });
        Ok(StructuredPayload::parse(&body.to_string()).unwrap())
    }
}

/// Transport returning the same completion for every call
pub struct MockTransport {
    reply: String,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisTransport for MockTransport {
    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}
