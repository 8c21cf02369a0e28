//! Deterministic [`LlmClient`] for tests.
//!
//! ```rust,ignore
//! let llm = MockLlmClient::new()
//!     .with_response(r#"{"brands": ["比亚迪"], "products": []}"#)
//!     .with_failure("timeout");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use brandlens_shared::{BrandlensError, Result};

use crate::client::{LlmClient, LlmResponse};

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Failure(String),
}

#[derive(Debug, Default)]
struct MockState {
    queue: VecDeque<Scripted>,
    by_prompt: Vec<(String, Scripted)>,
    calls: Vec<String>,
}

/// Scripted LLM client.
///
/// Responses are matched first by prompt substring, then taken from the
/// queue in order, then fall back to the default response.
#[derive(Debug, Clone)]
pub struct MockLlmClient {
    state: Arc<Mutex<MockState>>,
    default_response: String,
    tokens: (u64, u64),
    model: String,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            default_response: "{}".to_string(),
            tokens: (10, 5),
            model: "mock-model".to_string(),
        }
    }

    /// Queue a successful response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.lock().queue.push_back(Scripted::Text(text.into()));
        self
    }

    /// Queue a transport failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.lock().queue.push_back(Scripted::Failure(message.into()));
        self
    }

    /// Answer any prompt containing `needle` with `text`.
    pub fn with_prompt_response(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.lock()
            .by_prompt
            .push((needle.into(), Scripted::Text(text.into())));
        self
    }

    /// Fail any prompt containing `needle`.
    pub fn with_prompt_failure(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.lock()
            .by_prompt
            .push((needle.into(), Scripted::Failure(message.into())));
        self
    }

    pub fn with_default_response(mut self, text: impl Into<String>) -> Self {
        self.default_response = text.into();
        self
    }

    pub fn with_tokens(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens = (tokens_in, tokens_out);
        self
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn query(&self, prompt: &str) -> Result<LlmResponse> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(prompt.to_string());
            let matched = state
                .by_prompt
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, s)| s.clone());
            matched
                .or_else(|| state.queue.pop_front())
                .unwrap_or_else(|| Scripted::Text(self.default_response.clone()))
        };

        match scripted {
            Scripted::Text(text) => Ok(LlmResponse {
                text,
                tokens_in: self.tokens.0,
                tokens_out: self.tokens.1,
                model: self.model.clone(),
                latency_ms: 0,
            }),
            Scripted::Failure(message) => Err(BrandlensError::Network(message)),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_in_order() {
        let llm = MockLlmClient::new()
            .with_response("first")
            .with_failure("down")
            .with_default_response("default");

        assert_eq!(llm.query("a").await.unwrap().text, "first");
        assert!(llm.query("b").await.is_err());
        assert_eq!(llm.query("c").await.unwrap().text, "default");
        assert_eq!(llm.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn prompt_matches_take_precedence() {
        let llm = MockLlmClient::new()
            .with_response("queued")
            .with_prompt_response("batch-2", "matched")
            .with_tokens(100, 50);

        let response = llm.query("audit batch-2 please").await.unwrap();
        assert_eq!(response.text, "matched");
        assert_eq!(response.tokens_in, 100);
        assert_eq!(llm.query("other").await.unwrap().text, "queued");
        assert_eq!(llm.call_count(), 2);
    }
}
