//! LLM-query capability and an OpenAI-compatible chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use brandlens_shared::{BrandlensError, Result};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Brandlens/", env!("CARGO_PKG_VERSION"));

/// One completed model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

/// A backend able to answer a single prompt.
///
/// A transport failure is an `Err`; callers scope it to one item.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<LlmResponse>;

    /// Model name for logs and cache keys.
    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatClient {
    provider: String,
    model: String,
    endpoint: Url,
    api_key: String,
    client: Client,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = chat_endpoint(base_url)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BrandlensError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider: provider.into(),
            model: model.into(),
            endpoint,
            api_key: api_key.into(),
            client,
        })
    }
}

/// `<base>/chat/completions`, keeping any path prefix such as `/v1`.
fn chat_endpoint(base_url: &str) -> Result<Url> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base)
        .map_err(|e| BrandlensError::config(format!("invalid provider URL '{base_url}': {e}")))?;
    base.join("chat/completions")
        .map_err(|e| BrandlensError::config(format!("invalid provider URL '{base_url}': {e}")))
}

#[async_trait]
impl LlmClient for ChatClient {
    #[instrument(skip_all, fields(provider = %self.provider, model = %self.model))]
    async fn query(&self, prompt: &str) -> Result<LlmResponse> {
        let started = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrandlensError::Network(format!("{}: {e}", self.provider)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BrandlensError::Network(format!(
                "{} returned HTTP {}: {}",
                self.provider,
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BrandlensError::malformed(format!("{}: {e}", self.provider)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BrandlensError::malformed(format!("{}: response had no content", self.provider)))?;
        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));
        let latency_ms = started.elapsed().as_millis() as u64;

        debug!(tokens_in, tokens_out, latency_ms, "llm call completed");

        Ok(LlmResponse {
            text,
            tokens_in,
            tokens_out,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            latency_ms,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }
}
