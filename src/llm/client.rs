//! Chat-completion clients.
//!
//! Both providers speak the OpenAI-compatible chat-completions wire format;
//! they differ only in endpoint, credential source, and default base URL.
//! [`ChatCompletionClient`] is the seam the rest of the pipeline sees, which
//! also makes the citation pipeline and reconciler trivially mockable in
//! tests.
//!
//! ## Retry strategy
//!
//! Transport failures (connection errors, timeouts, non-2xx) are retried
//! with exponential backoff: `retry_backoff_ms * 2^(attempt-1)`, so 500 ms →
//! 1 s → 2 s with the defaults. A response that arrives but contains no
//! usable content is a model-output problem and is never retried here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::{PipelineConfig, Provider};
use crate::error::AnchorDocError;

const LLAMA_BASE_URL: &str = "https://api.llmapi.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// One chat-completion call: prompts plus sampling parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    /// A request carrying the config's default sampling parameters.
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// The capability every LLM-facing stage depends on: send one completion,
/// get free-form text back. The model's output is treated as opaque and
/// non-deterministic.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Issue one chat completion, retrying transport failures internally.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError>;

    /// Model identifier this client calls.
    fn model(&self) -> &str;

    /// Cheap connectivity probe: one tiny completion with a fixed echo
    /// instruction. `false` on any failure.
    async fn ping(&self) -> bool {
        let request = CompletionRequest {
            system_prompt: "You are a helpful assistant.".to_string(),
            user_prompt: "Say 'API is working' and nothing else.".to_string(),
            temperature: 0.1,
            max_tokens: 50,
        };
        match self.complete(&request).await {
            Ok(content) => content.contains("API is working"),
            Err(_) => false,
        }
    }
}

/// Construct the client the config names.
///
/// Credential resolution: explicit `api_key` in the config, else the
/// provider's environment variable. Missing credentials are a configuration
/// error, not a panic.
pub fn client_from_config(
    config: &PipelineConfig,
) -> Result<Box<dyn ChatCompletionClient>, AnchorDocError> {
    match config.provider {
        Provider::Llama => Ok(Box::new(LlamaClient::new(config)?)),
        Provider::OpenAi => Ok(Box::new(OpenAiClient::new(config)?)),
    }
}

fn resolve_api_key(config: &PipelineConfig) -> Result<String, AnchorDocError> {
    if let Some(key) = &config.api_key {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }
    let var = config.provider.key_env_var();
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(AnchorDocError::ClientNotConfigured {
            provider: config.provider.to_string(),
            hint: format!("Set the {var} environment variable or pass an api_key in the config."),
        }),
    }
}

fn build_http_client(config: &PipelineConfig) -> Result<reqwest::Client, AnchorDocError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api_timeout_secs))
        .build()
        .map_err(|e| AnchorDocError::Internal(format!("HTTP client: {e}")))
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Shared transport: POST the request, retrying with backoff, then pull the
/// first choice's content out of the response.
async fn post_chat(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    model: &str,
    request: &CompletionRequest,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<String, AnchorDocError> {
    let payload = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system_prompt,
            },
            ChatMessage {
                role: "user",
                content: &request.user_prompt,
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    };

    let mut last_err = String::new();
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(attempt, max_retries, backoff_ms = backoff, "retrying LLM call");
            sleep(Duration::from_millis(backoff)).await;
        }

        let sent = http
            .post(url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => {
                let parsed: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| AnchorDocError::Internal(format!("response decode: {e}")))?;
                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| {
                        AnchorDocError::Internal("no choices in API response".to_string())
                    })?;
                debug!(chars = content.len(), "LLM call succeeded");
                return Ok(content.trim().to_string());
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                last_err = format!("HTTP {status}: {}", body.chars().take(300).collect::<String>());
                warn!(attempt, %status, "LLM call returned non-success status");
            }
            Err(e) => {
                last_err = e.to_string();
                warn!(attempt, error = %last_err, "LLM call transport error");
            }
        }
    }

    Err(AnchorDocError::LlmFailed {
        retries: max_retries,
        detail: last_err,
    })
}

// ── Providers ────────────────────────────────────────────────────────────

/// Client for a Llama-family chat-completions API.
pub struct LlamaClient {
    http: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlamaClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, AnchorDocError> {
        let base = config.base_url.as_deref().unwrap_or(LLAMA_BASE_URL);
        Ok(Self {
            http: build_http_client(config)?,
            api_key: resolve_api_key(config)?,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }
}

#[async_trait]
impl ChatCompletionClient for LlamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
        post_chat(
            &self.http,
            &self.url,
            &self.api_key,
            &self.model,
            request,
            self.max_retries,
            self.retry_backoff_ms,
        )
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Client for the OpenAI chat-completions API.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl OpenAiClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, AnchorDocError> {
        let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        Ok(Self {
            http: build_http_client(config)?,
            api_key: resolve_api_key(config)?,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AnchorDocError> {
        post_chat(
            &self.http,
            &self.url,
            &self.api_key,
            &self.model,
            request,
            self.max_retries,
            self.retry_backoff_ms,
        )
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
