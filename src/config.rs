//! Configuration types for the anchordoc pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! There is deliberately no global config: a `PipelineConfig` is a plain
//! value the caller constructs and passes down, so two pipelines with
//! different providers can run in the same process.

use crate::error::AnchorDocError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which chat-completion backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Llama-family API (default). Key from config or `LLAMA_API_KEY`.
    #[default]
    Llama,
    /// OpenAI chat-completions API. Key from config or `OPENAI_API_KEY`.
    OpenAi,
}

impl Provider {
    /// Environment variable consulted when no key is set in the config.
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Provider::Llama => "LLAMA_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Llama => write!(f, "llama"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Configuration for an anchordoc pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use anchordoc::{PipelineConfig, Provider};
///
/// let config = PipelineConfig::builder()
///     .provider(Provider::OpenAi)
///     .model("gpt-4")
///     .batch_delay_ms(500)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which backend to call. Default: [`Provider::Llama`].
    pub provider: Provider,

    /// Model identifier, e.g. "llama3.2-3b" or "gpt-4". Default: "llama3.2-3b".
    ///
    /// Also keys the context-limit table in [`crate::batch::TokenEstimator`];
    /// unknown models fall back to a conservative 8 000-token limit.
    pub model: String,

    /// API key. If None, the provider's environment variable is consulted at
    /// client-construction time; if that is also unset, construction fails
    /// with [`AnchorDocError::ClientNotConfigured`].
    pub api_key: Option<String>,

    /// Override the provider's default endpoint URL.
    pub base_url: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the source text, which is
    /// what both the edit flow and citation analysis need.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4000.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient transport failure. Default: 3.
    ///
    /// Only transport-level failures (connection errors, 5xx, timeouts) are
    /// retried. A response that arrives but fails JSON extraction is not a
    /// transport failure and is never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-call HTTP timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Override the model's context limit in tokens. If None, looked up from
    /// the model-limit table by name.
    pub context_limit: Option<usize>,

    /// Fraction of the context limit usable by a batch. Default: 0.8.
    ///
    /// The remaining 20 % leaves room for the system prompt and the model's
    /// own output.
    pub safety_margin: f64,

    /// Paragraphs of trailing context repeated at the start of the next
    /// citation batch. Default: 2. Overlap paragraphs are context only; any
    /// citation the model reports inside them is discarded.
    pub context_overlap: usize,

    /// Fixed delay between sequential batch calls, in milliseconds.
    /// Default: 1000. Batches are always dispatched one at a time.
    pub batch_delay_ms: u64,

    /// Directory for raw-response dumps when a batch's output cannot be
    /// parsed. If None, unparseable responses are not persisted.
    pub raw_output_dir: Option<PathBuf>,

    /// Custom system prompt for the edit flow. If None, uses the built-in
    /// default from [`crate::prompts`].
    pub system_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: "llama3.2-3b".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.1,
            max_tokens: 4000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            context_limit: None,
            safety_margin: 0.8,
            context_overlap: 2,
            batch_delay_ms: 1000,
            raw_output_dir: None,
            system_prompt: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn provider(mut self, provider: Provider) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn context_limit(mut self, tokens: usize) -> Self {
        self.config.context_limit = Some(tokens.max(1));
        self
    }

    pub fn safety_margin(mut self, margin: f64) -> Self {
        self.config.safety_margin = margin.clamp(0.1, 1.0);
        self
    }

    pub fn context_overlap(mut self, paragraphs: usize) -> Self {
        self.config.context_overlap = paragraphs;
        self
    }

    pub fn batch_delay_ms(mut self, ms: u64) -> Self {
        self.config.batch_delay_ms = ms;
        self
    }

    pub fn raw_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.raw_output_dir = Some(dir.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, AnchorDocError> {
        let c = &self.config;
        if c.model.is_empty() {
            return Err(AnchorDocError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        if !(0.1..=1.0).contains(&c.safety_margin) {
            return Err(AnchorDocError::InvalidConfig(format!(
                "Safety margin must be 0.1–1.0, got {}",
                c.safety_margin
            )));
        }
        if c.context_limit == Some(0) {
            return Err(AnchorDocError::InvalidConfig(
                "Context limit must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
