//! Generation provider abstraction.
//!
//! A request is one grounded question: instructions with the retrieved
//! context in the system prompt, and the user's query as the only turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tandem_core::Result;

/// Token cap used when the caller does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Abstraction over text generation providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Answer `request` and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A grounded completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Instructions plus retrieved context.
    pub system_prompt: String,

    /// The user's question.
    pub query: String,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Ask `query` under `system_prompt`.
    pub fn new(system_prompt: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            query: query.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    /// Sets the maximum tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,

    /// Token usage statistics.
    pub tokens_used: TokenUsage,

    /// Generation stopped at `max_tokens`.
    pub truncated: bool,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed
    pub input: u64,

    /// Output tokens generated
    pub output: u64,
}

impl TokenUsage {
    /// Total tokens used (input + output).
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}
