//! Generation provider configuration and construction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::claude::{ClaudeProvider, DEFAULT_BASE_URL};
use crate::mock::MockLlmProvider;
use crate::provider::LlmProvider;
use crate::retry::RetryWrapper;
use tandem_core::{Error, Result};

/// Generation provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider: "mock" (echoes the retrieved context) or "claude".
    pub provider: String,

    /// Model ID.
    pub model: String,

    /// API key (falls back to `ANTHROPIC_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API base URL.
    pub base_url: String,

    /// Maximum tokens per answer.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Per-attempt timeout, in seconds.
    pub timeout_secs: u64,

    /// Attempts per answer, including the first.
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 300,
            temperature: 0.2,
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

/// Build the configured provider, wrapped with timeout and retry.
pub fn create_llm_provider(config: &GenerationConfig) -> Result<Arc<dyn LlmProvider>> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let inner: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "mock" => Arc::new(MockLlmProvider::echo()),
        "claude" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    Error::config("missing generation API key (set ANTHROPIC_API_KEY)")
                })?;
            Arc::new(
                ClaudeProvider::new(api_key, &config.model)
                    .with_base_url(&config.base_url)
                    .with_timeout(timeout)?,
            )
        }
        other => {
            return Err(Error::config(format!(
                "unknown generation provider '{other}' (expected 'mock' or 'claude')"
            )));
        }
    };

    Ok(Arc::new(
        RetryWrapper::new(inner)
            .with_max_attempts(config.max_attempts)
            .with_timeout(timeout),
    ))
}
