//! Claude API provider implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use tandem_core::{Error, Result};

/// Default Anthropic API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// LLM provider using Anthropic's Claude API.
pub struct ClaudeProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeProvider {
    /// Creates a new Claude provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model ID (e.g., "claude-sonnet-4-20250514")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Points the provider at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets a transport-level timeout on the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    fn build_body(&self, request: CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": [{"role": "user", "content": request.query}],
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

/// 429 and 5xx are worth another attempt.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn parse_response(body: &serde_json::Value) -> Result<CompletionResponse> {
    let content = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| Error::generation("Missing content in Claude response"))?;

    let usage = body["usage"]
        .as_object()
        .ok_or_else(|| Error::generation("Missing usage data in Claude response"))?;
    let input = usage
        .get("input_tokens")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::generation("Invalid input_tokens"))?;
    let output = usage
        .get("output_tokens")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::generation("Invalid output_tokens"))?;

    Ok(CompletionResponse {
        content,
        tokens_used: TokenUsage { input, output },
        truncated: body["stop_reason"].as_str() == Some("max_tokens"),
    })
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport_with_source("Failed to call Claude API", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Claude API error {status}: {error_text}");
            return Err(if is_transient(status) {
                Error::transport(message)
            } else {
                Error::generation(message)
            });
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::generation_with_source("Failed to parse Claude response", e))?;

        parse_response(&response_body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
