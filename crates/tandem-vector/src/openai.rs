//! OpenAI-compatible embedding provider.
//!
//! Talks to any endpoint that implements `POST {base}/embeddings`. Transient
//! failures (timeouts, connection errors, 429 and 5xx responses) are retried
//! with exponential backoff up to the configured attempt count; anything else
//! fails the call immediately.

use crate::embedding::EmbeddingProvider;
use crate::types::VectorConfig;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_core::{Error, Result};

/// Known output dimensions for hosted models.
fn default_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Embedding provider backed by an OpenAI-compatible HTTP API.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    requested_dimensions: Option<usize>,
    max_attempts: u32,
    batch_size: usize,
}

impl OpenAiEmbeddingProvider {
    /// Build a provider from vector configuration.
    ///
    /// The API key comes from `config.api_key`, falling back to the
    /// `OPENAI_API_KEY` environment variable.
    pub fn from_config(config: &VectorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::config("missing embedding API key (set OPENAI_API_KEY)"))?;

        let requested_dimensions = (config.dimension > 0).then_some(config.dimension);
        let dimension = requested_dimensions
            .or_else(|| default_dimension(&config.model))
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown dimension for embedding model '{}'; set vector.dimension",
                    config.model
                ))
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension,
            requested_dimensions,
            max_attempts: config.max_attempts.max(1),
            batch_size: config.batch_size.max(1),
        })
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.requested_dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport_with_source("embedding request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("embedding API returned {status}: {text}");
            return Err(if is_transient(status) {
                Error::transport(message)
            } else {
                Error::embedding(message)
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("failed to parse embedding response: {e}")))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(Error::embedding(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }

    async fn request_with_retry(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);

        (|| async { self.request(inputs).await })
            .retry(backoff)
            .when(|e: &Error| e.is_retryable())
            .notify(|err: &Error, dur: Duration| {
                log::warn!("Retrying embedding request in {dur:?}: {err}");
            })
            .await
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_with_retry(&[text])
            .await?
            .pop()
            .ok_or_else(|| Error::embedding("embedding API returned no vector"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            results.extend(self.request_with_retry(batch).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

// ============================================================================
// Tests
// ============================================================================
