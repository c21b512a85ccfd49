//! Answer composition: cache, retrieve, prompt, generate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tandem_core::{Error, Result};
use tandem_llm::{CompletionRequest, GenerationConfig, LlmProvider};
use tandem_vector::{EmbeddingPipeline, SearchHit, VectorIndex};
use tokio::time::Instant;

use crate::cache::RetrievalCache;
use crate::prompt::{DEFAULT_MAX_CONTEXT_CHARS, build_context, system_prompt};

/// Retrieval settings for answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Number of nearest vector records retrieved per query.
    pub top_k: usize,

    /// Upper bound on the context handed to the model, in characters.
    pub max_context_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

/// A record the answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    /// Source record id.
    pub id: String,

    /// Display name, when the record has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Best similarity score among the record's retrieved chunks.
    pub score: f32,
}

/// An answer to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The query as asked, trimmed.
    pub query: String,

    /// Generated answer text.
    pub answer: String,

    /// Wall time spent producing this response, in milliseconds.
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,

    /// Whether the answer came from the retrieval cache.
    pub cached: bool,

    /// Records retrieved for the answer, best first.
    pub sources: Vec<AnswerSource>,
}

/// Answers queries from the vector index through the generation provider.
pub struct AnswerComposer {
    pipeline: EmbeddingPipeline,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmProvider>,
    cache: Arc<RetrievalCache<Answer>>,
    config: AnswerConfig,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnswerComposer {
    /// Create a composer.
    pub fn new(
        pipeline: EmbeddingPipeline,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmProvider>,
        cache: Arc<RetrievalCache<Answer>>,
        config: AnswerConfig,
    ) -> Self {
        let generation = GenerationConfig::default();
        Self {
            pipeline,
            index,
            llm,
            cache,
            config,
            max_tokens: generation.max_tokens,
            temperature: Some(generation.temperature),
        }
    }

    /// Take `max_tokens` and `temperature` from the generation settings.
    pub fn with_generation(mut self, generation: &GenerationConfig) -> Self {
        self.max_tokens = generation.max_tokens;
        self.temperature = Some(generation.temperature);
        self
    }

    /// The answer cache.
    pub fn cache(&self) -> &Arc<RetrievalCache<Answer>> {
        &self.cache
    }

    /// Answer `query`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty query
    /// - whatever embedding or search of the query returned
    /// - [`Error::Generation`] when the provider failed; nothing is cached
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("query must not be empty"));
        }

        if let Some(mut answer) = self.cache.get(query)? {
            answer.cached = true;
            answer.query = query.to_string();
            answer.response_time_ms = elapsed_ms(started);
            tracing::debug!(query, "answer served from cache");
            return Ok(answer);
        }

        let vector = self.pipeline.embed(query).await?;
        let hits = self
            .index
            .similarity_search(&vector, self.config.top_k)
            .await?;
        let context = build_context(&hits, self.config.max_context_chars);

        let mut request =
            CompletionRequest::new(system_prompt(&context), query).with_max_tokens(self.max_tokens);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.llm.complete(request).await.map_err(|err| match err {
            Error::Generation { .. } => err,
            other => Error::generation_with_source("answer generation failed", other),
        })?;

        let answer = Answer {
            query: query.to_string(),
            answer: response.content.trim().to_string(),
            response_time_ms: elapsed_ms(started),
            cached: false,
            sources: sources(&hits),
        };
        self.cache.set(query, answer.clone())?;

        tracing::info!(
            query,
            hits = hits.len(),
            context_chars = context.chars().count(),
            tokens = response.tokens_used.total(),
            truncated = response.truncated,
            elapsed_ms = answer.response_time_ms,
            "answer generated"
        );
        Ok(answer)
    }
}

impl std::fmt::Debug for AnswerComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerComposer")
            .field("index", &self.index.name())
            .field("llm", &self.llm.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// One source per record, in rank order.
fn sources(hits: &[SearchHit]) -> Vec<AnswerSource> {
    let mut sources: Vec<AnswerSource> = Vec::new();
    for hit in hits {
        if sources.iter().any(|s| s.id == hit.back_ref) {
            continue;
        }
        sources.push(AnswerSource {
            id: hit.back_ref.clone(),
            name: hit.metadata.display.get("name").map(ToString::to_string),
            score: hit.score,
        });
    }
    sources
}
