//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! embedding generation backends (OpenAI-compatible HTTP, local mocks).
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic hashed bag-of-words vectors for testing
//! - `OpenAiEmbeddingProvider`: OpenAI-compatible `/embeddings` endpoint

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tandem_core::{Error, Result};

/// Trait for generating text embeddings.
///
/// Implementations wrap specific embedding services and provide a uniform
/// async interface. The trait requires `Send + Sync` to allow sharing
/// across the watcher, debounce timers and request handlers.
///
/// Retries, if any, are the provider's own business: callers treat an
/// error as final for that record.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, in input order.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Hashes each lowercase alphanumeric token into one of `dimension` buckets
/// and unit-normalizes the counts, so texts sharing words score closer.
/// Counts its calls and can be switched into a failing mode.
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
    texts: AtomicUsize,
    failing: AtomicBool,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Number of `embed` / `embed_batch` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of individual texts embedded so far.
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record_call(&self, texts: usize) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::embedding("mock provider set to fail"));
        }
        self.texts.fetch_add(texts, Ordering::SeqCst);
        Ok(())
    }

    /// Generate a deterministic embedding from text.
    fn hashed_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimension;
            embedding[bucket] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.record_call(1)?;
        Ok(self.hashed_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.record_call(texts.len())?;
        Ok(texts.iter().map(|t| self.hashed_embedding(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Cosine similarity of two vectors; 0.0 when either is all zeros or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(384);
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_embed_single() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider.embed("hello world").await.unwrap();

        assert_eq!(embedding.len(), 8);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic_and_case_insensitive() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider.embed("Toyota Corolla").await.unwrap();
        let e2 = provider.embed("toyota corolla").await.unwrap();

        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_shared_words_score_higher() {
        let provider = MockEmbeddingProvider::new(64);
        let query = provider.embed("which toyota do you have").await.unwrap();
        let toyota = provider.embed("Name: Corolla | Brand: Toyota").await.unwrap();
        let honda = provider.embed("Name: Civic | Brand: Honda").await.unwrap();

        assert!(cosine_similarity(&query, &toyota) > cosine_similarity(&query, &honda));
    }

    #[tokio::test]
    async fn test_mock_embed_batch_counts() {
        let provider = MockEmbeddingProvider::new(8);
        let embeddings = provider.embed_batch(&["a", "b", "c"]).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.texts_embedded(), 3);
    }

    #[tokio::test]
    async fn test_mock_embed_empty_text_is_zero_vector() {
        let provider = MockEmbeddingProvider::new(4);
        let embedding = provider.embed("").await.unwrap();
        assert_eq!(embedding, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn test_mock_failing_mode() {
        let provider = MockEmbeddingProvider::new(4);
        provider.set_failing(true);
        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));

        provider.set_failing(false);
        assert!(provider.embed("x").await.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
