//! Embedding pipeline: source record to vector records.
//!
//! Composes canonical text with a [`TextBuilder`], splits it with a
//! [`Chunker`], embeds every chunk in one batch and checks the returned
//! dimension against the index dimension. Provider failures are returned
//! as-is; the pipeline never retries on its own.

use crate::chunk::Chunker;
use crate::embedding::EmbeddingProvider;
use crate::text::TextBuilder;
use crate::types::{Provenance, VectorRecord};
use std::sync::Arc;
use tandem_core::{Error, Result, SourceRecord};

/// Record-to-vector pipeline.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    builder: Arc<dyn TextBuilder>,
    chunker: Chunker,
    dimension: usize,
}

impl EmbeddingPipeline {
    /// Create a pipeline. The expected dimension is the provider's.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        builder: Arc<dyn TextBuilder>,
        chunker: Chunker,
    ) -> Self {
        let dimension = provider.dimension();
        Self {
            provider,
            builder,
            chunker,
            dimension,
        }
    }

    /// The dimension every produced embedding must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The embedding provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// The text builder.
    pub fn builder(&self) -> &Arc<dyn TextBuilder> {
        &self.builder
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.provider.embed(text).await?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    /// Embed several texts, in input order.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.provider.embed_batch(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "provider '{}' returned {} embeddings for {} texts",
                self.provider.name(),
                embeddings.len(),
                texts.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }

    /// Build the full set of vector records for one source record.
    pub async fn embed_record(
        &self,
        record: &SourceRecord,
        provenance: Provenance,
    ) -> Result<Vec<VectorRecord>> {
        let text = self.builder.build_text(record);
        let chunks = self.chunker.split(&text);
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let embeddings = self.embed_batch(&refs).await?;

        let metadata = self
            .builder
            .build_metadata(record, provenance)
            .with_extra("model", self.provider.name())
            .with_extra("indexed_at", chrono::Utc::now().to_rfc3339());

        let chunk_count = chunks.len();
        let records = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (text, embedding))| VectorRecord {
                back_ref: record.id.clone(),
                chunk_index,
                chunk_count,
                text,
                embedding,
                metadata: metadata.clone(),
            })
            .collect();

        log::debug!(
            "Embedded record '{}' into {} chunk(s) via {}",
            record.id,
            chunk_count,
            self.provider.name()
        );
        Ok(records)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::embedding(format!(
                "dimension mismatch: expected {}, provider '{}' returned {}",
                self.dimension,
                self.provider.name(),
                embedding.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("provider", &self.provider.name())
            .field("builder", &self.builder.name())
            .field("chunker", &self.chunker)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::text::CanonicalTextBuilder;
    use async_trait::async_trait;
    use tandem_core::Scalar;

    fn pipeline_with(provider: Arc<MockEmbeddingProvider>, chunker: Chunker) -> EmbeddingPipeline {
        EmbeddingPipeline::new(
            provider,
            Arc::new(CanonicalTextBuilder::default()),
            chunker,
        )
    }

    fn corolla() -> SourceRecord {
        SourceRecord::new("car-1")
            .with_field("name", "Corolla")
            .with_field("brand", "Toyota")
            .with_field("price", 20000i64)
    }

    #[tokio::test]
    async fn test_embed_record_single_chunk() {
        let provider = Arc::new(MockEmbeddingProvider::new(16));
        let pipeline = pipeline_with(Arc::clone(&provider), Chunker::default());

        let records = pipeline
            .embed_record(&corolla(), Provenance::ChangeFeed)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.back_ref, "car-1");
        assert_eq!(record.chunk_count, 1);
        assert_eq!(record.dimension(), 16);
        assert!(record.text.starts_with("Name: Corolla | Brand: Toyota"));
        assert_eq!(record.metadata.provenance, "change-feed");
        assert_eq!(record.metadata.passthrough["price"], Scalar::Integer(20000));
        assert_eq!(record.metadata.extra["model"], Scalar::from("mock"));
        assert!(record.metadata.extra.contains_key("indexed_at"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_embed_record_multiple_chunks_share_back_ref() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let pipeline = pipeline_with(Arc::clone(&provider), Chunker::new(4, 1).unwrap());
        let record = corolla().with_field("description", "one two three four five six seven");

        let records = pipeline
            .embed_record(&record, Provenance::Backfill)
            .await
            .unwrap();

        assert!(records.len() > 1);
        assert!(records.iter().all(|r| r.back_ref == "car-1"));
        assert!(records.iter().all(|r| r.chunk_count == records.len()));
        let indexes: Vec<usize> = records.iter().map(|r| r.chunk_index).collect();
        assert_eq!(indexes, (0..records.len()).collect::<Vec<_>>());
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.texts_embedded(), records.len());
    }

    #[tokio::test]
    async fn test_embed_record_provider_failure() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        provider.set_failing(true);
        let pipeline = pipeline_with(provider, Chunker::default());

        let err = pipeline
            .embed_record(&corolla(), Provenance::ChangeFeed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    struct WrongDimension;

    #[async_trait]
    impl EmbeddingProvider for WrongDimension {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 3])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "wrong"
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let pipeline = EmbeddingPipeline::new(
            Arc::new(WrongDimension),
            Arc::new(CanonicalTextBuilder::default()),
            Chunker::default(),
        );

        let err = pipeline.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));

        let err = pipeline
            .embed_record(&corolla(), Provenance::ChangeFeed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn test_pipeline_debug() {
        let pipeline = pipeline_with(Arc::new(MockEmbeddingProvider::new(4)), Chunker::default());
        let debug = format!("{pipeline:?}");
        assert!(debug.contains("mock"));
        assert!(debug.contains("canonical"));
    }
}
