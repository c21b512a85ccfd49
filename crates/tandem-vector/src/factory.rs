//! Construction of providers and indexes from configuration.

use crate::embedding::{EmbeddingProvider, MockEmbeddingProvider};
use crate::index::{MemoryVectorIndex, VectorIndex};
use crate::openai::OpenAiEmbeddingProvider;
use crate::types::VectorConfig;
use std::sync::Arc;
use tandem_core::{Error, Result};

/// Dimension used by the mock provider when none is configured.
pub const DEFAULT_MOCK_DIMENSION: usize = 256;

/// Build the embedding provider named by `config.provider`.
pub fn create_embedding_provider(config: &VectorConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "mock" => {
            let dimension = if config.dimension == 0 {
                DEFAULT_MOCK_DIMENSION
            } else {
                config.dimension
            };
            Ok(Arc::new(MockEmbeddingProvider::new(dimension)))
        }
        "openai" => Ok(Arc::new(OpenAiEmbeddingProvider::from_config(config)?)),
        other => Err(Error::config(format!(
            "unknown embedding provider '{other}' (expected 'mock' or 'openai')"
        ))),
    }
}

/// Build the vector index named by `config.backend`.
pub async fn create_vector_index(
    config: &VectorConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryVectorIndex::new(dimension))),
        #[cfg(feature = "vector-lancedb")]
        "lancedb" => {
            let path = config
                .db_path
                .as_deref()
                .ok_or_else(|| Error::config("vector.db_path is required for the lancedb backend"))?;
            Ok(Arc::new(
                crate::lancedb::LancedbVectorIndex::open(path, &config.table, dimension).await?,
            ))
        }
        #[cfg(not(feature = "vector-lancedb"))]
        "lancedb" => Err(Error::config(
            "the lancedb backend requires the 'vector-lancedb' feature",
        )),
        other => Err(Error::config(format!(
            "unknown vector backend '{other}' (expected 'memory' or 'lancedb')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_provider_default_dimension() {
        let provider = create_embedding_provider(&VectorConfig::default()).unwrap();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.dimension(), DEFAULT_MOCK_DIMENSION);
    }

    #[test]
    fn test_create_mock_provider_explicit_dimension() {
        let config = VectorConfig {
            dimension: 32,
            ..Default::default()
        };
        assert_eq!(create_embedding_provider(&config).unwrap().dimension(), 32);
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = VectorConfig {
            provider: "nope".into(),
            ..Default::default()
        };
        let err = create_embedding_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_create_memory_index() {
        let index = create_vector_index(&VectorConfig::default(), 8).await.unwrap();
        assert_eq!(index.name(), "memory");
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_unknown_backend() {
        let config = VectorConfig {
            backend: "faiss".into(),
            ..Default::default()
        };
        assert!(create_vector_index(&config, 8).await.is_err());
    }
}
