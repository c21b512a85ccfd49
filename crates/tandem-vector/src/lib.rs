//! Embedding and vector index infrastructure for Tandem.
//!
//! This crate turns source records into embedded vector records and stores
//! them in a pluggable index keyed by the source record id.
//!
//! # Features
//!
//! - `vector-lancedb`: Enable the persisted LanceDB index
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     tandem-vector                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TextBuilder trait                                          │
//! │  └── CanonicalTextBuilder ("Label: value | ...")            │
//! │  Chunker (word windows with overlap)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  └── OpenAiEmbeddingProvider (HTTP)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingPipeline (record -> VectorRecords)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorIndex trait                                          │
//! │  ├── MemoryVectorIndex (default)                            │
//! │  └── LancedbVectorIndex (feature: vector-lancedb)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_vector::{
//!     CanonicalTextBuilder, Chunker, EmbeddingPipeline, MemoryVectorIndex,
//!     MockEmbeddingProvider, Provenance, VectorIndex,
//! };
//! use std::sync::Arc;
//!
//! let pipeline = EmbeddingPipeline::new(
//!     Arc::new(MockEmbeddingProvider::new(64)),
//!     Arc::new(CanonicalTextBuilder::default()),
//!     Chunker::default(),
//! );
//! let index = MemoryVectorIndex::new(pipeline.dimension());
//!
//! let records = pipeline.embed_record(&record, Provenance::ChangeFeed).await?;
//! index.upsert(&record.id, records).await?;
//! ```

// Core modules (always available)
pub mod embedding;
pub mod index;
pub mod types;

// Text composition and embedding
pub mod chunk;
pub mod openai;
pub mod pipeline;
pub mod text;

// Construction from configuration
pub mod factory;

// Feature-gated backend modules
#[cfg(feature = "vector-lancedb")]
pub mod lancedb;

// Re-exports: core types
pub use types::{PatchOutcome, Provenance, SearchHit, VectorConfig, VectorMetadata, VectorRecord};

// Re-exports: traits
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, cosine_similarity};
pub use index::{MemoryVectorIndex, VectorIndex};
pub use text::{CanonicalTextBuilder, TextBuilder};

// Re-exports: pipeline
pub use chunk::Chunker;
pub use openai::OpenAiEmbeddingProvider;
pub use pipeline::EmbeddingPipeline;

// Re-exports: factory
pub use factory::{create_embedding_provider, create_vector_index};

// Feature-gated re-exports
#[cfg(feature = "vector-lancedb")]
pub use lancedb::LancedbVectorIndex;
