//! Common types for the vector module.
//!
//! These types are shared by every index backend and embedding provider,
//! and are always available regardless of feature flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tandem_core::Scalar;

// ============================================================================
// Configuration
// ============================================================================

/// Vector pipeline and index configuration.
///
/// Controls backend selection, embedding provider, chunking, and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Index backend: "memory" or "lancedb".
    pub backend: String,

    /// Embedding provider: "mock" or "openai".
    pub provider: String,

    /// Embedding model name (e.g., "text-embedding-3-small").
    pub model: String,

    /// Embedding dimension. Taken from the provider when 0.
    pub dimension: usize,

    /// Base URL for OpenAI-compatible embedding endpoints.
    pub base_url: String,

    /// API key for the embedding provider (falls back to `OPENAI_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout for the embedding provider, in seconds.
    pub timeout_secs: u64,

    /// Attempts per embedding request, including the first.
    pub max_attempts: u32,

    /// Path to the LanceDB database directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    /// Name of the vector table / similarity index.
    pub table: String,

    /// Words per chunk.
    pub chunk_size: usize,

    /// Words shared between consecutive chunks.
    pub chunk_overlap: usize,

    /// Maximum texts per embedding batch.
    pub batch_size: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            provider: "mock".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 0,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_attempts: 3,
            db_path: None,
            table: "vector_index".to_string(),
            chunk_size: 256,
            chunk_overlap: 32,
            batch_size: 64,
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Where a vector record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Produced by the change-feed watcher.
    ChangeFeed,
    /// Produced by a full backfill of the primary store.
    Backfill,
}

impl Provenance {
    /// Tag stored in metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeFeed => "change-feed",
            Self::Backfill => "backfill",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored with every vector record.
///
/// `provenance`, `display` and `passthrough` are always present; `extra`
/// holds anything else a backend or provider wants to keep (model name,
/// indexing timestamp).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Provenance tag, see [`Provenance`].
    pub provenance: String,

    /// Display fields copied from the source record.
    #[serde(default)]
    pub display: BTreeMap<String, Scalar>,

    /// Passthrough fields copied from the source record.
    #[serde(default)]
    pub passthrough: BTreeMap<String, Scalar>,

    /// Provider- or backend-specific extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Scalar>,
}

impl VectorMetadata {
    /// Create metadata with the given provenance.
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance: provenance.as_str().to_string(),
            ..Default::default()
        }
    }

    /// Set the display fields.
    pub fn with_display(mut self, display: BTreeMap<String, Scalar>) -> Self {
        self.display = display;
        self
    }

    /// Set the passthrough fields.
    pub fn with_passthrough(mut self, passthrough: BTreeMap<String, Scalar>) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Add an extra key-value pair.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look a key up in passthrough, then display, then extra.
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.passthrough
            .get(key)
            .or_else(|| self.display.get(key))
            .or_else(|| self.extra.get(key))
    }

    /// Overwrite passthrough keys, returning how many values changed.
    pub fn apply_patch(&mut self, fields: &BTreeMap<String, Scalar>) -> usize {
        let mut changed = 0;
        for (key, value) in fields {
            if self.passthrough.get(key) != Some(value) {
                self.passthrough.insert(key.clone(), value.clone());
                changed += 1;
            }
        }
        changed
    }
}

// ============================================================================
// Records
// ============================================================================

/// A derived record: one chunk of one source record, with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Id of the source record this was derived from.
    pub back_ref: String,

    /// Position of this chunk within the source text.
    pub chunk_index: usize,

    /// Number of chunks the source text was split into.
    pub chunk_count: usize,

    /// Chunk text.
    pub text: String,

    /// Embedding vector.
    pub embedding: Vec<f32>,

    /// Metadata snapshot.
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// Identity of this record inside the index (`back_ref#chunk`).
    pub fn record_id(&self) -> String {
        format!("{}#{}", self.back_ref, self.chunk_index)
    }

    /// The embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A single similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source record id.
    pub back_ref: String,

    /// Chunk position.
    pub chunk_index: usize,

    /// Stored chunk text.
    pub text: String,

    /// Cosine similarity (-1.0 to 1.0, higher is more similar).
    pub score: f32,

    /// Metadata snapshot.
    pub metadata: VectorMetadata,
}

/// Result of a metadata patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The back-ref was indexed; this many vector records were touched.
    Patched(usize),
    /// Nothing indexed yet for this back-ref. Not an error.
    NotIndexed,
}

// ============================================================================
// Tests
// ============================================================================
