//! VectorIndex trait and the in-memory backend.
//!
//! Every operation is keyed by the back-reference id of the source record.
//! A back-ref owns a set of vector records (one per chunk); `upsert` always
//! replaces the whole set, so applying it twice leaves the same state.

use crate::embedding::cosine_similarity;
use crate::types::{PatchOutcome, SearchHit, VectorRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tandem_core::{Error, Result, Scalar};
use tokio::sync::RwLock;

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every record of `back_ref` with `records`.
    async fn upsert(&self, back_ref: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Overwrite passthrough metadata keys on every record of `back_ref`.
    ///
    /// Text and embeddings are untouched.
    async fn patch_metadata(
        &self,
        back_ref: &str,
        fields: &BTreeMap<String, Scalar>,
    ) -> Result<PatchOutcome>;

    /// Remove every record of `back_ref`, returning how many were removed.
    async fn delete_by_back_ref(&self, back_ref: &str) -> Result<usize>;

    /// Top-`k` records by cosine similarity, best first.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored vector records.
    async fn count(&self) -> Result<usize>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Check that every record belongs to `back_ref` and has `dimension` values.
pub(crate) fn validate_records(
    back_ref: &str,
    records: &[VectorRecord],
    dimension: usize,
) -> Result<()> {
    for record in records {
        if record.back_ref != back_ref {
            return Err(Error::invalid_data(format!(
                "record '{}' does not belong to back-ref '{back_ref}'",
                record.record_id()
            )));
        }
        if record.dimension() != dimension {
            return Err(Error::invalid_data(format!(
                "record '{}' has dimension {}, index expects {dimension}",
                record.record_id(),
                record.dimension()
            )));
        }
    }
    Ok(())
}

/// Sort hits best-first and keep the top `k`.
pub(crate) fn rank(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.back_ref.cmp(&b.back_ref))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    hits.truncate(k);
    hits
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory vector index with brute-force cosine search.
///
/// The whole map sits behind one `RwLock`, so upsert's delete-then-insert
/// is atomic with respect to readers.
pub struct MemoryVectorIndex {
    dimension: usize,
    records: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryVectorIndex {
    /// Create an empty index for embeddings of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Configured embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Clone of the records stored for `back_ref`.
    pub async fn records_for(&self, back_ref: &str) -> Vec<VectorRecord> {
        self.records
            .read()
            .await
            .get(back_ref)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, back_ref: &str, records: Vec<VectorRecord>) -> Result<()> {
        validate_records(back_ref, &records, self.dimension)?;
        let mut map = self.records.write().await;
        if records.is_empty() {
            map.remove(back_ref);
        } else {
            map.insert(back_ref.to_string(), records);
        }
        Ok(())
    }

    async fn patch_metadata(
        &self,
        back_ref: &str,
        fields: &BTreeMap<String, Scalar>,
    ) -> Result<PatchOutcome> {
        let mut map = self.records.write().await;
        match map.get_mut(back_ref) {
            Some(records) => {
                let mut touched = 0;
                for record in records.iter_mut() {
                    if record.metadata.apply_patch(fields) > 0 {
                        touched += 1;
                    }
                }
                Ok(PatchOutcome::Patched(touched))
            }
            None => Ok(PatchOutcome::NotIndexed),
        }
    }

    async fn delete_by_back_ref(&self, back_ref: &str) -> Result<usize> {
        let removed = self.records.write().await.remove(back_ref);
        Ok(removed.map_or(0, |records| records.len()))
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Error::invalid_data(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let map = self.records.read().await;
        let hits = map
            .values()
            .flatten()
            .map(|record| SearchHit {
                back_ref: record.back_ref.clone(),
                chunk_index: record.chunk_index,
                text: record.text.clone(),
                score: cosine_similarity(query, &record.embedding),
                metadata: record.metadata.clone(),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.values().map(Vec::len).sum())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVectorIndex")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
