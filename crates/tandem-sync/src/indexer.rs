//! Applying primary-store state to the vector index.
//!
//! The [`Reindexer`] owns the three index-side operations the watcher needs
//! (re-embed, patch, remove) plus a full backfill. Index writes for one
//! record id go through that id's gate, so a re-embed that read the record
//! before a concurrent patch or delete cannot overwrite the newer state.
//! Writes for different ids never wait on each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use tandem_core::{Error, RecordSchema, Result, Scalar, SharedHandle, SourceRecord};
use tandem_vector::{EmbeddingPipeline, PatchOutcome, Provenance, VectorIndex};
use tokio::sync::OwnedMutexGuard;

use crate::debounce::DebounceHandler;
use crate::store::PrimaryStore;

/// Result of re-embedding one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// The record was embedded into this many chunks.
    Indexed(usize),
    /// The record no longer exists; its vectors were removed.
    Missing,
}

/// Counts from a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    /// Records embedded and upserted.
    pub indexed: usize,
    /// Records that disappeared between listing and embedding.
    pub skipped: usize,
    /// Records whose embedding or upsert failed.
    pub failed: usize,
}

impl BackfillStats {
    /// Records looked at.
    pub fn total(&self) -> usize {
        self.indexed + self.skipped + self.failed
    }
}

/// One async lock per record id, dropped from the map once nobody holds it.
#[derive(Default)]
struct WriteGates {
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteGates {
    fn map(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>>> {
        self.gates
            .lock()
            .map_err(|_| Error::operation("write gate map lock poisoned"))
    }

    async fn acquire(&self, id: &str) -> Result<GateGuard<'_>> {
        let gate = Arc::clone(self.map()?.entry(id.to_string()).or_default());
        let guard = gate.lock_owned().await;
        Ok(GateGuard {
            gates: self,
            id: id.to_string(),
            guard: Some(guard),
        })
    }

    fn len(&self) -> usize {
        self.map().map_or(0, |gates| gates.len())
    }
}

struct GateGuard<'a> {
    gates: &'a WriteGates,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Clones are only taken under the map lock, so a count of one here
        // means no other task holds or waits on this gate.
        if let Ok(mut gates) = self.gates.map() {
            if gates.get(&self.id).is_some_and(|gate| Arc::strong_count(gate) == 1) {
                gates.remove(&self.id);
            }
        }
    }
}

/// Keeps the vector index in step with the primary store.
pub struct Reindexer {
    store: SharedHandle<dyn PrimaryStore>,
    pipeline: EmbeddingPipeline,
    index: Arc<dyn VectorIndex>,
    schema: RecordSchema,
    gates: WriteGates,
}

impl Reindexer {
    /// Create a reindexer.
    pub fn new(
        store: SharedHandle<dyn PrimaryStore>,
        pipeline: EmbeddingPipeline,
        index: Arc<dyn VectorIndex>,
        schema: RecordSchema,
    ) -> Self {
        Self {
            store,
            pipeline,
            index,
            schema,
            gates: WriteGates::default(),
        }
    }

    /// The vector index this reindexer writes to.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// The record schema.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Number of record ids with a write in progress or waiting.
    pub fn active_writes(&self) -> usize {
        self.gates.len()
    }

    /// Fetch the record fresh, embed it and replace its vectors.
    ///
    /// The embedding call runs outside the record's gate. Inside the gate the
    /// record is read once more: if it vanished the vectors are removed,
    /// otherwise the latest passthrough and display values are stamped on
    /// before the upsert.
    pub async fn reindex(&self, id: &str, provenance: Provenance) -> Result<ReindexOutcome> {
        let store = self.store.get().await?;
        let Some(record) = store.fetch(id).await? else {
            return self.remove_missing(id).await;
        };

        let mut records = self.pipeline.embed_record(&record, provenance).await?;

        let gate = self.gates.acquire(id).await?;
        let Some(latest) = store.fetch(id).await? else {
            drop(gate);
            return self.remove_missing(id).await;
        };
        let passthrough = self.schema.passthrough_values(&latest);
        let display = self.schema.display_values(&latest);
        for record in &mut records {
            record.metadata.passthrough = passthrough.clone();
            record.metadata.display = display.clone();
        }

        let chunks = records.len();
        self.index.upsert(id, records).await?;
        drop(gate);
        tracing::info!(record_id = id, chunks, provenance = %provenance, "record indexed");
        Ok(ReindexOutcome::Indexed(chunks))
    }

    async fn remove_missing(&self, id: &str) -> Result<ReindexOutcome> {
        let removed = self.remove(id).await?;
        tracing::debug!(record_id = id, removed, "record gone before embedding");
        Ok(ReindexOutcome::Missing)
    }

    /// Patch the passthrough metadata of `id` without re-embedding.
    ///
    /// Values come from `record` when the feed delivered it, otherwise from
    /// a fresh fetch. A record that was deleted meanwhile is a no-op.
    pub async fn patch(
        &self,
        id: &str,
        fields: &[String],
        record: Option<SourceRecord>,
    ) -> Result<PatchOutcome> {
        let record = match record {
            Some(record) => record,
            None => match self.store.get().await?.fetch(id).await? {
                Some(record) => record,
                None => return Ok(PatchOutcome::NotIndexed),
            },
        };

        let values: BTreeMap<String, Scalar> = fields
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        if values.is_empty() {
            return Ok(PatchOutcome::Patched(0));
        }

        let _gate = self.gates.acquire(id).await?;
        let outcome = self.index.patch_metadata(id, &values).await?;
        match outcome {
            PatchOutcome::Patched(touched) => {
                tracing::info!(record_id = id, ?fields, touched, "metadata patched");
            }
            PatchOutcome::NotIndexed => {
                tracing::debug!(record_id = id, ?fields, "patch skipped, record not indexed yet");
            }
        }
        Ok(outcome)
    }

    /// Remove every vector of `id`. Absence is success.
    pub async fn remove(&self, id: &str) -> Result<usize> {
        let _gate = self.gates.acquire(id).await?;
        let removed = self.index.delete_by_back_ref(id).await?;
        tracing::info!(record_id = id, removed, "record vectors removed");
        Ok(removed)
    }

    /// Embed every record currently in the store.
    ///
    /// Per-record failures are counted, not returned; only failing to list
    /// the store aborts the run.
    pub async fn backfill(&self) -> Result<BackfillStats> {
        let ids: Vec<String> = self
            .store
            .get()
            .await?
            .list()
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let mut stats = BackfillStats::default();
        for id in &ids {
            match self.reindex(id, Provenance::Backfill).await {
                Ok(ReindexOutcome::Indexed(_)) => stats.indexed += 1,
                Ok(ReindexOutcome::Missing) => stats.skipped += 1,
                Err(err) => {
                    stats.failed += 1;
                    tracing::warn!(record_id = %id, error = %err, "backfill failed for record");
                }
            }
        }
        tracing::info!(
            indexed = stats.indexed,
            skipped = stats.skipped,
            failed = stats.failed,
            "backfill complete"
        );
        Ok(stats)
    }
}

#[async_trait]
impl DebounceHandler for Reindexer {
    async fn fire(&self, record_id: &str) -> Result<()> {
        self.reindex(record_id, Provenance::ChangeFeed).await.map(|_| ())
    }
}

impl std::fmt::Debug for Reindexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reindexer")
            .field("store", &self.store)
            .field("pipeline", &self.pipeline)
            .field("index", &self.index.name())
            .finish()
    }
}
