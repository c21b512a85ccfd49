//! LanceDB vector index backend.
//!
//! Persists vector records in a LanceDB table and answers similarity
//! queries with cosine distance.
//!
//! # Schema
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `back_ref` | Utf8 | Source record id (all operations filter on it) |
//! | `write_id` | Utf8 | Write that produced the row |
//! | `chunk_index` | UInt32 | Chunk position |
//! | `chunk_count` | UInt32 | Chunks for this back-ref |
//! | `text` | Utf8 | Chunk text |
//! | `metadata` | Utf8 | JSON-serialized [`VectorMetadata`] |
//! | `vector` | FixedSizeList<Float32> | Embedding vector |
//!
//! # Feature Gate
//!
//! This module requires the `vector-lancedb` feature.
//!
//! # Replacing a back-ref
//!
//! New rows are added under a fresh `write_id` before the back-ref's older
//! rows are deleted. A failed add leaves the previous rows in place. A
//! failed cleanup leaves both sets until the next write of that back-ref.

use crate::index::{VectorIndex, rank, validate_records};
use crate::types::{PatchOutcome, SearchHit, VectorMetadata, VectorRecord};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tandem_core::{Error, Result, Scalar};
use tokio::sync::Mutex;

/// LanceDB-backed vector index.
///
/// Writes for one back-ref are an add followed by a cleanup delete; a
/// write lock keeps those pairs from interleaving.
pub struct LancedbVectorIndex {
    table: lancedb::Table,
    table_name: String,
    dimension: usize,
    write_lock: Mutex<()>,
    write_seq: AtomicU64,
}

impl LancedbVectorIndex {
    /// Open (or create) the vector table at `db_path`.
    pub async fn open(db_path: &str, table_name: &str, dimension: usize) -> Result<Self> {
        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .map_err(|e| Error::operation(format!("Failed to connect to LanceDB: {e}")))?;

        let existing = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::operation(format!("Failed to list LanceDB tables: {e}")))?;

        let table = if existing.iter().any(|name| name == table_name) {
            log::info!("Opening LanceDB table '{table_name}' at {db_path}");
            connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| Error::operation(format!("Failed to open table: {e}")))?
        } else {
            log::info!("Creating LanceDB table '{table_name}' at {db_path}");
            connection
                .create_empty_table(table_name, make_schema(dimension as i32))
                .execute()
                .await
                .map_err(|e| Error::operation(format!("Failed to create LanceDB table: {e}")))?
        };

        Ok(Self {
            table,
            table_name: table_name.to_string(),
            dimension,
            write_lock: Mutex::new(()),
            write_seq: AtomicU64::new(0),
        })
    }

    fn next_write_id(&self) -> String {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        format!("{nanos:020}-{seq:010}")
    }

    async fn fetch(&self, back_ref: &str) -> Result<Vec<VectorRecord>> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(back_ref_filter(back_ref))
            .execute()
            .await
            .map_err(|e| Error::operation(format!("LanceDB query failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::operation(format!("Failed to collect results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(parse_records(batch)?);
        }
        records.sort_by_key(|r| r.chunk_index);
        Ok(records)
    }

    async fn replace(&self, back_ref: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return self.delete_rows(&back_ref_filter(back_ref)).await;
        }

        let write_id = self.next_write_id();
        let batch = build_record_batch(records, &write_id, self.dimension as i32)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| Error::operation(format!("LanceDB add failed: {e}")))?;

        self.delete_rows(&superseded_filter(back_ref, &write_id))
            .await
    }

    async fn delete_rows(&self, filter: &str) -> Result<()> {
        self.table
            .delete(filter)
            .await
            .map_err(|e| Error::operation(format!("LanceDB delete failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LancedbVectorIndex {
    async fn upsert(&self, back_ref: &str, records: Vec<VectorRecord>) -> Result<()> {
        validate_records(back_ref, &records, self.dimension)?;
        let _guard = self.write_lock.lock().await;
        self.replace(back_ref, &records).await
    }

    async fn patch_metadata(
        &self,
        back_ref: &str,
        fields: &BTreeMap<String, Scalar>,
    ) -> Result<PatchOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.fetch(back_ref).await?;
        if records.is_empty() {
            return Ok(PatchOutcome::NotIndexed);
        }

        let touched = records
            .iter_mut()
            .filter(|record| record.metadata.apply_patch(fields) > 0)
            .count();
        if touched > 0 {
            self.replace(back_ref, &records).await?;
        }
        Ok(PatchOutcome::Patched(touched))
    }

    async fn delete_by_back_ref(&self, back_ref: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let existing = self
            .table
            .count_rows(Some(back_ref_filter(back_ref)))
            .await
            .map_err(|e| Error::operation(format!("LanceDB count failed: {e}")))?;
        if existing > 0 {
            self.delete_rows(&back_ref_filter(back_ref)).await?;
        }
        Ok(existing)
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Error::invalid_data(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = self
            .table
            .vector_search(query.to_vec())
            .map_err(|e| Error::operation(format!("Failed to create vector search: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| Error::operation(format!("Vector search failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::operation(format!("Failed to collect results: {e}")))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(parse_hits(batch)?);
        }
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| Error::operation(format!("LanceDB count failed: {e}")))
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

impl std::fmt::Debug for LancedbVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LancedbVectorIndex")
            .field("table", &self.table_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

fn back_ref_filter(back_ref: &str) -> String {
    format!("back_ref = '{}'", back_ref.replace('\'', "''"))
}

/// Rows of `back_ref` written before `write_id`.
fn superseded_filter(back_ref: &str, write_id: &str) -> String {
    format!("{} AND write_id != '{write_id}'", back_ref_filter(back_ref))
}

// ============================================================================
// Arrow schema and batch construction
// ============================================================================

/// Create the Arrow schema for the vector table.
fn make_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("back_ref", DataType::Utf8, false),
        Field::new("write_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("chunk_count", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

/// Build an Arrow RecordBatch from vector records.
fn build_record_batch(
    records: &[VectorRecord],
    write_id: &str,
    dimension: i32,
) -> Result<RecordBatch> {
    let schema = make_schema(dimension);

    let back_refs: Vec<&str> = records.iter().map(|r| r.back_ref.as_str()).collect();
    let write_ids: Vec<&str> = vec![write_id; records.len()];
    let chunk_indexes: Vec<u32> = records.iter().map(|r| r.chunk_index as u32).collect();
    let chunk_counts: Vec<u32> = records.iter().map(|r| r.chunk_count as u32).collect();
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    let metadata = records
        .iter()
        .map(|r| serde_json::to_string(&r.metadata))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

    let values: Vec<f32> = records
        .iter()
        .flat_map(|r| r.embedding.iter().copied())
        .collect();
    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
        Arc::new(Float32Array::from(values)),
        None,
    )
    .map_err(|e| Error::operation(format!("Failed to create vector array: {e}")))?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(back_refs)),
            Arc::new(StringArray::from(write_ids)),
            Arc::new(UInt32Array::from(chunk_indexes)),
            Arc::new(UInt32Array::from(chunk_counts)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata_refs)),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| Error::operation(format!("Failed to create RecordBatch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::operation(format!("Missing '{name}' column in results")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::operation(format!("'{name}' column is not StringArray")))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::operation(format!("Missing '{name}' column in results")))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| Error::operation(format!("'{name}' column is not UInt32Array")))
}

fn parse_metadata(raw: &str) -> Result<VectorMetadata> {
    serde_json::from_str(raw)
        .map_err(|e| Error::invalid_data(format!("corrupt metadata column: {e}")))
}

/// Parse full vector records (including embeddings) from a RecordBatch.
fn parse_records(batch: &RecordBatch) -> Result<Vec<VectorRecord>> {
    let back_refs = string_column(batch, "back_ref")?;
    let chunk_indexes = u32_column(batch, "chunk_index")?;
    let chunk_counts = u32_column(batch, "chunk_count")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let vectors = batch
        .column_by_name("vector")
        .ok_or_else(|| Error::operation("Missing 'vector' column in results"))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| Error::operation("'vector' column is not FixedSizeListArray"))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row = vectors.value(i);
        let embedding = row
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| Error::operation("'vector' items are not Float32"))?
            .values()
            .to_vec();
        records.push(VectorRecord {
            back_ref: back_refs.value(i).to_string(),
            chunk_index: chunk_indexes.value(i) as usize,
            chunk_count: chunk_counts.value(i) as usize,
            text: texts.value(i).to_string(),
            embedding,
            metadata: parse_metadata(metadata.value(i))?,
        });
    }
    Ok(records)
}

/// Parse search hits from a RecordBatch.
fn parse_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let back_refs = string_column(batch, "back_ref")?;
    let chunk_indexes = u32_column(batch, "chunk_index")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        // Cosine distance is 1 - similarity.
        let distance = distances.map(|c| c.value(i)).unwrap_or(0.0);
        hits.push(SearchHit {
            back_ref: back_refs.value(i).to_string(),
            chunk_index: chunk_indexes.value(i) as usize,
            text: texts.value(i).to_string(),
            score: 1.0 - distance,
            metadata: parse_metadata(metadata.value(i))?,
        });
    }
    Ok(hits)
}

// ============================================================================
// Tests
// ============================================================================
