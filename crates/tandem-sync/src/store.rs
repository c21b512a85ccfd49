//! Primary record store capability and the in-process implementation.
//!
//! [`PrimaryStore`] is the CRUD surface plus a [`ChangeFeed`]. Every write
//! that changes something publishes exactly one [`ChangeEvent`] after it is
//! committed; writes that change nothing publish nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tandem_core::{Error, RecordSchema, Resource, Result, Scalar, SourceRecord};
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::feed::{ChangeEvent, ChangeFeed, ChangeStream};

/// Default number of events a subscriber may fall behind before it is
/// disconnected.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// CRUD access to the primary collection.
#[async_trait]
pub trait PrimaryStore: ChangeFeed + Resource {
    /// Fetch one record by id.
    async fn fetch(&self, id: &str) -> Result<Option<SourceRecord>>;

    /// All records, ordered by id.
    async fn list(&self) -> Result<Vec<SourceRecord>>;

    /// Create a record. A missing id gets a fresh UUID.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if required fields are missing, a passthrough
    /// field has the wrong type, or the id is taken.
    async fn insert(
        &self,
        id: Option<String>,
        fields: BTreeMap<String, Scalar>,
    ) -> Result<SourceRecord>;

    /// Overwrite some fields of an existing record.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the record does not exist,
    /// [`Error::Validation`] on a passthrough type mismatch.
    async fn update(&self, id: &str, patch: BTreeMap<String, Scalar>) -> Result<SourceRecord>;

    /// Delete a record, returning whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// In-process primary store with a broadcast change feed.
///
/// Subscribers that fall more than the channel capacity behind get a
/// transport error and are expected to resubscribe.
pub struct MemoryStore {
    schema: RecordSchema,
    records: RwLock<BTreeMap<String, SourceRecord>>,
    feed: Mutex<Option<broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(schema: RecordSchema) -> Self {
        Self::with_capacity(schema, DEFAULT_FEED_CAPACITY)
    }

    /// Create an empty store whose feed buffers `capacity` events.
    pub fn with_capacity(schema: RecordSchema, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            schema,
            records: RwLock::new(BTreeMap::new()),
            feed: Mutex::new(Some(sender)),
            capacity,
        }
    }

    /// Create a store and load the seed file, if one is given.
    pub async fn open(schema: RecordSchema, seed_path: Option<&Path>) -> Result<Self> {
        let store = Self::new(schema);
        if let Some(path) = seed_path {
            let records = load_seed_file(path).await?;
            let count = store.seed(records).await?;
            tracing::info!(path = %path.display(), records = count, "seeded primary store");
        }
        Ok(store)
    }

    /// Load records without publishing change events.
    pub async fn seed(&self, records: Vec<SourceRecord>) -> Result<usize> {
        for record in &records {
            self.schema.validate(record)?;
        }
        let mut map = self.records.write().await;
        let count = records.len();
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    /// The schema records are validated against.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Drop every live subscription; their streams end. New subscriptions
    /// are accepted afterwards.
    pub fn disconnect_subscribers(&self) -> Result<()> {
        let mut feed = self.lock_feed()?;
        if feed.is_some() {
            let (sender, _) = broadcast::channel(self.capacity);
            *feed = Some(sender);
        }
        Ok(())
    }

    fn lock_feed(&self) -> Result<std::sync::MutexGuard<'_, Option<broadcast::Sender<ChangeEvent>>>> {
        self.feed
            .lock()
            .map_err(|_| Error::operation("change feed lock poisoned"))
    }

    fn ensure_open(&self) -> Result<()> {
        match self.lock_feed()?.as_ref() {
            Some(_) => Ok(()),
            None => Err(Error::closed("primary store")),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    fn publish(&self, event: ChangeEvent) -> Result<()> {
        if let Some(sender) = self.lock_feed()?.as_ref() {
            let _ = sender.send(event);
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self) -> Result<ChangeStream> {
        let receiver = self
            .lock_feed()?
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| Error::closed("primary store"))?;

        let stream = BroadcastStream::new(receiver).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(missed)| {
                Error::transport(format!("change feed subscriber lagged by {missed} events"))
            })
        });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl Resource for MemoryStore {
    fn resource_name(&self) -> &str {
        "memory-store"
    }

    async fn close(&self) -> Result<()> {
        self.lock_feed()?.take();
        Ok(())
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn fetch(&self, id: &str) -> Result<Option<SourceRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<SourceRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn insert(
        &self,
        id: Option<String>,
        fields: BTreeMap<String, Scalar>,
    ) -> Result<SourceRecord> {
        self.ensure_open()?;
        if fields.contains_key("id") {
            return Err(Error::validation("'id' cannot be set as a field"));
        }
        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record = SourceRecord { id, fields };
        self.schema.validate(&record)?;

        let mut map = self.records.write().await;
        if map.contains_key(&record.id) {
            return Err(Error::validation(format!(
                "record '{}' already exists",
                record.id
            )));
        }
        map.insert(record.id.clone(), record.clone());
        self.publish(ChangeEvent::Insert {
            id: record.id.clone(),
            record: record.clone(),
        })?;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: BTreeMap<String, Scalar>) -> Result<SourceRecord> {
        self.ensure_open()?;
        if patch.contains_key("id") {
            return Err(Error::validation("the 'id' field cannot be updated"));
        }
        let mut map = self.records.write().await;
        let current = map
            .get(id)
            .ok_or_else(|| Error::not_found(format!("record '{id}'")))?;

        let mut updated = current.clone();
        let changed: BTreeSet<String> = updated.merge(patch);
        if changed.is_empty() {
            return Ok(updated);
        }
        self.schema.validate(&updated)?;

        map.insert(id.to_string(), updated.clone());
        self.publish(ChangeEvent::Update {
            id: id.to_string(),
            changed_fields: changed,
            record: Some(updated.clone()),
        })?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let mut map = self.records.write().await;
        if map.remove(id).is_none() {
            return Ok(false);
        }
        self.publish(ChangeEvent::Delete { id: id.to_string() })?;
        Ok(true)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collection", &self.schema.collection)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Read a JSON array of records.
pub async fn load_seed_file(path: &Path) -> Result<Vec<SourceRecord>> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| {
        Error::invalid_data(format!("invalid seed file {}: {e}", path.display()))
    })
}
