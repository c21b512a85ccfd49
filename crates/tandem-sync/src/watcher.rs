//! Change-feed watcher.
//!
//! Consumes the primary store's change feed, routes each event to the
//! debounce scheduler or straight to the reindexer, and resubscribes with
//! exponential backoff when the subscription fails or ends.
//!
//! Patches and deletes are awaited inline, so for one record they are
//! applied in feed order. Embedding work happens in debounce timers and
//! never blocks the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tandem_core::{Error, Result, SharedHandle};
use tandem_vector::PatchOutcome;
use tokio::sync::watch;

use crate::debounce::DebounceScheduler;
use crate::feed::{Action, ChangeEvent, ChangeFeed, classify};
use crate::indexer::Reindexer;
use crate::store::PrimaryStore;

/// Reconnect and debounce settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a record is re-embedded, in milliseconds.
    pub debounce_ms: u64,

    /// First reconnect delay, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Upper bound on the reconnect delay, in milliseconds.
    pub max_reconnect_delay_ms: u64,

    /// Consecutive failed subscriptions tolerated before giving up.
    /// Unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnects: Option<usize>,

    /// Run a full backfill before watching.
    pub backfill_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            max_reconnects: None,
            backfill_on_start: true,
        }
    }
}

impl SyncConfig {
    /// Debounce delay as a duration.
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn backoff(&self) -> ExponentialBackoff {
        let min = Duration::from_millis(self.reconnect_delay_ms.max(1));
        let max = Duration::from_millis(self.max_reconnect_delay_ms).max(min);
        ExponentialBuilder::default()
            .with_min_delay(min)
            .with_max_delay(max)
            .with_factor(2.0)
            .with_max_times(self.max_reconnects.unwrap_or(usize::MAX))
            .build()
    }
}

/// Counters exposed by a running watcher.
#[derive(Debug, Default)]
pub struct WatcherStats {
    events: AtomicU64,
    event_errors: AtomicU64,
    reconnects: AtomicU64,
    embeds_scheduled: AtomicU64,
    patches: AtomicU64,
    patches_deferred: AtomicU64,
    deletes: AtomicU64,
    ignored: AtomicU64,
}

/// Point-in-time copy of [`WatcherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSnapshot {
    /// Events taken off the feed.
    pub events: u64,
    /// Events whose handling failed.
    pub event_errors: u64,
    /// Subscriptions re-established after a failure.
    pub reconnects: u64,
    /// Inserts and text updates handed to the debounce scheduler.
    pub embeds_scheduled: u64,
    /// Passthrough-only updates patched in place.
    pub patches: u64,
    /// Passthrough-only updates that arrived before the record's first
    /// embed. The embed stamps their values.
    pub patches_deferred: u64,
    /// Deletes applied.
    pub deletes: u64,
    /// Updates that touched nothing indexed.
    pub ignored: u64,
}

impl WatcherStats {
    /// Copy the counters.
    pub fn snapshot(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            events: self.events.load(Ordering::Relaxed),
            event_errors: self.event_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            embeds_scheduled: self.embeds_scheduled.load(Ordering::Relaxed),
            patches: self.patches.load(Ordering::Relaxed),
            patches_deferred: self.patches_deferred.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Long-running consumer of the change feed.
pub struct ChangeFeedWatcher {
    store: SharedHandle<dyn PrimaryStore>,
    reindexer: Arc<Reindexer>,
    debounce: Arc<DebounceScheduler>,
    config: SyncConfig,
    stats: Arc<WatcherStats>,
    subscribed: watch::Sender<bool>,
}

impl ChangeFeedWatcher {
    /// Create a watcher. Embedding work goes through `debounce`, whose
    /// handler should be the same `reindexer`.
    pub fn new(
        store: SharedHandle<dyn PrimaryStore>,
        reindexer: Arc<Reindexer>,
        debounce: Arc<DebounceScheduler>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            reindexer,
            debounce,
            config,
            stats: Arc::new(WatcherStats::default()),
            subscribed: watch::channel(false).0,
        }
    }

    /// Resolve once the feed has been subscribed at least once.
    ///
    /// Writes made after this returns are seen by the watcher.
    pub async fn wait_subscribed(&self) {
        let mut rx = self.subscribed.subscribe();
        // The sender lives in `self`, so this only ends when subscribed.
        let _ = rx.wait_for(|subscribed| *subscribed).await;
    }

    /// Whether the feed has been subscribed at least once.
    pub fn is_subscribed(&self) -> bool {
        *self.subscribed.borrow()
    }

    /// Shared counters, readable while [`run`](Self::run) is going.
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Consume the feed until `shutdown` flips to `true` (or its sender is
    /// dropped).
    ///
    /// # Errors
    ///
    /// Only when `max_reconnects` consecutive subscriptions failed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut backoff = self.config.backoff();
        let mut failures = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.subscribe().await {
                Ok(mut stream) => {
                    tracing::info!("change feed subscribed");
                    self.subscribed.send_replace(true);
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                tracing::info!("change feed watcher stopping");
                                return Ok(());
                            }
                            next = stream.next() => match next {
                                Some(Ok(event)) => {
                                    backoff = self.config.backoff();
                                    failures = 0;
                                    self.handle_event(event).await;
                                }
                                Some(Err(err)) => {
                                    tracing::warn!(error = %err, "change feed failed");
                                    break;
                                }
                                None => {
                                    tracing::warn!("change feed ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "change feed subscribe failed");
                }
            }

            failures += 1;
            let Some(delay) = backoff.next() else {
                return Err(Error::transport(format!(
                    "change feed unavailable after {failures} consecutive failures"
                )));
            };
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to change feed");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            WatcherStats::bump(&self.stats.reconnects);
        }

        tracing::info!("change feed watcher stopping");
        Ok(())
    }

    async fn subscribe(&self) -> Result<crate::feed::ChangeStream> {
        let store = self.store.get().await?;
        store.subscribe().await
    }

    /// Route one event. Errors are logged and counted, never returned.
    pub async fn handle_event(&self, event: ChangeEvent) {
        WatcherStats::bump(&self.stats.events);
        let id = event.id().to_string();
        let kind = event.kind();

        if let Err(err) = self.apply(event).await {
            WatcherStats::bump(&self.stats.event_errors);
            tracing::error!(record_id = %id, kind, error = %err, "change event failed");
        }
    }

    async fn apply(&self, event: ChangeEvent) -> Result<()> {
        match classify(self.reindexer.schema(), event) {
            Action::Embed { id, hint } => {
                self.debounce.schedule(&id, hint.as_ref())?;
                WatcherStats::bump(&self.stats.embeds_scheduled);
            }
            Action::Patch { id, fields, record } => {
                match self.reindexer.patch(&id, &fields, record).await? {
                    PatchOutcome::Patched(_) => WatcherStats::bump(&self.stats.patches),
                    PatchOutcome::NotIndexed => WatcherStats::bump(&self.stats.patches_deferred),
                }
            }
            Action::Delete { id } => {
                self.debounce.cancel(&id)?;
                self.reindexer.remove(&id).await?;
                WatcherStats::bump(&self.stats.deletes);
            }
            Action::Ignore { id } => {
                tracing::debug!(record_id = %id, "update touches no indexed field");
                WatcherStats::bump(&self.stats.ignored);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChangeFeedWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedWatcher")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::debounce::DebounceHandler;
    use crate::feed::ChangeStream;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use tandem_core::{RecordSchema, Resource, Scalar, SourceRecord};
    use tandem_vector::{
        CanonicalTextBuilder, Chunker, EmbeddingPipeline, MemoryVectorIndex,
        MockEmbeddingProvider, VectorIndex,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        provider: Arc<MockEmbeddingProvider>,
        index: Arc<MemoryVectorIndex>,
        watcher: Arc<ChangeFeedWatcher>,
        debounce: Arc<DebounceScheduler>,
        stop: watch::Sender<bool>,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    fn config() -> SyncConfig {
        SyncConfig {
            reconnect_delay_ms: 100,
            max_reconnect_delay_ms: 1000,
            ..Default::default()
        }
    }

    fn build(
        store_handle: SharedHandle<dyn PrimaryStore>,
        provider: Arc<MockEmbeddingProvider>,
        index: Arc<MemoryVectorIndex>,
        config: SyncConfig,
    ) -> (Arc<ChangeFeedWatcher>, Arc<DebounceScheduler>) {
        let pipeline = EmbeddingPipeline::new(
            provider as Arc<dyn tandem_vector::EmbeddingProvider>,
            Arc::new(CanonicalTextBuilder::default()),
            Chunker::default(),
        );
        let reindexer = Arc::new(Reindexer::new(
            store_handle.clone(),
            pipeline,
            index as Arc<dyn VectorIndex>,
            RecordSchema::catalog(),
        ));
        let debounce = Arc::new(DebounceScheduler::new(
            config.debounce_delay(),
            Arc::clone(&reindexer) as Arc<dyn DebounceHandler>,
        ));
        let watcher = Arc::new(ChangeFeedWatcher::new(
            store_handle,
            reindexer,
            Arc::clone(&debounce),
            config,
        ));
        (watcher, debounce)
    }

    async fn start() -> Harness {
        let store = Arc::new(MemoryStore::new(RecordSchema::catalog()));
        let provider = Arc::new(MockEmbeddingProvider::new(32));
        let index = Arc::new(MemoryVectorIndex::new(32));
        let handle = SharedHandle::ready("store", Arc::clone(&store) as Arc<dyn PrimaryStore>);
        let (watcher, debounce) = build(handle, Arc::clone(&provider), Arc::clone(&index), config());

        let (stop, rx) = watch::channel(false);
        let runner = Arc::clone(&watcher);
        let task = tokio::spawn(async move { runner.run(rx).await });
        watcher.wait_subscribed().await;

        Harness {
            store,
            provider,
            index,
            watcher,
            debounce,
            stop,
            task,
        }
    }

    fn fields(pairs: &[(&str, Scalar)]) -> BTreeMap<String, Scalar> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn corolla() -> BTreeMap<String, Scalar> {
        fields(&[
            ("name", Scalar::from("Corolla")),
            ("brand", Scalar::from("Toyota")),
            ("description", Scalar::from("Reliable compact sedan")),
            ("price", Scalar::Integer(20000)),
            ("in_stock", Scalar::Bool(true)),
        ])
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_is_embedded_once_after_debounce() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.debounce.pending(), 1);
        assert_eq!(h.index.count().await.unwrap(), 0);

        settle().await;
        assert_eq!(h.index.count().await.unwrap(), 1);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.watcher.stats().snapshot().embeds_scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_text_updates_coalesce() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        for i in 0..4 {
            tokio::time::sleep(Duration::from_millis(300)).await;
            h.store
                .update(
                    "car-1",
                    fields(&[("description", Scalar::from(format!("revision {i}")))]),
                )
                .await
                .unwrap();
        }
        settle().await;

        assert_eq!(h.provider.calls(), 1);
        let stored = h.index.records_for("car-1").await;
        assert!(stored[0].text.contains("revision 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passthrough_update_patches_without_embedding() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;
        let before = h.index.records_for("car-1").await;

        h.store
            .update("car-1", fields(&[("price", Scalar::Integer(18000))]))
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.provider.calls(), 1);
        let after = h.index.records_for("car-1").await;
        assert_eq!(after[0].embedding, before[0].embedding);
        assert_eq!(after[0].metadata.passthrough["price"], Scalar::Integer(18000));
        assert_eq!(after[0].metadata.passthrough["in_stock"], Scalar::Bool(true));
        assert_eq!(h.watcher.stats().snapshot().patches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_update_ignored() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;

        h.store
            .update("car-1", fields(&[("color", Scalar::from("red"))]))
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.watcher.stats().snapshot().ignored, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cleans_up_and_cancels_pending_embed() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;
        assert_eq!(h.index.count().await.unwrap(), 1);

        h.store
            .update("car-1", fields(&[("description", Scalar::from("changed"))]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.debounce.pending(), 1);

        h.store.delete("car-1").await.unwrap();
        settle().await;

        assert_eq!(h.debounce.pending(), 0);
        assert_eq!(h.index.count().await.unwrap(), 0);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.watcher.stats().snapshot().deletes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_price_price_description_embeds_once_with_final_price() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.store
            .update("car-1", fields(&[("price", Scalar::Integer(19500))]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.store
            .update("car-1", fields(&[("price", Scalar::Integer(19000))]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.store
            .update("car-1", fields(&[("description", Scalar::from("Low mileage"))]))
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.provider.calls(), 1);
        let stored = h.index.records_for("car-1").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].metadata.passthrough["price"], Scalar::Integer(19000));
        assert!(stored[0].text.contains("Low mileage"));

        // Both price updates landed before the first embed, which carries them.
        let stats = h.watcher.stats().snapshot();
        assert_eq!(stats.patches, 0);
        assert_eq!(stats.patches_deferred, 2);
        assert_eq!(stats.embeds_scheduled, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indexed_record_price_updates_patch_and_description_reembeds_once() {
        let h = start().await;
        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;
        assert_eq!(h.provider.calls(), 1);

        h.store
            .update("car-1", fields(&[("price", Scalar::Integer(19500))]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.store
            .update("car-1", fields(&[("price", Scalar::Integer(19000))]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let patched = h.index.records_for("car-1").await;
        assert_eq!(patched[0].metadata.passthrough["price"], Scalar::Integer(19000));

        h.store
            .update("car-1", fields(&[("description", Scalar::from("Low mileage"))]))
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.provider.calls(), 2);
        let stored = h.index.records_for("car-1").await;
        assert_eq!(stored[0].metadata.passthrough["price"], Scalar::Integer(19000));
        assert!(stored[0].text.contains("Low mileage"));

        let stats = h.watcher.stats().snapshot();
        assert_eq!(stats.patches, 2);
        assert_eq!(stats.patches_deferred, 0);
        assert_eq!(stats.embeds_scheduled, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_subscribed_waits_for_slow_store_open() {
        let store = Arc::new(MemoryStore::new(RecordSchema::catalog()));
        let opened = Arc::clone(&store);
        let handle: SharedHandle<dyn PrimaryStore> = SharedHandle::new("slow", move || {
            let store = Arc::clone(&opened);
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(store as Arc<dyn PrimaryStore>)
            }
        });
        let provider = Arc::new(MockEmbeddingProvider::new(32));
        let index = Arc::new(MemoryVectorIndex::new(32));
        let (watcher, _debounce) = build(handle, provider, Arc::clone(&index), config());

        let (_stop, rx) = watch::channel(false);
        let runner = Arc::clone(&watcher);
        tokio::spawn(async move { runner.run(rx).await });
        tokio::task::yield_now().await;
        assert!(!watcher.is_subscribed());

        let started = tokio::time::Instant::now();
        watcher.wait_subscribed().await;
        assert!(watcher.is_subscribed());
        assert!(started.elapsed() >= Duration::from_millis(400));

        // A write right after readiness reaches the index.
        store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_ends_run() {
        let h = start().await;
        h.stop.send(true).unwrap();
        let result = h.task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_disconnect() {
        let h = start().await;
        h.store.disconnect_subscribers().unwrap();
        // Past the first reconnect delay.
        tokio::time::sleep(Duration::from_millis(150)).await;

        h.store.insert(Some("car-1".into()), corolla()).await.unwrap();
        settle().await;

        assert_eq!(h.index.count().await.unwrap(), 1);
        assert_eq!(h.watcher.stats().snapshot().reconnects, 1);
    }

    /// Feed that replays scripted subscriptions, then fails to subscribe.
    struct ScriptedFeed {
        store: Arc<MemoryStore>,
        scripts: Mutex<VecDeque<Vec<Result<ChangeEvent>>>>,
        subscribes: AtomicU64,
    }

    #[async_trait]
    impl ChangeFeed for ScriptedFeed {
        async fn subscribe(&self) -> Result<ChangeStream> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(items) => Ok(futures::stream::iter(items).boxed()),
                None => Err(Error::transport("feed unreachable")),
            }
        }
    }

    #[async_trait]
    impl Resource for ScriptedFeed {
        fn resource_name(&self) -> &str {
            "scripted"
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PrimaryStore for ScriptedFeed {
        async fn fetch(&self, id: &str) -> Result<Option<SourceRecord>> {
            self.store.fetch(id).await
        }

        async fn list(&self) -> Result<Vec<SourceRecord>> {
            self.store.list().await
        }

        async fn insert(
            &self,
            id: Option<String>,
            fields: BTreeMap<String, Scalar>,
        ) -> Result<SourceRecord> {
            self.store.insert(id, fields).await
        }

        async fn update(
            &self,
            id: &str,
            patch: BTreeMap<String, Scalar>,
        ) -> Result<SourceRecord> {
            self.store.update(id, patch).await
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            self.store.delete(id).await
        }
    }

    fn insert_event(store_record: &SourceRecord) -> Result<ChangeEvent> {
        Ok(ChangeEvent::Insert {
            id: store_record.id.clone(),
            record: store_record.clone(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_error_reconnects_and_continues() {
        let store = Arc::new(MemoryStore::new(RecordSchema::catalog()));
        let a = store.insert(Some("car-a".into()), corolla()).await.unwrap();
        let b = store.insert(Some("car-b".into()), corolla()).await.unwrap();

        let feed = Arc::new(ScriptedFeed {
            store,
            scripts: Mutex::new(VecDeque::from([
                vec![insert_event(&a), Err(Error::transport("connection reset"))],
                vec![insert_event(&b)],
            ])),
            subscribes: AtomicU64::new(0),
        });
        let provider = Arc::new(MockEmbeddingProvider::new(32));
        let index = Arc::new(MemoryVectorIndex::new(32));
        let config = SyncConfig {
            max_reconnects: Some(3),
            ..config()
        };
        let handle = SharedHandle::ready("scripted", Arc::clone(&feed) as Arc<dyn PrimaryStore>);
        let (watcher, _debounce) = build(handle, provider, Arc::clone(&index), config);

        let (_stop, rx) = watch::channel(false);
        let result = watcher.run(rx).await;

        // Two scripted subscriptions, then three failed resubscribes.
        assert!(result.is_err());
        assert_eq!(feed.subscribes.load(Ordering::SeqCst), 5);
        let stats = watcher.stats().snapshot();
        assert_eq!(stats.events, 2);
        assert_eq!(stats.embeds_scheduled, 2);
        assert_eq!(stats.reconnects, 4);

        settle().await;
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delay_grows_exponentially() {
        let delays: Vec<Duration> = SyncConfig {
            reconnect_delay_ms: 100,
            max_reconnect_delay_ms: 500,
            max_reconnects: Some(5),
            ..Default::default()
        }
        .backoff()
        .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }
}
