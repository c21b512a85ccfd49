//! Per-record debounce of re-embedding work.
//!
//! Each record id has at most one pending timer. Scheduling again replaces
//! the timer, so a burst of edits produces one firing after the burst goes
//! quiet. A timer that has fired is no longer pending and cannot be
//! cancelled; its work runs to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{Error, Result, SourceRecord};
use tokio::task::JoinHandle;

/// Default quiet period before a record is re-embedded.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(2);

/// Work run when a record's timer fires.
#[async_trait]
pub trait DebounceHandler: Send + Sync + 'static {
    /// Handle the record. Must read fresh state itself; errors are logged.
    async fn fire(&self, record_id: &str) -> Result<()>;
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    pending: HashMap<String, Pending>,
}

/// Coalesces rapid schedules of the same record id.
pub struct DebounceScheduler {
    delay: Duration,
    handler: Arc<dyn DebounceHandler>,
    timers: Arc<Mutex<Timers>>,
}

impl DebounceScheduler {
    /// Create a scheduler firing `handler` after `delay` of quiet.
    pub fn new(delay: Duration, handler: Arc<dyn DebounceHandler>) -> Self {
        Self {
            delay,
            handler,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    /// The configured quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start (or restart) the timer for `record_id`.
    ///
    /// `payload` is only used for logging: the handler always re-reads the
    /// record when the timer fires.
    pub fn schedule(&self, record_id: &str, payload: Option<&SourceRecord>) -> Result<()> {
        let mut timers = lock(&self.timers)?;
        timers.next_generation += 1;
        let generation = timers.next_generation;

        let replaced = timers.pending.remove(record_id).map(|old| old.handle.abort());
        tracing::debug!(
            record_id,
            generation,
            replaced = replaced.is_some(),
            name = ?payload.and_then(|r| r.get("name")),
            "debounce scheduled"
        );

        let id = record_id.to_string();
        let delay = self.delay;
        let handler = Arc::clone(&self.handler);
        let map = Arc::clone(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !take_if_current(&map, &id, generation) {
                return;
            }
            tracing::debug!(record_id = %id, generation, "debounce fired");
            if let Err(err) = handler.fire(&id).await {
                tracing::error!(record_id = %id, error = %err, "debounced reindex failed");
            }
        });

        timers
            .pending
            .insert(record_id.to_string(), Pending { generation, handle });
        Ok(())
    }

    /// Drop the pending timer for `record_id`, returning whether one existed.
    pub fn cancel(&self, record_id: &str) -> Result<bool> {
        let cancelled = lock(&self.timers)?
            .pending
            .remove(record_id)
            .map(|pending| pending.handle.abort())
            .is_some();
        if cancelled {
            tracing::debug!(record_id, "debounce cancelled");
        }
        Ok(cancelled)
    }

    /// Number of record ids with a pending timer.
    pub fn pending(&self) -> usize {
        lock(&self.timers).map_or(0, |timers| timers.pending.len())
    }

    /// Whether `record_id` has a pending timer.
    pub fn is_pending(&self, record_id: &str) -> bool {
        lock(&self.timers).is_ok_and(|timers| timers.pending.contains_key(record_id))
    }

    /// Cancel every pending timer, returning how many were dropped.
    pub fn shutdown(&self) -> usize {
        match lock(&self.timers) {
            Ok(mut timers) => {
                let count = timers.pending.len();
                for (_, pending) in timers.pending.drain() {
                    pending.handle.abort();
                }
                count
            }
            Err(_) => 0,
        }
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("delay", &self.delay)
            .field("pending", &self.pending())
            .finish()
    }
}

fn lock(timers: &Mutex<Timers>) -> Result<MutexGuard<'_, Timers>> {
    timers
        .lock()
        .map_err(|_| Error::operation("debounce map lock poisoned"))
}

/// Remove the entry for `id` if it still belongs to `generation`.
fn take_if_current(timers: &Mutex<Timers>, id: &str, generation: u64) -> bool {
    let Ok(mut timers) = lock(timers) else {
        return false;
    };
    match timers.pending.get(id) {
        Some(pending) if pending.generation == generation => {
            timers.pending.remove(id);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DebounceHandler for Recorder {
        async fn fire(&self, record_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fired.lock().unwrap().push(record_id.to_string());
            Ok(())
        }
    }

    fn scheduler() -> (DebounceScheduler, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let scheduler = DebounceScheduler::new(
            DEFAULT_DEBOUNCE_DELAY,
            Arc::clone(&recorder) as Arc<dyn DebounceHandler>,
        );
        (scheduler, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (scheduler, recorder) = scheduler();
        scheduler.schedule("car-1", None).unwrap();
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_schedules_coalesce() {
        let (scheduler, recorder) = scheduler();
        for _ in 0..5 {
            scheduler.schedule("car-1", None).unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending("car-1"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.fired.lock().unwrap(), vec!["car-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_ids_fire_independently() {
        let (scheduler, recorder) = scheduler();
        scheduler.schedule("car-1", None).unwrap();
        scheduler.schedule("car-2", None).unwrap();
        assert_eq!(scheduler.pending(), 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let mut fired = recorder.fired.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, vec!["car-1".to_string(), "car-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (scheduler, recorder) = scheduler();
        scheduler.schedule("car-1", None).unwrap();
        assert!(scheduler.cancel("car-1").unwrap());
        assert!(!scheduler.cancel("car-1").unwrap());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_all_timers() {
        let (scheduler, recorder) = scheduler();
        scheduler.schedule("car-1", None).unwrap();
        scheduler.schedule("car-2", None).unwrap();
        assert_eq!(scheduler.shutdown(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    struct Failing;

    #[async_trait]
    impl DebounceHandler for Failing {
        async fn fire(&self, _record_id: &str) -> Result<()> {
            Err(Error::embedding("provider down"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_is_contained() {
        let scheduler = DebounceScheduler::new(Duration::from_millis(10), Arc::new(Failing));
        scheduler.schedule("car-1", None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.pending(), 0);

        scheduler.schedule("car-1", None).unwrap();
        assert_eq!(scheduler.pending(), 1);
    }
}
