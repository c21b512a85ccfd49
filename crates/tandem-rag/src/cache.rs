//! Retrieval cache: normalized query to answer, with a fixed TTL.
//!
//! Expiry is absolute and set at insertion. Reads remove expired entries
//! lazily; [`spawn_sweeper`] removes the rest on an interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_core::{Error, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime, in seconds.
    pub ttl_secs: u64,

    /// Interval between background sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval, never zero.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Canonical cache key for a query: trimmed, lowercased, with every run of
/// whitespace collapsed to one space.
pub fn normalize_key(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// TTL map keyed by normalized query.
pub struct RetrievalCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> RetrievalCache<V> {
    /// Create an empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `query`. An expired entry is removed and reported absent.
    pub fn get(&self, query: &str) -> Result<Option<V>> {
        let key = normalize_key(query);
        let mut entries = self.lock()?;
        let now = Instant::now();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&key);
                tracing::debug!(key = %key, "cache entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store `value` under `query`, replacing any previous entry and
    /// restarting its lifetime.
    pub fn set(&self, query: &str, value: V) -> Result<()> {
        let key = normalize_key(query);
        let expires_at = Instant::now() + self.ttl;
        self.lock()?.insert(key, Entry { value, expires_at });
        Ok(())
    }

    /// Remove every expired entry, returning how many went.
    pub fn sweep(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Number of entries, expired ones included until read or swept.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry<V>>>> {
        self.entries
            .lock()
            .map_err(|_| Error::operation("retrieval cache lock poisoned"))
    }
}

impl<V> std::fmt::Debug for RetrievalCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Run [`RetrievalCache::sweep`] every `interval` until `shutdown` flips to
/// `true` or its sender is dropped.
pub fn spawn_sweeper<V>(
    cache: Arc<RetrievalCache<V>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => match cache.sweep() {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "cache swept"),
                    Err(err) => tracing::warn!(error = %err, "cache sweep failed"),
                },
            }
        }
        tracing::debug!("cache sweeper stopped");
    })
}
