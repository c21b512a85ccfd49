//! Keeps the vector index in step with the primary store.
//!
//! ```text
//! PrimaryStore ──change feed──► ChangeFeedWatcher ──classify──┐
//!                                                             │
//!            ┌──────────── Embed ──► DebounceScheduler ──fire─┤
//!            │                                                ▼
//!            ├──────────── Patch ─────────────────────────► Reindexer ──► VectorIndex
//!            └──────────── Delete ── cancel timer ────────────┘
//! ```
//!
//! - [`feed`]: change events and their classification
//! - [`store`]: the primary store capability and [`MemoryStore`]
//! - [`debounce`]: per-record coalescing timers
//! - [`indexer`]: fetch, embed, patch and delete against the index
//! - [`watcher`]: the feed consumer with reconnect backoff

pub mod debounce;
pub mod feed;
pub mod indexer;
pub mod store;
pub mod watcher;

pub use debounce::{DEFAULT_DEBOUNCE_DELAY, DebounceHandler, DebounceScheduler};
pub use feed::{Action, ChangeEvent, ChangeFeed, ChangeStream, classify};
pub use indexer::{BackfillStats, ReindexOutcome, Reindexer};
pub use store::{DEFAULT_FEED_CAPACITY, MemoryStore, PrimaryStore, load_seed_file};
pub use watcher::{ChangeFeedWatcher, SyncConfig, WatcherSnapshot, WatcherStats};
