//! Shared, lazily-opened resource handles.
//!
//! Provides [`SharedHandle<T>`], a cloneable handle to one external
//! connection (the primary store, in practice). The connection is opened on
//! first use, shared by every clone, and closed exactly once by whoever owns
//! the process lifecycle.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tandem_core::{Resource, Result, SharedHandle};
//!
//! struct Db;
//!
//! #[async_trait]
//! impl Resource for Db {
//!     fn resource_name(&self) -> &str { "db" }
//!     async fn close(&self) -> Result<()> { Ok(()) }
//! }
//!
//! # tokio_test_block_on(async {
//! let handle: SharedHandle<Db> = SharedHandle::new("db", || async { Ok(Arc::new(Db)) });
//! assert!(!handle.is_open());
//! let db = handle.get().await?;
//! assert!(handle.is_open());
//! handle.close().await?;
//! assert!(handle.get().await.is_err());
//! # drop(db);
//! # Ok::<(), tandem_core::Error>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::traits::Resource;
use crate::{Error, Result};

type Opener<T> = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<T>>> + Send + Sync>;

/// Thread-safe shared handle to a lazily-opened resource.
///
/// Cloning is cheap (Arc clone) and every clone sees the same connection.
/// Concurrent first calls to [`get`](Self::get) run the opener once.
pub struct SharedHandle<T: ?Sized + Resource> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: ?Sized> {
    name: String,
    cell: OnceCell<Arc<T>>,
    opener: Opener<T>,
    closed: AtomicBool,
}

impl<T: ?Sized + Resource> SharedHandle<T> {
    /// Create a handle that opens the resource with `opener` on first use.
    pub fn new<F, Fut>(name: impl Into<String>, opener: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                cell: OnceCell::new(),
                opener: Box::new(move || Box::pin(opener()) as BoxFuture<'static, Result<Arc<T>>>),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a handle around a resource that is already open.
    pub fn ready(name: impl Into<String>, resource: Arc<T>) -> Self {
        let name = name.into();
        let reopen_name = name.clone();
        Self {
            inner: Arc::new(Inner {
                name,
                cell: OnceCell::new_with(Some(resource)),
                opener: Box::new(move || {
                    let name = reopen_name.clone();
                    Box::pin(async move {
                        Err(Error::operation(format!("{name} cannot be reopened")))
                    }) as BoxFuture<'static, Result<Arc<T>>>
                }),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the resource, opening it if this is the first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close), or whatever
    /// the opener returned if opening failed (the next call retries).
    pub async fn get(&self) -> Result<Arc<T>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::closed(self.inner.name.clone()));
        }
        let resource = self
            .inner
            .cell
            .get_or_try_init(|| async {
                log::info!("Opening shared resource '{}'", self.inner.name);
                (self.inner.opener)().await
            })
            .await?;
        Ok(Arc::clone(resource))
    }

    /// Whether the resource has been opened and not closed.
    pub fn is_open(&self) -> bool {
        self.inner.cell.initialized() && !self.inner.closed.load(Ordering::Acquire)
    }

    /// The handle name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Close the resource. Idempotent; later `get` calls fail.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.inner.cell.get() {
            Some(resource) => {
                log::info!("Closing shared resource '{}'", self.inner.name);
                resource.close().await
            }
            None => Ok(()),
        }
    }
}

impl<T: ?Sized + Resource> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized + Resource> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("name", &self.inner.name)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Counted {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resource for Counted {
        fn resource_name(&self) -> &str {
            "counted"
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted_handle() -> (SharedHandle<Counted>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let (o, c) = (Arc::clone(&opens), Arc::clone(&closes));
        let handle = SharedHandle::new("counted", move || {
            let o = Arc::clone(&o);
            let c = Arc::clone(&c);
            async move {
                o.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Counted { closes: c }))
            }
        });
        (handle, opens, closes)
    }

    #[tokio::test]
    async fn test_handle_opens_lazily_once() {
        let (handle, opens, _) = counted_handle();
        assert!(!handle.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        let a = handle.get().await.unwrap();
        let b = handle.clone().get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_handle_concurrent_first_use() {
        let (handle, opens, _) = counted_handle();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.get().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_close_is_idempotent() {
        let (handle, _, closes) = counted_handle();
        handle.get().await.unwrap();
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!handle.is_open());
        assert!(matches!(handle.get().await, Err(Error::Closed(_))));
    }

    #[tokio::test]
    async fn test_handle_close_unopened() {
        let (handle, opens, closes) = counted_handle();
        handle.close().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_failed_open_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&attempts);
        let closes = Arc::new(AtomicUsize::new(0));
        let handle: SharedHandle<Counted> = SharedHandle::new("flaky", move || {
            let a = Arc::clone(&a);
            let closes = Arc::clone(&closes);
            async move {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::transport("connection refused"))
                } else {
                    Ok(Arc::new(Counted { closes }))
                }
            }
        });
        assert!(handle.get().await.is_err());
        assert!(handle.get().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handle_ready() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = SharedHandle::ready(
            "ready",
            Arc::new(Counted {
                closes: Arc::clone(&closes),
            }),
        );
        assert!(handle.is_open());
        assert!(handle.get().await.is_ok());
        handle.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_debug() {
        let (handle, _, _) = counted_handle();
        let debug = format!("{handle:?}");
        assert!(debug.contains("counted"));
    }
}
