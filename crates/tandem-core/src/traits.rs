//! Core traits for Tandem's external collaborators.
//!
//! The primary trait is [`Resource`], implemented by anything that holds a
//! connection to the outside world and must be closed on shutdown.

use async_trait::async_trait;

use crate::Result;

/// A connection-holding collaborator with an explicit shutdown.
///
/// # Bounds
///
/// - `Send + Sync`: resources are shared across tasks behind an `Arc`
/// - `'static`: resources outlive any single request
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use tandem_core::{Resource, Result};
///
/// struct Pool;
///
/// #[async_trait]
/// impl Resource for Pool {
///     fn resource_name(&self) -> &str {
///         "pool"
///     }
///
///     async fn close(&self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Name used in logs.
    fn resource_name(&self) -> &str;

    /// Release the underlying connection.
    ///
    /// Called at most once by [`SharedHandle::close`](crate::SharedHandle::close).
    async fn close(&self) -> Result<()>;
}
