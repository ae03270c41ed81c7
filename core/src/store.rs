//! Error taxonomy and helpers shared by persistence collaborators.
//!
//! The booking engine never talks to a database directly. It talks to narrow
//! store traits whose mutating calls are compare-and-swap writes keyed on a
//! [`Version`]. Whatever backs those traits reports failures as a [`StoreError`].
//!
//! # Dyn Compatibility
//!
//! Store traits use explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so they can be shared as `Arc<dyn Store>` between services. [`StoreFuture`]
//! names that shape.

use crate::version::Version;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by dyn-compatible store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// Another writer committed to the same document between our read and our write.
    #[error("Concurrency conflict on {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The document key where the conflict occurred.
        key: String,
        /// The version we expected the document to be at.
        expected: Version,
        /// The actual current version of the document.
        actual: Version,
    },

    /// Document not found.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its deadline. The write may or may not
    /// have been applied; callers must reconcile before retrying.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this error means "you lost a race, re-read and try again".
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Bound a store call by `timeout`.
///
/// # Errors
///
/// Returns the store's own error, or [`StoreError::Timeout`] if the call did not
/// finish in time.
///
/// # Examples
///
/// ```
/// use courtbook_core::store::{with_timeout, StoreError};
/// use std::time::Duration;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// let result = rt.block_on(with_timeout(Duration::from_millis(50), async {
///     Ok::<_, StoreError>(7)
/// }));
/// assert_eq!(result, Ok(7));
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "Store call exceeded its deadline");
            Err(StoreError::Timeout(timeout))
        }
    }
}
