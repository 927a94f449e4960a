use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The boxed error type fetcher closures report their failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while assembling a cache with
/// [`CacheBuilder`](crate::CacheBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// No fetcher closure was registered. The cache cannot serve misses
  /// without one; use [`CacheBuilder::fetcher`](crate::CacheBuilder::fetcher).
  #[error("a fetcher must be registered before the cache can be built")]
  FetcherRequired,

  /// No task spawner was provided and the builder was not called from
  /// within a tokio runtime, so flight tasks would have nowhere to run.
  #[error("no task spawner was provided and no tokio runtime is current")]
  SpawnerRequired,
}

/// An I/O-level failure reported by a [`StoreBackend`](crate::StoreBackend)
/// implementation, tagged with the backend's name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} store: {message}")]
pub struct StoreError {
  backend: &'static str,
  message: String,
}

impl StoreError {
  /// Creates a store error attributed to the named backend.
  pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
    Self {
      backend,
      message: message.into(),
    }
  }

  /// The name of the backend that reported the failure.
  pub fn backend(&self) -> &'static str {
    self.backend
  }

  /// The backend's description of what went wrong.
  pub fn message(&self) -> &str {
    &self.message
  }
}

/// Errors surfaced by cache operations.
///
/// A miss is not an error; lookups express absence as `Option`. This type is
/// cheaply cloneable so that one fetch failure can be delivered to every
/// caller coalesced onto the same flight.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  /// The backing store failed a mutating operation (`set`, `delete`,
  /// `scan`, `clear`, `close`). Read failures never surface this; they
  /// degrade to a miss instead.
  #[error("cache store unavailable: {0}")]
  StoreUnavailable(#[from] StoreError),

  /// The origin fetch for a miss failed. The failure is fanned out to every
  /// waiter on the flight and nothing is cached; the next caller retries.
  #[error("origin fetch failed: {0}")]
  FetchFailed(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

  /// The origin fetch exceeded the configured bound and was abandoned.
  #[error("origin fetch timed out after {timeout:?}")]
  Timeout {
    /// The bound the fetch failed to meet.
    timeout: Duration,
  },
}

impl CacheError {
  pub(crate) fn fetch_failed(source: BoxError) -> Self {
    CacheError::FetchFailed(Arc::from(source))
  }

  /// Whether the error originated in the fetcher rather than the cache or
  /// its store.
  pub fn is_fetch_error(&self) -> bool {
    matches!(self, CacheError::FetchFailed(_) | CacheError::Timeout { .. })
  }
}
