use std::{future::Future, pin::Pin};

/// A trait for spawning the cache's detached flight tasks onto an
/// asynchronous runtime.
///
/// Flights run detached from the caller that triggered them, so a waiter
/// timing out or being dropped can never cancel a fetch other waiters are
/// still counting on.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// A [`TaskSpawner`] backed by a tokio runtime handle.
pub struct TokioSpawner(tokio::runtime::Handle);

impl TokioSpawner {
  /// Creates a spawner that uses the current tokio runtime context.
  /// Panics if called outside of a tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates a spawner from an explicit runtime handle, for callers that
  /// build caches off the runtime thread.
  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }

  /// Creates a spawner from the current context, if one exists.
  pub(crate) fn try_new() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }
}

impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.0.spawn(future);
  }
}
