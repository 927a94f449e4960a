use std::fmt;
use std::sync::Arc;

use crate::error::CacheError;
use crate::invalidate::InvalidationPattern;
use crate::key::KeySpec;
use crate::metrics::MetricsSnapshot;
use crate::shared::CacheShared;
use crate::ttl::TtlClass;

/// A thread-safe, asynchronous response cache handle.
///
/// Handles are cheap to clone; every clone shares the same store, TTL
/// policy, flight registry and metrics. There is no global instance: an
/// application constructs its caches with
/// [`CacheBuilder`](crate::CacheBuilder) and passes handles to whatever
/// needs them, which is also what keeps tests isolated from each other.
pub struct Cache<V: Send + Sync + 'static> {
  pub(crate) shared: Arc<CacheShared<V>>,
}

impl<V: Send + Sync + 'static> Clone for Cache<V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<V: Send + Sync + 'static> Cache<V> {
  /// The primary read path: returns the cached value for `spec`, or runs
  /// the registered fetcher exactly once per miss and caches the result.
  ///
  /// Concurrent callers for the same key are coalesced onto one origin
  /// fetch and all receive the same result, success or failure. Failures
  /// are never cached; the next call after a failure starts a fresh fetch.
  /// The TTL is resolved by the cache's policy.
  pub async fn fetch(&self, spec: &KeySpec) -> Result<Arc<V>, CacheError> {
    CacheShared::fetch(&self.shared, spec, None).await
  }

  /// [`fetch`](Cache::fetch) with an explicit TTL class, for call sites
  /// that know better than the policy. The override applies only if this
  /// call's flight performs the fill.
  pub async fn fetch_with_ttl(&self, spec: &KeySpec, ttl: TtlClass) -> Result<Arc<V>, CacheError> {
    CacheShared::fetch(&self.shared, spec, Some(ttl)).await
  }

  /// A read-only lookup: never fetches, never extends a flight.
  ///
  /// `None` means the key has no live entry, whether absent, expired, or
  /// unreadable because the store is degraded.
  pub async fn get(&self, spec: &KeySpec) -> Option<Arc<V>> {
    self.shared.store.get(&spec.build_key()).await
  }

  /// Stores a value directly with the TTL the policy resolves for `spec`.
  ///
  /// Unlike the fetch path, a store failure here surfaces as
  /// [`CacheError::StoreUnavailable`]; a caller inserting by hand needs to
  /// know the write did not happen.
  pub async fn insert(&self, spec: &KeySpec, value: V) -> Result<(), CacheError> {
    let duration = self.shared.ttl_duration(spec, None);
    self
      .shared
      .store
      .set(&spec.build_key(), Arc::new(value), duration)
      .await
  }

  /// [`insert`](Cache::insert) with an explicit TTL class.
  pub async fn insert_with_ttl(
    &self,
    spec: &KeySpec,
    value: V,
    ttl: TtlClass,
  ) -> Result<(), CacheError> {
    let duration = self.shared.ttl_duration(spec, Some(ttl));
    self
      .shared
      .store
      .set(&spec.build_key(), Arc::new(value), duration)
      .await
  }

  /// Removes the single entry for `spec`. Idempotent; reports whether a
  /// live entry was removed.
  pub async fn remove(&self, spec: &KeySpec) -> Result<bool, CacheError> {
    self.shared.store.delete(&spec.build_key()).await
  }

  /// Deletes every key matching `pattern` and returns how many live
  /// entries were removed.
  ///
  /// Enumerate-then-delete, not atomic: a key written while the pass runs
  /// may survive it, bounded by its TTL. Invalidating a pattern that
  /// matches nothing is a no-op reporting 0.
  pub async fn invalidate(&self, pattern: &InvalidationPattern) -> Result<u64, CacheError> {
    self.shared.invalidate(pattern).await
  }

  /// Removes every entry in the store.
  pub async fn clear(&self) -> Result<(), CacheError> {
    self.shared.store.clear().await
  }

  /// Shuts the backing store down. In-flight fetches complete, but their
  /// write-through may fail; call once when the application is done with
  /// the cache.
  pub async fn close(&self) -> Result<(), CacheError> {
    self.shared.store.close().await
  }

  /// A point-in-time snapshot of the cache's counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }
}

impl<V: Send + Sync + 'static> fmt::Debug for Cache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("backend", &self.shared.store.backend_name())
      .field("fetch_timeout", &self.shared.fetch_timeout)
      .field("metrics", &self.shared.metrics.snapshot())
      .finish()
  }
}
