//! The store plane: the substrate contract and the cache semantics layered
//! on top of it.
//!
//! [`StoreBackend`] is the narrow surface a key-value engine implements;
//! the crate ships [`memory::MemoryStore`] and anything with string keys,
//! byte-addressable values and per-key expiry (Redis, Memcached, a disk
//! table) can stand in behind the same trait. The internal [`Store`]
//! wrapper owns the failure semantics so backends do not have to: reads
//! degrade, mutations surface.

pub mod memory;

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{CacheError, StoreError};
use crate::key::CacheKey;
use crate::metrics::Metrics;

/// The substrate contract the cache runs over.
///
/// Implementations own expiry: `get` must treat an expired entry as absent
/// (and should reclaim it), and `scan` must not report expired keys. The
/// cache core never inspects entry timestamps itself, which is what lets a
/// remote store enforce expiry server-side.
#[async_trait]
pub trait StoreBackend<V>: Send + Sync
where
  V: Send + Sync + 'static,
{
  /// A short name for logs and error attribution (`"memory"`, `"redis"`).
  fn name(&self) -> &'static str;

  /// Reads a live entry. `None` covers both absent and expired keys.
  async fn get(&self, key: &CacheKey) -> Result<Option<Arc<V>>, StoreError>;

  /// Stores a value expiring at now + `ttl`, unconditionally replacing any
  /// existing entry.
  async fn set(&self, key: &CacheKey, value: Arc<V>, ttl: Duration) -> Result<(), StoreError>;

  /// Removes one entry. Idempotent; reports whether a live entry was
  /// actually removed.
  async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError>;

  /// Every currently live key starting with `prefix`, as a finite
  /// snapshot. Ordering is unspecified, and keys written while the scan
  /// runs may or may not appear.
  async fn scan(&self, prefix: &str) -> Result<Vec<CacheKey>, StoreError>;

  /// Removes every entry.
  async fn clear(&self) -> Result<(), StoreError>;

  /// Releases backend resources. Called once at cache shutdown; operations
  /// after this may fail.
  async fn close(&self) -> Result<(), StoreError>;
}

/// Hashes a key with the given hasher state.
#[inline]
pub(crate) fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// The cache-facing store layer.
///
/// Enforces the crate's failure semantics over any backend: a failed read
/// logs, counts a bypass and degrades to a miss, because correctness never
/// depends on the cache being reachable. Failed mutations surface as
/// [`CacheError::StoreUnavailable`], because silently dropping a write or a
/// delete could serve stale data indefinitely. Also the single place cache
/// traffic counters are maintained.
pub(crate) struct Store<V: Send + Sync + 'static> {
  backend: Arc<dyn StoreBackend<V>>,
  metrics: Arc<Metrics>,
}

impl<V: Send + Sync + 'static> Store<V> {
  pub(crate) fn new(backend: Arc<dyn StoreBackend<V>>, metrics: Arc<Metrics>) -> Self {
    Self { backend, metrics }
  }

  /// Cache-semantics read: a hit, a miss, or a degraded miss.
  pub(crate) async fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
    match self.backend.get(key).await {
      Ok(Some(value)) => {
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
      }
      Ok(None) => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
      Err(err) => {
        warn!(
          backend = self.backend.name(),
          key = %key,
          error = %err,
          "store read failed, bypassing cache"
        );
        self.metrics.store_read_bypass.fetch_add(1, Ordering::Relaxed);
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  /// A metrics-neutral read used by flight tasks to re-check the store
  /// before fetching. Degrades like `get`, but represents no caller
  /// traffic, so the hit and miss counters stay untouched.
  pub(crate) async fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
    match self.backend.get(key).await {
      Ok(found) => found,
      Err(err) => {
        warn!(
          backend = self.backend.name(),
          key = %key,
          error = %err,
          "store re-check failed, fetching from origin"
        );
        self.metrics.store_read_bypass.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  pub(crate) async fn set(
    &self,
    key: &CacheKey,
    value: Arc<V>,
    ttl: Duration,
  ) -> Result<(), CacheError> {
    match self.backend.set(key, value, ttl).await {
      Ok(()) => {
        self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
      }
      Err(err) => {
        self.metrics.store_write_failures.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::StoreUnavailable(err))
      }
    }
  }

  pub(crate) async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
    match self.backend.delete(key).await {
      Ok(removed) => {
        if removed {
          self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
      }
      Err(err) => {
        self.metrics.store_write_failures.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::StoreUnavailable(err))
      }
    }
  }

  pub(crate) async fn scan(&self, prefix: &str) -> Result<Vec<CacheKey>, CacheError> {
    match self.backend.scan(prefix).await {
      Ok(keys) => Ok(keys),
      Err(err) => {
        self.metrics.store_write_failures.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::StoreUnavailable(err))
      }
    }
  }

  pub(crate) async fn clear(&self) -> Result<(), CacheError> {
    match self.backend.clear().await {
      Ok(()) => Ok(()),
      Err(err) => {
        self.metrics.store_write_failures.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::StoreUnavailable(err))
      }
    }
  }

  pub(crate) async fn close(&self) -> Result<(), CacheError> {
    self.backend.close().await.map_err(CacheError::StoreUnavailable)
  }

  pub(crate) fn backend_name(&self) -> &'static str {
    self.backend.name()
  }
}
