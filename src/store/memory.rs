//! The built-in in-memory backend: sharded, expiry-aware, dependency-free.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};

use super::{hash_key, StoreBackend};
use crate::error::StoreError;
use crate::key::CacheKey;
use crate::time::Clock;

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
  /// Number of independently locked shards. Rounded up to a power of two
  /// so shard selection is a mask, not a modulo.
  pub shards: usize,
  /// Interval between background sweeps of expired entries. `None`
  /// disables the sweeper; lazy removal on read still applies.
  pub sweep_interval: Option<Duration>,
  /// The time source expiry decisions are made against.
  pub clock: Clock,
}

impl Default for MemoryStoreConfig {
  fn default() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      sweep_interval: Some(Duration::from_secs(60)),
      clock: Clock::system(),
    }
  }
}

struct StoredEntry<V> {
  value: Arc<V>,
  /// Absolute expiry, as a duration since the clock's epoch.
  expires_at: Duration,
}

impl<V> StoredEntry<V> {
  #[inline]
  fn is_expired(&self, now: Duration) -> bool {
    now >= self.expires_at
  }
}

type ShardMap<V> = HashMap<CacheKey, StoredEntry<V>, ahash::RandomState>;

struct Shards<V> {
  shards: Box<[CachePadded<RwLock<ShardMap<V>>>]>,
  hasher: ahash::RandomState,
  clock: Clock,
}

impl<V> Shards<V> {
  #[inline]
  fn shard_for(&self, key: &CacheKey) -> &RwLock<ShardMap<V>> {
    let hash = hash_key(&self.hasher, key);
    // The shard count is a power of two, so masking selects uniformly.
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }
}

/// A sharded, expiry-aware in-memory [`StoreBackend`].
///
/// Entries carry an absolute expiry and are removed lazily when a read
/// finds them dead; an optional background sweeper reclaims entries that
/// are never read again. All operations are infallible in practice, which
/// makes this store the reference for the trait's semantics as well as the
/// default substrate.
pub struct MemoryStore<V> {
  inner: Arc<Shards<V>>,
  sweeper: Option<Sweeper>,
}

impl<V: Send + Sync + 'static> MemoryStore<V> {
  /// A store with default configuration.
  pub fn new() -> Self {
    Self::with_config(MemoryStoreConfig::default())
  }

  /// A store with explicit sharding, sweeping and clock choices.
  pub fn with_config(config: MemoryStoreConfig) -> Self {
    let shard_count = config.shards.max(1).next_power_of_two();
    let hasher = ahash::RandomState::new();

    let mut shards = Vec::with_capacity(shard_count);
    for _ in 0..shard_count {
      shards.push(CachePadded::new(RwLock::new(ShardMap::with_hasher(
        hasher.clone(),
      ))));
    }

    let inner = Arc::new(Shards {
      shards: shards.into_boxed_slice(),
      hasher,
      clock: config.clock,
    });
    let sweeper = config
      .sweep_interval
      .map(|interval| Sweeper::spawn(inner.clone(), interval));

    Self { inner, sweeper }
  }

  /// The number of live entries, counted under per-shard read locks.
  pub fn len(&self) -> usize {
    let now = self.inner.clock.now();
    self
      .inner
      .shards
      .iter()
      .map(|shard| {
        shard
          .read()
          .values()
          .filter(|entry| !entry.is_expired(now))
          .count()
      })
      .sum()
  }

  /// Whether the store holds no live entries.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V: Send + Sync + 'static> Default for MemoryStore<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> fmt::Debug for MemoryStore<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("shards", &self.inner.shards.len())
      .field("sweeper", &self.sweeper.is_some())
      .finish()
  }
}

#[async_trait]
impl<V: Send + Sync + 'static> StoreBackend<V> for MemoryStore<V> {
  fn name(&self) -> &'static str {
    "memory"
  }

  async fn get(&self, key: &CacheKey) -> Result<Option<Arc<V>>, StoreError> {
    let now = self.inner.clock.now();
    let shard = self.inner.shard_for(key);

    {
      let guard = shard.read();
      match guard.get(key) {
        Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
        Some(_) => {}
        None => return Ok(None),
      }
    }

    // The entry is dead; reclaim it now instead of waiting for the
    // sweeper. Re-checked under the write lock since a writer may have
    // replaced it in the window between the two locks.
    let mut guard = shard.write();
    if guard.get(key).is_some_and(|entry| entry.is_expired(now)) {
      guard.remove(key);
    }
    Ok(None)
  }

  async fn set(&self, key: &CacheKey, value: Arc<V>, ttl: Duration) -> Result<(), StoreError> {
    let expires_at = self.inner.clock.now() + ttl;
    let entry = StoredEntry { value, expires_at };
    self.inner.shard_for(key).write().insert(key.clone(), entry);
    Ok(())
  }

  async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
    let now = self.inner.clock.now();
    match self.inner.shard_for(key).write().remove(key) {
      // Removing an already-expired entry reclaims it but is not a
      // removal of live data.
      Some(entry) => Ok(!entry.is_expired(now)),
      None => Ok(false),
    }
  }

  async fn scan(&self, prefix: &str) -> Result<Vec<CacheKey>, StoreError> {
    let now = self.inner.clock.now();
    let mut keys = Vec::new();
    // One shard lock at a time; writers on other shards are never blocked
    // for the whole scan.
    for shard in self.inner.shards.iter() {
      let guard = shard.read();
      keys.extend(
        guard
          .iter()
          .filter(|(key, entry)| key.as_str().starts_with(prefix) && !entry.is_expired(now))
          .map(|(key, _)| key.clone()),
      );
    }
    Ok(keys)
  }

  async fn clear(&self) -> Result<(), StoreError> {
    for shard in self.inner.shards.iter() {
      shard.write().clear();
    }
    Ok(())
  }

  async fn close(&self) -> Result<(), StoreError> {
    if let Some(sweeper) = &self.sweeper {
      sweeper.stop();
    }
    Ok(())
  }
}

impl<V> Drop for MemoryStore<V> {
  fn drop(&mut self) {
    if let Some(sweeper) = &self.sweeper {
      sweeper.stop();
    }
  }
}

/// The background thread that reclaims expired entries which would
/// otherwise linger until their next read. Stopping wakes the thread out
/// of its timed wait and joins it, so shutdown never sits out a tick.
struct Sweeper {
  signal: Arc<SweepSignal>,
  handle: Mutex<Option<JoinHandle<()>>>,
}

/// What `stop` uses to interrupt the sweeper mid-wait.
struct SweepSignal {
  stopped: Mutex<bool>,
  wake: Condvar,
}

impl Sweeper {
  fn spawn<V: Send + Sync + 'static>(shards: Arc<Shards<V>>, interval: Duration) -> Self {
    let signal = Arc::new(SweepSignal {
      stopped: Mutex::new(false),
      wake: Condvar::new(),
    });
    let thread_signal = signal.clone();

    let handle = thread::spawn(move || {
      let mut stopped = thread_signal.stopped.lock();
      loop {
        if *stopped {
          break;
        }
        // Returns at the tick interval, or early when `stop` signals.
        thread_signal.wake.wait_for(&mut stopped, interval);
        if *stopped {
          break;
        }
        let now = shards.clock.now();
        for shard in shards.shards.iter() {
          // The write lock is held per shard, only for the retain.
          shard.write().retain(|_, entry| !entry.is_expired(now));
        }
      }
    });

    Self {
      signal,
      handle: Mutex::new(Some(handle)),
    }
  }

  /// Signals the sweeper thread to stop and waits for it to exit.
  /// Idempotent; a second caller finds the handle already taken.
  fn stop(&self) {
    *self.signal.stopped.lock() = true;
    self.signal.wake.notify_one();
    if let Some(handle) = self.handle.lock().take() {
      let _ = handle.join();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store_with_manual_clock() -> (MemoryStore<String>, Clock) {
    let clock = Clock::manual();
    let store = MemoryStore::with_config(MemoryStoreConfig {
      shards: 4,
      sweep_interval: None,
      clock: clock.clone(),
    });
    (store, clock)
  }

  fn key(raw: &str) -> CacheKey {
    CacheKey::from_raw(raw)
  }

  #[tokio::test]
  async fn get_returns_live_entries_and_hides_expired_ones() {
    let (store, clock) = store_with_manual_clock();
    let k = key("movie:550");
    store
      .set(&k, Arc::new("fight club".to_owned()), Duration::from_secs(60))
      .await
      .unwrap();

    clock.advance(Duration::from_secs(59));
    assert!(store.get(&k).await.unwrap().is_some());

    // Expiry is inclusive at the boundary.
    clock.advance(Duration::from_secs(1));
    assert!(store.get(&k).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn expired_entries_are_reclaimed_on_read() {
    let (store, clock) = store_with_manual_clock();
    let k = key("movie:550");
    store
      .set(&k, Arc::new("v".to_owned()), Duration::from_secs(10))
      .await
      .unwrap();
    clock.advance(Duration::from_secs(11));

    assert!(store.get(&k).await.unwrap().is_none());
    // The dead entry is gone, not merely hidden.
    assert_eq!(store.len(), 0);
    assert!(store.inner.shard_for(&k).read().get(&k).is_none());
  }

  #[tokio::test]
  async fn delete_reports_only_live_removals() {
    let (store, clock) = store_with_manual_clock();
    let k = key("user:42:profile");
    store
      .set(&k, Arc::new("v".to_owned()), Duration::from_secs(10))
      .await
      .unwrap();

    assert!(store.delete(&k).await.unwrap());
    assert!(!store.delete(&k).await.unwrap());

    store
      .set(&k, Arc::new("v".to_owned()), Duration::from_secs(10))
      .await
      .unwrap();
    clock.advance(Duration::from_secs(11));
    assert!(!store.delete(&k).await.unwrap());
  }

  #[tokio::test]
  async fn set_replaces_and_refreshes_expiry() {
    let (store, clock) = store_with_manual_clock();
    let k = key("trending:movie:day:1");
    store
      .set(&k, Arc::new("old".to_owned()), Duration::from_secs(10))
      .await
      .unwrap();
    clock.advance(Duration::from_secs(8));
    store
      .set(&k, Arc::new("new".to_owned()), Duration::from_secs(10))
      .await
      .unwrap();

    clock.advance(Duration::from_secs(8));
    let got = store.get(&k).await.unwrap().unwrap();
    assert_eq!(got.as_str(), "new");
  }

  #[tokio::test]
  async fn scan_is_prefix_scoped_and_skips_expired() {
    let (store, clock) = store_with_manual_clock();
    store
      .set(&key("user:42:profile"), Arc::new("p".to_owned()), Duration::from_secs(60))
      .await
      .unwrap();
    store
      .set(&key("user:42:watchlist"), Arc::new("w".to_owned()), Duration::from_secs(5))
      .await
      .unwrap();
    store
      .set(&key("user:421:profile"), Arc::new("x".to_owned()), Duration::from_secs(60))
      .await
      .unwrap();

    clock.advance(Duration::from_secs(6));
    let mut keys = store.scan("user:42:").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec![key("user:42:profile")]);
  }

  #[tokio::test]
  async fn clear_empties_every_shard() {
    let (store, _clock) = store_with_manual_clock();
    for i in 0..32 {
      store
        .set(&key(&format!("movie:{i}")), Arc::new("v".to_owned()), Duration::from_secs(60))
        .await
        .unwrap();
    }
    assert_eq!(store.len(), 32);

    store.clear().await.unwrap();
    assert!(store.is_empty());
  }

  #[test]
  fn shard_count_rounds_up_to_a_power_of_two() {
    let store: MemoryStore<String> = MemoryStore::with_config(MemoryStoreConfig {
      shards: 5,
      sweep_interval: None,
      clock: Clock::manual(),
    });
    assert_eq!(store.inner.shards.len(), 8);
  }

  #[test]
  fn sweeper_reclaims_in_the_background() {
    let clock = Clock::manual();
    let store = MemoryStore::with_config(MemoryStoreConfig {
      shards: 2,
      sweep_interval: Some(Duration::from_millis(20)),
      clock: clock.clone(),
    });

    let inner = store.inner.clone();
    inner.shard_for(&key("genre:tv")).write().insert(
      key("genre:tv"),
      StoredEntry {
        value: Arc::new("v".to_owned()),
        expires_at: Duration::from_secs(1),
      },
    );
    clock.advance(Duration::from_secs(2));

    // Give the sweeper a few ticks to run its retain pass.
    for _ in 0..50 {
      thread::sleep(Duration::from_millis(10));
      if inner.shard_for(&key("genre:tv")).read().is_empty() {
        return;
      }
    }
    panic!("sweeper did not reclaim the expired entry");
  }

  #[tokio::test]
  async fn close_joins_the_sweeper_thread() {
    let store: MemoryStore<String> = MemoryStore::with_config(MemoryStoreConfig {
      shards: 2,
      sweep_interval: Some(Duration::from_secs(60)),
      clock: Clock::manual(),
    });
    // The sweeper thread holds the only other handle to the shards.
    assert_eq!(Arc::strong_count(&store.inner), 2);

    store.close().await.unwrap();
    // Close returns once the thread has exited and released its handle,
    // well inside the sixty-second tick it was parked on.
    assert_eq!(Arc::strong_count(&store.inner), 1);
  }
}
