use core::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::error::{BoxError, BuildError};
use crate::flight::FlightMap;
use crate::key::{KeySpec, Namespace};
use crate::metrics::Metrics;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::shared::{CacheShared, FetchFn};
use crate::store::memory::{MemoryStore, MemoryStoreConfig};
use crate::store::{Store, StoreBackend};
use crate::time::Clock;
use crate::ttl::{TtlClass, TtlPolicy};

/// The bound applied to each origin fetch unless overridden or disabled.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the default memory store sweeps expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A builder for creating [`Cache`] instances.
///
/// The only mandatory piece is the fetcher; everything else has a default:
/// an in-memory store sharded by core count, the built-in TTL table, a 10
/// second fetch bound and the ambient tokio runtime as the task spawner.
pub struct CacheBuilder<V: Send + Sync + 'static> {
  shards: usize,
  sweep_interval: Option<Duration>,
  clock: Clock,
  backend: Option<Arc<dyn StoreBackend<V>>>,
  policy: TtlPolicy,
  fetcher: Option<FetchFn<V>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  fetch_timeout: Option<Duration>,
}

// Manual Debug implementation for CacheBuilder.
impl<V: Send + Sync + 'static> fmt::Debug for CacheBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("sweep_interval", &self.sweep_interval)
      .field("fetch_timeout", &self.fetch_timeout)
      .field("has_backend", &self.backend.is_some())
      .field("has_fetcher", &self.fetcher.is_some())
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

impl<V: Send + Sync + 'static> CacheBuilder<V> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
      clock: Clock::system(),
      backend: None,
      policy: TtlPolicy::new(),
      fetcher: None,
      spawner: None,
      fetch_timeout: Some(DEFAULT_FETCH_TIMEOUT),
    }
  }

  /// Sets the number of concurrent shards for the store and the flight
  /// registry.
  pub fn shards(mut self, shards: usize) -> Self {
    // Ensure shards is at least 1 and a power of two for fast bitwise ANDing.
    self.shards = shards.max(1).next_power_of_two();
    self
  }

  /// Sets the sweep interval of the default memory store's background
  /// reclaimer. Ignored when an explicit backend is provided.
  pub fn sweep_interval(mut self, interval: Duration) -> Self {
    self.sweep_interval = Some(interval);
    self
  }

  /// Disables the default memory store's background reclaimer; expired
  /// entries are then only removed lazily on read.
  pub fn no_sweeper(mut self) -> Self {
    self.sweep_interval = None;
    self
  }

  /// Sets the time source for expiry decisions.
  /// (Primarily for testing purposes with [`Clock::manual`].)
  pub fn clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  /// Provides the store backend the cache runs over. Defaults to an
  /// in-memory store built from this builder's shard, sweep and clock
  /// settings.
  pub fn backend(mut self, backend: Arc<dyn StoreBackend<V>>) -> Self {
    self.backend = Some(backend);
    self
  }

  /// Installs a TTL rule consulted before the built-in policy table.
  pub fn ttl_rule(
    mut self,
    namespace: Namespace,
    sub_resource: Option<&str>,
    class: TtlClass,
  ) -> Self {
    self.policy.add_rule(namespace, sub_resource, class);
    self
  }

  /// Re-buckets a TTL class to a custom duration.
  pub fn ttl_duration(mut self, class: TtlClass, duration: Duration) -> Self {
    self.policy.set_duration(class, duration);
    self
  }

  /// Registers the fetcher the cache calls on a miss.
  ///
  /// The closure receives the semantic [`KeySpec`] (so it can route on the
  /// namespace) and returns the origin value or an error. It is invoked at
  /// most once per key per miss window, from a detached task.
  pub fn fetcher<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(KeySpec) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
  {
    let fetch_fn = move |spec| Box::pin(f(spec)) as BoxFuture<'static, Result<V, BoxError>>;
    self.fetcher = Some(Arc::new(fetch_fn));
    self
  }

  /// Provides the spawner flight tasks run on. Defaults to the tokio
  /// runtime that is current when [`build`](CacheBuilder::build) is called.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Bounds each origin fetch. A fetch exceeding the bound fails every
  /// waiter with [`CacheError::Timeout`](crate::CacheError::Timeout).
  pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
    self.fetch_timeout = Some(timeout);
    self
  }

  /// Removes the fetch bound entirely; fetches then run as long as the
  /// origin takes.
  pub fn no_fetch_timeout(mut self) -> Self {
    self.fetch_timeout = None;
    self
  }

  /// Applies deserialized [`CacheConfig`] settings over the builder's
  /// current state. Explicit builder calls after this override it.
  pub fn config(mut self, config: CacheConfig) -> Self {
    self.shards = config.shards.max(1).next_power_of_two();
    self.sweep_interval = config.sweep_interval;
    self.fetch_timeout = config.fetch_timeout;
    for (class, duration) in config.ttl.overrides() {
      self.policy.set_duration(class, duration);
    }
    self
  }

  /// Builds the cache.
  pub fn build(self) -> Result<Cache<V>, BuildError> {
    let fetcher = self.fetcher.ok_or(BuildError::FetcherRequired)?;
    let spawner: Arc<dyn TaskSpawner> = match self.spawner {
      Some(spawner) => spawner,
      None => Arc::new(TokioSpawner::try_new().ok_or(BuildError::SpawnerRequired)?),
    };

    let metrics = Arc::new(Metrics::new());
    let backend = match self.backend {
      Some(backend) => backend,
      None => Arc::new(MemoryStore::with_config(MemoryStoreConfig {
        shards: self.shards,
        sweep_interval: self.sweep_interval,
        clock: self.clock,
      })),
    };

    let shared = Arc::new(CacheShared {
      store: Store::new(backend, metrics.clone()),
      policy: self.policy,
      flights: Arc::new(FlightMap::new(self.shards)),
      fetcher,
      spawner,
      fetch_timeout: self.fetch_timeout,
      metrics,
    });

    Ok(Cache { shared })
  }
}

impl<V: Send + Sync + 'static> Default for CacheBuilder<V> {
  fn default() -> Self {
    Self::new()
  }
}
