//! The internal core shared by every cache handle clone.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::{BoxError, CacheError};
use crate::flight::{Flight, FlightClaim, FlightGuard, FlightMap};
use crate::invalidate::{self, InvalidationPattern};
use crate::key::{CacheKey, KeySpec};
use crate::metrics::Metrics;
use crate::runtime::TaskSpawner;
use crate::store::Store;
use crate::ttl::{TtlClass, TtlPolicy};

/// The registered fetch slot: a closure from a semantic spec to a boxed
/// future producing the origin value. One slot serves every namespace; the
/// closure routes on [`KeySpec::namespace`] internally.
pub(crate) type FetchFn<V> =
  Arc<dyn Fn(KeySpec) -> BoxFuture<'static, Result<V, BoxError>> + Send + Sync>;

pub(crate) struct CacheShared<V: Send + Sync + 'static> {
  pub(crate) store: Store<V>,
  pub(crate) policy: TtlPolicy,
  pub(crate) flights: Arc<FlightMap<V>>,
  pub(crate) fetcher: FetchFn<V>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) fetch_timeout: Option<Duration>,
  pub(crate) metrics: Arc<Metrics>,
}

impl<V: Send + Sync + 'static> CacheShared<V> {
  /// The composed read path: store lookup, then single-flight fetch with
  /// write-through on a miss.
  pub(crate) async fn fetch(
    shared: &Arc<Self>,
    spec: &KeySpec,
    ttl: Option<TtlClass>,
  ) -> Result<Arc<V>, CacheError> {
    let key = spec.build_key();
    if let Some(value) = shared.store.get(&key).await {
      return Ok(value);
    }

    let flight = match shared.flights.claim(&key) {
      FlightClaim::Leader(flight) => {
        shared.metrics.flights.fetch_add(1, Ordering::Relaxed);
        Self::spawn_fetch(shared.clone(), key, spec.clone(), ttl, flight.clone());
        flight
      }
      FlightClaim::Joiner(flight) => {
        shared.metrics.flight_joins.fetch_add(1, Ordering::Relaxed);
        flight
      }
    };

    flight.as_ref().await
  }

  /// Runs the elected fetch as a detached task, so no waiter's cancellation
  /// or timeout can cancel the computation other waiters depend on.
  fn spawn_fetch(
    shared: Arc<Self>,
    key: CacheKey,
    spec: KeySpec,
    ttl: Option<TtlClass>,
    flight: Arc<Flight<V>>,
  ) {
    let spawner = shared.spawner.clone();
    // Armed before the spawn. A spawner that drops the task unpolled then
    // drops the guard too, which fails the flight instead of stranding it.
    let guard = FlightGuard::new(shared.flights.clone(), key.clone(), flight.clone());
    let task = async move {
      // A racing insert may have filled the key between the caller's miss
      // and this task running; serve that instead of refetching.
      let result = match shared.store.peek(&key).await {
        Some(value) => Ok(value),
        None => match shared.run_fetch(&spec).await {
          Ok(value) => {
            let value = Arc::new(value);
            let ttl_duration = shared.ttl_duration(&spec, ttl);
            if let Err(err) = shared.store.set(&key, value.clone(), ttl_duration).await {
              // The fresh value still reaches every waiter; only the
              // write-through is lost, and the next miss refetches.
              warn!(key = %key, error = %err, "write-through failed after fetch");
            }
            Ok(value)
          }
          Err(err) => {
            debug!(key = %key, error = %err, "fetch failed, result fanned out to waiters");
            Err(err)
          }
        },
      };

      // Idle the key before resolving, so a caller that misses right after
      // completion starts a fresh flight instead of joining this one.
      shared.flights.release(&key);
      flight.complete(result);
      drop(guard);
    };
    spawner.spawn(Box::pin(task));
  }

  /// Invokes the registered fetcher under the configured time bound.
  /// Failures and timeouts are counted here, in the one place every fetch
  /// passes through.
  async fn run_fetch(&self, spec: &KeySpec) -> Result<V, CacheError> {
    let fut = (self.fetcher)(spec.clone());
    match self.fetch_timeout {
      Some(bound) => match tokio::time::timeout(bound, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
          self.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
          Err(CacheError::fetch_failed(err))
        }
        Err(_) => {
          self.metrics.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
          Err(CacheError::Timeout { timeout: bound })
        }
      },
      None => match fut.await {
        Ok(value) => Ok(value),
        Err(err) => {
          self.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
          Err(CacheError::fetch_failed(err))
        }
      },
    }
  }

  /// The concrete TTL for a spec: the explicit override if the caller gave
  /// one, otherwise whatever the policy resolves.
  pub(crate) fn ttl_duration(&self, spec: &KeySpec, override_class: Option<TtlClass>) -> Duration {
    let class = override_class
      .unwrap_or_else(|| self.policy.resolve(spec.namespace(), spec.sub_resource()));
    self.policy.duration(class)
  }

  pub(crate) async fn invalidate(&self, pattern: &InvalidationPattern) -> Result<u64, CacheError> {
    invalidate::purge_matching(&self.store, pattern).await
  }
}
