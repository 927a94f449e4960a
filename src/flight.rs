//! Single-flight coordination: at most one origin fetch per key, with every
//! concurrent caller waiting on the same result.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::hash_key;

/// The shared outcome a flight delivers to every waiter.
pub(crate) type FlightResult<V> = Result<Arc<V>, CacheError>;

/// The internal state of a value being fetched.
enum State<V> {
  /// The elected leader's fetch is still running.
  Fetching,
  /// The fetch resolved; every current and future waiter gets this result.
  Resolved(FlightResult<V>),
}

struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waker>,
}

/// A future that represents a value being fetched for the cache.
/// It can be awaited by any number of tasks simultaneously; completion
/// wakes them all with one shared result.
pub(crate) struct Flight<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> Flight<V> {
  fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Fetching,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the flight, waking all waiters.
  ///
  /// Idempotent: only the first completion sticks. The fetch task's drop
  /// backstop may race an outcome that was already delivered, and the
  /// waiters must see exactly one result.
  pub(crate) fn complete(&self, result: FlightResult<V>) {
    let mut inner = self.inner.lock();
    if matches!(inner.state, State::Resolved(_)) {
      return;
    }
    inner.state = State::Resolved(result);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  pub(crate) fn is_resolved(&self) -> bool {
    matches!(self.inner.lock().state, State::Resolved(_))
  }
}

impl<V> Future for &Flight<V> {
  type Output = FlightResult<V>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Resolved(result) => Poll::Ready(result.clone()),
      State::Fetching => {
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
          inner.waiters.push_back(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

/// The outcome of asking the map for a key's flight.
pub(crate) enum FlightClaim<V> {
  /// The caller was elected to run the fetch for this key.
  Leader(Arc<Flight<V>>),
  /// Another caller's fetch is already in progress; await its result.
  Joiner(Arc<Flight<V>>),
}

/// A sharded registry of in-flight fetches, keyed by cache key.
///
/// Leadership is decided by a single map insertion under the shard lock:
/// exactly one caller can install the flight for an absent key, which makes
/// the idle-to-in-flight transition atomic without any retry loop.
pub(crate) struct FlightMap<V> {
  shards: Box<[Mutex<HashMap<CacheKey, Arc<Flight<V>>, ahash::RandomState>>]>,
  hasher: ahash::RandomState,
}

impl<V> FlightMap<V> {
  pub(crate) fn new(shards: usize) -> Self {
    let shard_count = shards.max(1).next_power_of_two();
    let hasher = ahash::RandomState::new();

    let mut vec = Vec::with_capacity(shard_count);
    for _ in 0..shard_count {
      vec.push(Mutex::new(HashMap::with_hasher(hasher.clone())));
    }
    Self {
      shards: vec.into_boxed_slice(),
      hasher,
    }
  }

  #[inline]
  fn shard_for(&self, key: &CacheKey) -> &Mutex<HashMap<CacheKey, Arc<Flight<V>>, ahash::RandomState>> {
    let hash = hash_key(&self.hasher, key);
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }

  /// Joins the existing flight for `key`, or installs a fresh one and
  /// elects the caller its leader.
  pub(crate) fn claim(&self, key: &CacheKey) -> FlightClaim<V> {
    let mut shard = self.shard_for(key).lock();
    if let Some(flight) = shard.get(key) {
      return FlightClaim::Joiner(flight.clone());
    }
    let flight = Arc::new(Flight::new());
    shard.insert(key.clone(), flight.clone());
    FlightClaim::Leader(flight)
  }

  /// Returns the key to idle. Done before the flight resolves, so a caller
  /// that misses immediately afterwards starts a fresh fetch instead of
  /// joining a finished one.
  pub(crate) fn release(&self, key: &CacheKey) {
    self.shard_for(key).lock().remove(key);
  }

  #[cfg(test)]
  pub(crate) fn in_flight(&self, key: &CacheKey) -> bool {
    self.shard_for(key).lock().contains_key(key)
  }
}

/// A backstop that keeps waiters from hanging if the fetch task dies.
///
/// Created before the task is spawned and carried by it for the whole
/// fetch. On the normal path the task idles the key and resolves the
/// flight itself, and the guard sees a resolved flight and does nothing.
/// If the task dies instead, whether it unwinds mid-fetch or its spawner
/// drops it before the first poll, the guard resolves the flight with a
/// fetch failure so every waiter gets an answer and the key returns to
/// idle.
pub(crate) struct FlightGuard<V> {
  map: Arc<FlightMap<V>>,
  key: CacheKey,
  flight: Arc<Flight<V>>,
}

impl<V> FlightGuard<V> {
  pub(crate) fn new(map: Arc<FlightMap<V>>, key: CacheKey, flight: Arc<Flight<V>>) -> Self {
    Self { map, key, flight }
  }
}

impl<V> Drop for FlightGuard<V> {
  fn drop(&mut self) {
    if !self.flight.is_resolved() {
      self.map.release(&self.key);
      self
        .flight
        .complete(Err(CacheError::fetch_failed(
          "fetch task dropped before completing".into(),
        )));
    }
  }
}
