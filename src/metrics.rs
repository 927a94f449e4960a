use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All counters are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Flight Coalescing ---
  pub(crate) flights: CachePadded<AtomicU64>,
  pub(crate) flight_joins: CachePadded<AtomicU64>,
  pub(crate) fetch_failures: CachePadded<AtomicU64>,
  pub(crate) fetch_timeouts: CachePadded<AtomicU64>,

  // --- Store Degradation ---
  pub(crate) store_read_bypass: CachePadded<AtomicU64>,
  pub(crate) store_write_failures: CachePadded<AtomicU64>,

  // --- Timestamps for Uptime ---
  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      flights: CachePadded::new(AtomicU64::new(0)),
      flight_joins: CachePadded::new(AtomicU64::new(0)),
      fetch_failures: CachePadded::new(AtomicU64::new(0)),
      fetch_timeouts: CachePadded::new(AtomicU64::new(0)),
      store_read_bypass: CachePadded::new(AtomicU64::new(0)),
      store_write_failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  /// Creates a new `Metrics` instance, capturing the creation time.
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      inserts: self.inserts.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      flights: self.flights.load(Ordering::Relaxed),
      flight_joins: self.flight_joins.load(Ordering::Relaxed),
      fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
      fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
      store_read_bypass: self.store_read_bypass.load(Ordering::Relaxed),
      store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// The number of lookups served from the store.
  pub hits: u64,
  /// The number of lookups that found no live entry, including degraded
  /// reads.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// The total number of values written to the store, whether by
  /// write-through or direct insert.
  pub inserts: u64,
  /// The total number of keys removed by explicit removal or pattern
  /// invalidation.
  pub invalidations: u64,
  /// The number of origin fetches started, one per elected flight leader.
  pub flights: u64,
  /// The number of callers that joined an already-running flight instead
  /// of fetching themselves.
  pub flight_joins: u64,
  /// The number of origin fetches that returned an error.
  pub fetch_failures: u64,
  /// The number of origin fetches abandoned at the fetch timeout.
  pub fetch_timeouts: u64,
  /// The number of reads that bypassed the cache because the store failed.
  pub store_read_bypass: u64,
  /// The number of store mutations (`set`, `delete`, `scan`, `clear`) that
  /// failed and surfaced an error.
  pub store_write_failures: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("inserts", &self.inserts)
      .field("invalidations", &self.invalidations)
      .field("flights", &self.flights)
      .field("flight_joins", &self.flight_joins)
      .field("fetch_failures", &self.fetch_failures)
      .field("fetch_timeouts", &self.fetch_timeouts)
      .field("store_read_bypass", &self.store_read_bypass)
      .field("store_write_failures", &self.store_write_failures)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
