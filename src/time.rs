use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

// The single, static reference point for all expiry arithmetic in the
// crate. Initialized on first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A monotonic time source for expiry decisions.
///
/// The [`system`](Clock::system) clock reads the process monotonic clock and
/// is what production caches run on. A [`manual`](Clock::manual) clock starts
/// at zero and only moves when [`advance`](Clock::advance) is called, which
/// lets tests cross TTL boundaries without sleeping.
///
/// Clones share the same underlying source, so advancing one handle of a
/// manual clock is visible to every component it was injected into.
#[derive(Clone, Debug)]
pub struct Clock {
  source: Source,
}

#[derive(Clone, Debug)]
enum Source {
  System,
  Manual(Arc<AtomicU64>),
}

impl Clock {
  /// A clock backed by the process monotonic clock.
  pub fn system() -> Self {
    Self { source: Source::System }
  }

  /// A clock that only moves when [`advance`](Clock::advance) is called.
  pub fn manual() -> Self {
    Self {
      source: Source::Manual(Arc::new(AtomicU64::new(0))),
    }
  }

  /// The current time, as a duration since the clock's epoch.
  pub fn now(&self) -> Duration {
    match &self.source {
      Source::System => Instant::now().saturating_duration_since(*CACHE_EPOCH),
      Source::Manual(nanos) => Duration::from_nanos(nanos.load(Ordering::Acquire)),
    }
  }

  /// Moves a manual clock forward by `step`.
  ///
  /// # Panics
  ///
  /// Panics if called on a system clock, which cannot be steered.
  pub fn advance(&self, step: Duration) {
    match &self.source {
      Source::System => panic!("Clock::advance requires a manual clock"),
      Source::Manual(nanos) => {
        nanos.fetch_add(step.as_nanos() as u64, Ordering::AcqRel);
      }
    }
  }
}

impl Default for Clock {
  fn default() -> Self {
    Self::system()
  }
}
