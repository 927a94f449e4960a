//! Deserializable configuration for operators tuning a deployed cache.
//!
//! Code-level wiring (the fetcher, the backend, TTL rules) stays on the
//! builder; this covers the knobs that belong in a config file. Durations
//! are humantime strings (`"90s"`, `"30m"`, `"24h"`), and unknown fields
//! are rejected so a typo fails at load time instead of silently running
//! with defaults.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::builder::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
use crate::ttl::TtlClass;

/// File-loadable cache settings, applied with
/// [`CacheBuilder::config`](crate::CacheBuilder::config).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
  /// Shard count for the store and flight registry; rounded up to a power
  /// of two.
  #[serde(default = "default_shards")]
  pub shards: usize,
  /// Background sweep interval of the built-in memory store. `null`
  /// disables the sweeper.
  #[serde(default = "default_sweep_interval", deserialize_with = "de_opt_duration")]
  pub sweep_interval: Option<Duration>,
  /// Upper bound on a single origin fetch. `null` removes the bound.
  #[serde(default = "default_fetch_timeout", deserialize_with = "de_opt_duration")]
  pub fetch_timeout: Option<Duration>,
  /// Per-class TTL duration overrides.
  #[serde(default)]
  pub ttl: TtlDurations,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      shards: default_shards(),
      sweep_interval: default_sweep_interval(),
      fetch_timeout: default_fetch_timeout(),
      ttl: TtlDurations::default(),
    }
  }
}

/// Optional re-bucketed durations, one per [`TtlClass`]. Omitted classes
/// keep their built-in durations.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TtlDurations {
  #[serde(default, deserialize_with = "de_opt_duration")]
  pub short: Option<Duration>,
  #[serde(default, deserialize_with = "de_opt_duration")]
  pub medium: Option<Duration>,
  #[serde(default, deserialize_with = "de_opt_duration")]
  pub long: Option<Duration>,
  #[serde(default, deserialize_with = "de_opt_duration")]
  pub extended: Option<Duration>,
  #[serde(default, deserialize_with = "de_opt_duration")]
  pub week: Option<Duration>,
}

impl TtlDurations {
  /// The overrides actually present, paired with their classes.
  pub(crate) fn overrides(&self) -> Vec<(TtlClass, Duration)> {
    let mut out = Vec::new();
    if let Some(d) = self.short {
      out.push((TtlClass::Short, d));
    }
    if let Some(d) = self.medium {
      out.push((TtlClass::Medium, d));
    }
    if let Some(d) = self.long {
      out.push((TtlClass::Long, d));
    }
    if let Some(d) = self.extended {
      out.push((TtlClass::Extended, d));
    }
    if let Some(d) = self.week {
      out.push((TtlClass::Week, d));
    }
    out
  }
}

fn default_shards() -> usize {
  (num_cpus::get() * 4).max(1).next_power_of_two()
}

fn default_sweep_interval() -> Option<Duration> {
  Some(DEFAULT_SWEEP_INTERVAL)
}

fn default_fetch_timeout() -> Option<Duration> {
  Some(DEFAULT_FETCH_TIMEOUT)
}

fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<String>::deserialize(deserializer)?;
  raw
    .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
    .transpose()
}
