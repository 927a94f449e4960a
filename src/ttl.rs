//! TTL policy: mapping content volatility to expiry buckets.
//!
//! Lifetimes are not chosen per call site. Every spec resolves through one
//! reviewable table keyed by namespace and sub-resource, so "how long do we
//! cache search results" is answered in exactly one place.

use std::collections::HashMap;
use std::time::Duration;

use crate::key::Namespace;

/// An enumerated expiry bucket.
///
/// The class reflects how fast the underlying content changes, not how big
/// or expensive it is. Callers pick a class (or let the policy pick one);
/// the bucket's concrete duration can be re-tuned globally without touching
/// call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
  /// 5 minutes. Content that changes continuously: trending rankings,
  /// watchlists, ratings.
  Short,
  /// 30 minutes. Semi-static pages, and the fallback when the policy has
  /// no better answer.
  Medium,
  /// 1 hour. Entity detail views that rarely change once published.
  Long,
  /// 24 hours. Expensive derived data where recomputation cost outweighs
  /// staleness.
  Extended,
  /// 7 days. Static taxonomy.
  Week,
}

impl TtlClass {
  /// The built-in duration for this class.
  pub fn default_duration(self) -> Duration {
    match self {
      TtlClass::Short => Duration::from_secs(5 * 60),
      TtlClass::Medium => Duration::from_secs(30 * 60),
      TtlClass::Long => Duration::from_secs(60 * 60),
      TtlClass::Extended => Duration::from_secs(24 * 60 * 60),
      TtlClass::Week => Duration::from_secs(7 * 24 * 60 * 60),
    }
  }
}

struct TtlRule {
  namespace: Namespace,
  sub_resource: Option<String>,
  class: TtlClass,
}

/// Resolves a namespace and sub-resource to a [`TtlClass`], and classes to
/// concrete durations.
///
/// Resolution consults caller-installed rules first (newest wins), then the
/// built-in table. Combinations the table does not recognize fall back to
/// [`TtlClass::Medium`]: a gap in the policy is a tuning opportunity, never
/// an error a request can hit.
#[derive(Default)]
pub struct TtlPolicy {
  rules: Vec<TtlRule>,
  durations: HashMap<TtlClass, Duration>,
}

impl TtlPolicy {
  /// A policy holding only the built-in table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Installs an override rule consulted before the built-in table.
  ///
  /// A rule with `sub_resource: None` matches only specs without a
  /// sub-resource; it is not a wildcard.
  pub fn add_rule(&mut self, namespace: Namespace, sub_resource: Option<&str>, class: TtlClass) {
    self.rules.push(TtlRule {
      namespace,
      sub_resource: sub_resource.map(str::to_owned),
      class,
    });
  }

  /// Re-buckets a class to a custom duration, for every key family that
  /// resolves to it.
  pub fn set_duration(&mut self, class: TtlClass, duration: Duration) {
    self.durations.insert(class, duration);
  }

  /// Resolves the expiry class for a namespace and sub-resource.
  ///
  /// Pure and total; identical inputs always resolve identically.
  pub fn resolve(&self, namespace: Namespace, sub_resource: Option<&str>) -> TtlClass {
    let installed = self
      .rules
      .iter()
      .rev()
      .find(|rule| rule.namespace == namespace && rule.sub_resource.as_deref() == sub_resource);
    if let Some(rule) = installed {
      return rule.class;
    }

    match (namespace, sub_resource) {
      (Namespace::Movie, None | Some("videos" | "credits")) => TtlClass::Long,
      (Namespace::Movie, Some("recommendations" | "similar")) => TtlClass::Extended,
      (Namespace::Person, None) => TtlClass::Long,
      (Namespace::Person, Some("credits")) => TtlClass::Extended,
      (Namespace::Search, _) => TtlClass::Medium,
      (Namespace::Trending, _) => TtlClass::Short,
      (Namespace::User, None | Some("profile")) => TtlClass::Medium,
      (Namespace::User, Some("watchlist" | "ratings")) => TtlClass::Short,
      (Namespace::List, _) => TtlClass::Medium,
      (Namespace::Genre, _) => TtlClass::Week,
      (Namespace::Discover, _) => TtlClass::Medium,
      // Anything unlisted is a policy gap, resolved conservatively.
      _ => TtlClass::Medium,
    }
  }

  /// The concrete duration for a class, honoring any re-bucketing.
  pub fn duration(&self, class: TtlClass) -> Duration {
    self
      .durations
      .get(&class)
      .copied()
      .unwrap_or_else(|| class.default_duration())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn class_durations_match_their_buckets() {
    assert_eq!(TtlClass::Short.default_duration(), Duration::from_secs(300));
    assert_eq!(TtlClass::Medium.default_duration(), Duration::from_secs(1_800));
    assert_eq!(TtlClass::Long.default_duration(), Duration::from_secs(3_600));
    assert_eq!(
      TtlClass::Extended.default_duration(),
      Duration::from_secs(86_400)
    );
    assert_eq!(TtlClass::Week.default_duration(), Duration::from_secs(604_800));
  }

  #[test]
  fn built_in_table_reflects_volatility() {
    let policy = TtlPolicy::new();

    assert_eq!(policy.resolve(Namespace::Movie, None), TtlClass::Long);
    assert_eq!(
      policy.resolve(Namespace::Movie, Some("recommendations")),
      TtlClass::Extended
    );
    assert_eq!(
      policy.resolve(Namespace::Movie, Some("similar")),
      TtlClass::Extended
    );
    assert_eq!(policy.resolve(Namespace::Person, None), TtlClass::Long);
    assert_eq!(
      policy.resolve(Namespace::Person, Some("credits")),
      TtlClass::Extended
    );
    assert_eq!(policy.resolve(Namespace::Search, None), TtlClass::Medium);
    assert_eq!(policy.resolve(Namespace::Trending, None), TtlClass::Short);
    assert_eq!(policy.resolve(Namespace::User, None), TtlClass::Medium);
    assert_eq!(
      policy.resolve(Namespace::User, Some("watchlist")),
      TtlClass::Short
    );
    assert_eq!(
      policy.resolve(Namespace::User, Some("ratings")),
      TtlClass::Short
    );
    assert_eq!(policy.resolve(Namespace::Genre, None), TtlClass::Week);
    assert_eq!(policy.resolve(Namespace::Discover, None), TtlClass::Medium);
  }

  #[test]
  fn unknown_combinations_fall_back_to_medium() {
    let policy = TtlPolicy::new();
    assert_eq!(
      policy.resolve(Namespace::Movie, Some("release_dates")),
      TtlClass::Medium
    );
    assert_eq!(
      policy.resolve(Namespace::User, Some("sessions")),
      TtlClass::Medium
    );
  }

  #[test]
  fn installed_rules_take_precedence_and_newest_wins() {
    let mut policy = TtlPolicy::new();
    policy.add_rule(Namespace::Trending, None, TtlClass::Medium);
    assert_eq!(policy.resolve(Namespace::Trending, None), TtlClass::Medium);

    policy.add_rule(Namespace::Trending, None, TtlClass::Long);
    assert_eq!(policy.resolve(Namespace::Trending, None), TtlClass::Long);

    // Rules are exact on the sub-resource, not prefix matches.
    assert_eq!(
      policy.resolve(Namespace::Trending, Some("anything")),
      TtlClass::Short
    );
  }

  #[test]
  fn rebucketing_changes_the_duration_not_the_class() {
    let mut policy = TtlPolicy::new();
    policy.set_duration(TtlClass::Short, Duration::from_secs(30));

    assert_eq!(policy.resolve(Namespace::Trending, None), TtlClass::Short);
    assert_eq!(policy.duration(TtlClass::Short), Duration::from_secs(30));
    assert_eq!(policy.duration(TtlClass::Medium), Duration::from_secs(1_800));
  }
}
