//! Pattern-based invalidation: bulk-expiring every key derived from an
//! entity the moment that entity mutates, instead of waiting out TTLs.

use std::fmt;

use tracing::debug;

use crate::error::CacheError;
use crate::key::{CacheKey, Identifier, Namespace};
use crate::store::Store;

/// A key-prefix pattern used for cascading deletes.
///
/// A pattern is a literal [`CacheKey`] prefix terminated by a single `*`
/// wildcard. It matches every key that starts with the prefix and nothing
/// else; there is no mid-key globbing. The typed constructors produce
/// prefixes that end on a segment delimiter, so `user:42:*` can never reach
/// into `user:421:profile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPattern {
  prefix: String,
}

impl InvalidationPattern {
  /// Parses a pattern of the form `prefix*`.
  ///
  /// Returns `None` when the trailing wildcard is missing or a second `*`
  /// appears anywhere: a bare key passed here is almost always a bug, and
  /// mid-key wildcards are deliberately unsupported.
  pub fn parse(pattern: &str) -> Option<Self> {
    let prefix = pattern.strip_suffix('*')?;
    if prefix.contains('*') {
      return None;
    }
    Some(Self {
      prefix: prefix.to_owned(),
    })
  }

  /// Every key derived from one entity: `{namespace}:{id}:*`.
  ///
  /// The prefix ends at a segment boundary, so the entity's own bare key
  /// (`movie:550`) is not matched, only its sub-resource and derived keys.
  /// Pair this with [`Cache::remove`](crate::Cache::remove) when the bare
  /// entry has to go too.
  pub fn for_entity(namespace: Namespace, id: impl Into<Identifier>) -> Self {
    let mut prefix = String::with_capacity(24);
    prefix.push_str(namespace.as_str());
    prefix.push(':');
    id.into().write_into(&mut prefix);
    prefix.push(':');
    Self { prefix }
  }

  /// Every key in a namespace: `{namespace}:*`.
  pub fn for_namespace(namespace: Namespace) -> Self {
    let mut prefix = String::with_capacity(12);
    prefix.push_str(namespace.as_str());
    prefix.push(':');
    Self { prefix }
  }

  /// The literal prefix the pattern matches on.
  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Whether `key` falls under this pattern.
  pub fn matches(&self, key: &CacheKey) -> bool {
    key.as_str().starts_with(&self.prefix)
  }
}

impl fmt::Display for InvalidationPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}*", self.prefix)
  }
}

/// Deletes every stored key matching `pattern`, returning how many live
/// entries were actually removed.
///
/// Runs in two phases, enumerate then delete, because the substrate's scan
/// and delete are not assumed atomic with each other. A key written after
/// the scan snapshot can survive this pass; its TTL bounds how long it can
/// stay. Repeating a pattern is always safe and reports 0 once nothing
/// matches.
pub(crate) async fn purge_matching<V: Send + Sync + 'static>(
  store: &Store<V>,
  pattern: &InvalidationPattern,
) -> Result<u64, CacheError> {
  let keys = store.scan(pattern.prefix()).await?;
  let mut removed = 0u64;
  for key in &keys {
    if store.delete(key).await? {
      removed += 1;
    }
  }
  debug!(pattern = %pattern, matched = keys.len(), removed, "invalidation pass finished");
  Ok(removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::key::KeySpec;

  #[test]
  fn parse_requires_exactly_one_trailing_wildcard() {
    assert_eq!(
      InvalidationPattern::parse("user:42:*"),
      Some(InvalidationPattern {
        prefix: "user:42:".to_owned()
      })
    );
    assert!(InvalidationPattern::parse("user:42:").is_none());
    assert!(InvalidationPattern::parse("user:*:profile*").is_none());
    assert!(InvalidationPattern::parse("user:42:profile").is_none());
  }

  #[test]
  fn entity_patterns_stop_at_segment_boundaries() {
    let pattern = InvalidationPattern::for_entity(Namespace::User, 42);
    assert_eq!(pattern.prefix(), "user:42:");

    assert!(pattern.matches(&KeySpec::user(42).sub("profile").build_key()));
    assert!(pattern.matches(&KeySpec::user(42).sub("watchlist").build_key()));
    // Neither the longer id nor the bare entity key is covered.
    assert!(!pattern.matches(&KeySpec::user(421).sub("profile").build_key()));
    assert!(!pattern.matches(&KeySpec::user(42).build_key()));
  }

  #[test]
  fn entity_patterns_encode_text_ids_like_keys_do() {
    let pattern = InvalidationPattern::for_entity(Namespace::Search, "fight club");
    assert_eq!(pattern.prefix(), "search:fight%20club:");
    assert!(pattern.matches(&KeySpec::search("fight club").build_key()));
    assert!(pattern.matches(&KeySpec::search("fight club").page(9).build_key()));
    assert!(!pattern.matches(&KeySpec::search("fight clubs").build_key()));
  }

  #[test]
  fn namespace_patterns_cover_the_whole_family() {
    let pattern = InvalidationPattern::for_namespace(Namespace::Trending);
    assert_eq!(pattern.prefix(), "trending:");
    assert!(pattern.matches(&KeySpec::trending("movie", "day").build_key()));
    assert!(pattern.matches(&KeySpec::trending("tv", "week").page(4).build_key()));
    assert!(!pattern.matches(&KeySpec::movie(550).build_key()));
  }

  #[test]
  fn display_round_trips_through_parse() {
    let pattern = InvalidationPattern::for_entity(Namespace::Movie, 550);
    assert_eq!(pattern.to_string(), "movie:550:*");
    assert_eq!(InvalidationPattern::parse(&pattern.to_string()), Some(pattern));
  }
}
