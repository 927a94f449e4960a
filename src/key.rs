//! The cache's key space: semantic request specs and their canonical keys.
//!
//! Every cached value is addressed by a [`KeySpec`] describing what the
//! caller means, which serializes to exactly one [`CacheKey`] string the
//! store sees. Two semantically equal specs must produce byte-identical
//! keys no matter how or where they were assembled, so canonicalization is
//! structural here rather than left to call-site discipline: parameters
//! live in a sorted set, paginated namespaces always serialize their page
//! ordinal, and free text is percent-encoded before it can touch a
//! delimiter.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// The segment delimiter in canonical keys.
const SEGMENT: char = ':';

/// The pair delimiter inside a key's parameter segment.
const PAIR: char = '|';

/// Top-level category of cached entity.
///
/// The set is closed on purpose: adding a namespace means adding a variant
/// here and a row to the default table in [`TtlPolicy`](crate::TtlPolicy),
/// so a new key family cannot ship without an expiry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
  /// Movie details and their derived sub-resources (`videos`, `credits`,
  /// `recommendations`, `similar`).
  Movie,
  /// Search result pages, keyed by query text.
  Search,
  /// Trending rankings, keyed by media type and time window.
  Trending,
  /// User profiles and user-derived data (`profile`, `watchlist`,
  /// `ratings`).
  User,
  /// User-created lists.
  List,
  /// The genre taxonomy for a media type.
  Genre,
  /// People (cast and crew) details and their credits.
  Person,
  /// Filtered discovery pages, keyed by their parameter set.
  Discover,
}

impl Namespace {
  /// The key segment this namespace serializes to.
  pub fn as_str(self) -> &'static str {
    match self {
      Namespace::Movie => "movie",
      Namespace::Search => "search",
      Namespace::Trending => "trending",
      Namespace::User => "user",
      Namespace::List => "list",
      Namespace::Genre => "genre",
      Namespace::Person => "person",
      Namespace::Discover => "discover",
    }
  }

  /// Whether keys in this namespace carry a page ordinal.
  ///
  /// Paginated namespaces always serialize the ordinal, defaulting to 1,
  /// so "no page requested" and "page 1 requested" land on the same entry.
  pub fn is_paginated(self) -> bool {
    matches!(
      self,
      Namespace::Search | Namespace::Trending | Namespace::Discover | Namespace::List
    )
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An entity identifier: numeric for catalogue entities, free text for
/// queries and externally issued ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
  /// A numeric id, serialized verbatim.
  Num(i64),
  /// Free text, percent-encoded before serialization.
  Text(String),
}

impl Identifier {
  pub(crate) fn write_into(&self, buf: &mut String) {
    match self {
      Identifier::Num(n) => buf.push_str(&n.to_string()),
      Identifier::Text(t) => buf.push_str(&encode(t)),
    }
  }
}

impl From<i64> for Identifier {
  fn from(id: i64) -> Self {
    Identifier::Num(id)
  }
}

impl From<i32> for Identifier {
  fn from(id: i32) -> Self {
    Identifier::Num(id as i64)
  }
}

impl From<&str> for Identifier {
  fn from(text: &str) -> Self {
    Identifier::Text(text.to_owned())
  }
}

impl From<String> for Identifier {
  fn from(text: String) -> Self {
    Identifier::Text(text)
  }
}

/// Percent-encodes a free-text segment so the `:` and `|` delimiters stay
/// unambiguous and caller-supplied text cannot forge key structure.
pub(crate) fn encode(text: &str) -> Cow<'_, str> {
  urlencoding::encode(text)
}

/// A semantic cache request: namespace, optional identifier, optional
/// sub-resource, optional page and an optional set of filter parameters.
///
/// Specs are assembled with the typed constructors plus the chainable
/// setters, then serialized with [`build_key`](KeySpec::build_key). The
/// fetcher registered on the cache receives the spec itself, so it can
/// route on [`namespace`](KeySpec::namespace) without re-parsing key
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
  namespace: Namespace,
  identifier: Option<Identifier>,
  sub_resource: Option<String>,
  page: Option<u32>,
  params: BTreeSet<(String, String)>,
}

impl KeySpec {
  /// A spec with nothing but the namespace. Prefer the typed constructors;
  /// this exists for namespaces whose shape they do not cover.
  pub fn new(namespace: Namespace) -> Self {
    Self {
      namespace,
      identifier: None,
      sub_resource: None,
      page: None,
      params: BTreeSet::new(),
    }
  }

  /// Movie details: `movie:{id}`. Chain [`sub`](KeySpec::sub) for derived
  /// resources such as `videos` or `credits`.
  pub fn movie(id: impl Into<Identifier>) -> Self {
    Self::new(Namespace::Movie).id(id)
  }

  /// Person details: `person:{id}`.
  pub fn person(id: impl Into<Identifier>) -> Self {
    Self::new(Namespace::Person).id(id)
  }

  /// A user scope: `user:{id}`. Chain [`sub`](KeySpec::sub) for derived
  /// data such as `profile` or `watchlist`.
  pub fn user(id: impl Into<Identifier>) -> Self {
    Self::new(Namespace::User).id(id)
  }

  /// A user-created list: `list:{id}:{page}`.
  pub fn list(id: impl Into<Identifier>) -> Self {
    Self::new(Namespace::List).id(id)
  }

  /// A search page: `search:{query}:{page}`. The page defaults to 1.
  pub fn search(query: impl Into<String>) -> Self {
    Self::new(Namespace::Search).id(Identifier::Text(query.into()))
  }

  /// A trending ranking: `trending:{media_type}:{window}:{page}`.
  pub fn trending(media_type: impl Into<String>, window: impl Into<String>) -> Self {
    Self::new(Namespace::Trending)
      .id(Identifier::Text(media_type.into()))
      .sub(window)
  }

  /// The genre taxonomy for a media type: `genre:{media_type}`.
  pub fn genre(media_type: impl Into<String>) -> Self {
    Self::new(Namespace::Genre).id(Identifier::Text(media_type.into()))
  }

  /// A discovery page: `discover:{media_type}:{page}[:{filters}]`. Add
  /// filters with [`param`](KeySpec::param).
  pub fn discover(media_type: impl Into<String>) -> Self {
    Self::new(Namespace::Discover).id(Identifier::Text(media_type.into()))
  }

  /// Sets the identifier segment.
  pub fn id(mut self, id: impl Into<Identifier>) -> Self {
    self.identifier = Some(id.into());
    self
  }

  /// Sets the sub-resource segment.
  pub fn sub(mut self, sub_resource: impl Into<String>) -> Self {
    self.sub_resource = Some(sub_resource.into());
    self
  }

  /// Sets the page ordinal. Pages start at 1; 0 is clamped to 1 so both
  /// spell the first page.
  pub fn page(mut self, page: u32) -> Self {
    self.page = Some(page.max(1));
    self
  }

  /// Adds one `name=value` filter pair. Pairs live in a sorted set, so the
  /// order call sites add them in never leaks into the key.
  pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert((name.into(), value.into()));
    self
  }

  /// The namespace this spec addresses.
  pub fn namespace(&self) -> Namespace {
    self.namespace
  }

  /// The identifier, if one was set.
  pub fn identifier(&self) -> Option<&Identifier> {
    self.identifier.as_ref()
  }

  /// The sub-resource segment, if one was set.
  pub fn sub_resource(&self) -> Option<&str> {
    self.sub_resource.as_deref()
  }

  /// The page ordinal: the explicit page if set, 1 for paginated
  /// namespaces, `None` otherwise.
  pub fn page_ordinal(&self) -> Option<u32> {
    if self.namespace.is_paginated() {
      Some(self.page.unwrap_or(1))
    } else {
      self.page
    }
  }

  /// Serializes the spec into its canonical key.
  ///
  /// Pure and total: every spec has exactly one key, and semantically
  /// equal specs share it byte for byte. Segments appear in a fixed order
  /// (namespace, identifier, sub-resource, page, parameters) and absent
  /// segments are skipped rather than serialized empty.
  pub fn build_key(&self) -> CacheKey {
    let mut key = String::with_capacity(48);
    key.push_str(self.namespace.as_str());

    if let Some(id) = &self.identifier {
      key.push(SEGMENT);
      id.write_into(&mut key);
    }

    if let Some(sub) = &self.sub_resource {
      key.push(SEGMENT);
      key.push_str(&encode(sub));
    }

    if let Some(page) = self.page_ordinal() {
      key.push(SEGMENT);
      key.push_str(&page.to_string());
    }

    if !self.params.is_empty() {
      key.push(SEGMENT);
      let mut first = true;
      for (name, value) in &self.params {
        if !first {
          key.push(PAIR);
        }
        first = false;
        key.push_str(&encode(name));
        key.push('=');
        key.push_str(&encode(value));
      }
    }

    CacheKey(key)
  }
}

/// The canonical, colon-delimited form of a [`KeySpec`].
///
/// Keys are a contract between the cache and its store, never something to
/// show external clients. Compared, hashed and ordered as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Wraps a raw key string read back from a store.
  ///
  /// Intended for [`StoreBackend`](crate::StoreBackend) implementations
  /// that persist keys as strings; everything else derives keys from a
  /// [`KeySpec`].
  pub fn from_raw(raw: impl Into<String>) -> Self {
    Self(raw.into())
  }

  /// The key as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entity_keys_serialize_without_optional_segments() {
    assert_eq!(KeySpec::movie(550).build_key().as_str(), "movie:550");
    assert_eq!(KeySpec::person(287).build_key().as_str(), "person:287");
    assert_eq!(KeySpec::user(42).build_key().as_str(), "user:42");
  }

  #[test]
  fn sub_resources_extend_the_entity_key() {
    assert_eq!(
      KeySpec::movie(550).sub("videos").build_key().as_str(),
      "movie:550:videos"
    );
    assert_eq!(
      KeySpec::user(42).sub("profile").build_key().as_str(),
      "user:42:profile"
    );
  }

  #[test]
  fn paginated_namespaces_always_serialize_a_page() {
    // "no page" and "page 1" must be the same entry.
    assert_eq!(
      KeySpec::search("dune").build_key(),
      KeySpec::search("dune").page(1).build_key()
    );
    assert_eq!(KeySpec::search("dune").build_key().as_str(), "search:dune:1");
    assert_eq!(
      KeySpec::search("dune").page(3).build_key().as_str(),
      "search:dune:3"
    );
    assert_eq!(
      KeySpec::trending("movie", "day").build_key().as_str(),
      "trending:movie:day:1"
    );
    assert_eq!(
      KeySpec::list(7).page(2).build_key().as_str(),
      "list:7:2"
    );
  }

  #[test]
  fn page_zero_is_the_first_page() {
    assert_eq!(
      KeySpec::search("dune").page(0).build_key(),
      KeySpec::search("dune").page(1).build_key()
    );
  }

  #[test]
  fn unpaginated_namespaces_omit_the_ordinal_unless_asked() {
    assert_eq!(KeySpec::genre("tv").build_key().as_str(), "genre:tv");
    // An explicit page on an unpaginated namespace is still honored.
    assert_eq!(
      KeySpec::movie(550).sub("reviews").page(2).build_key().as_str(),
      "movie:550:reviews:2"
    );
  }

  #[test]
  fn params_are_sorted_regardless_of_insertion_order() {
    let a = KeySpec::discover("movie")
      .param("year", "1999")
      .param("with_genres", "28")
      .build_key();
    let b = KeySpec::discover("movie")
      .param("with_genres", "28")
      .param("year", "1999")
      .build_key();

    assert_eq!(a, b);
    assert_eq!(a.as_str(), "discover:movie:1:with_genres=28|year=1999");
  }

  #[test]
  fn duplicate_params_collapse() {
    let key = KeySpec::discover("movie")
      .param("year", "1999")
      .param("year", "1999")
      .build_key();
    assert_eq!(key.as_str(), "discover:movie:1:year=1999");
  }

  #[test]
  fn free_text_cannot_forge_key_structure() {
    // A query containing the delimiters must not produce extra segments.
    let key = KeySpec::search("a:b|c=d").build_key();
    assert_eq!(key.as_str(), "search:a%3Ab%7Cc%3Dd:1");

    let spaced = KeySpec::search("fight club").build_key();
    assert_eq!(spaced.as_str(), "search:fight%20club:1");
  }

  #[test]
  fn distinct_queries_never_collide_after_encoding() {
    let raw_colon = KeySpec::search("a:b").build_key();
    let encoded_lookalike = KeySpec::search("a%3Ab").build_key();
    assert_ne!(raw_colon, encoded_lookalike);
  }

  #[test]
  fn namespaces_never_collide() {
    let specs = [
      KeySpec::movie(1).build_key(),
      KeySpec::person(1).build_key(),
      KeySpec::user(1).build_key(),
      KeySpec::list(1).build_key(),
      KeySpec::search("1").build_key(),
      KeySpec::genre("1").build_key(),
      KeySpec::discover("1").build_key(),
      KeySpec::trending("1", "day").build_key(),
    ];
    for (i, a) in specs.iter().enumerate() {
      for b in specs.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn equal_specs_build_identical_keys() {
    let build = || {
      KeySpec::trending("tv", "week")
        .page(2)
        .param("region", "US")
        .param("language", "en")
    };
    assert_eq!(build(), build());
    assert_eq!(build().build_key(), build().build_key());
  }

  #[test]
  fn raw_keys_round_trip_as_strings() {
    let key = KeySpec::movie(550).build_key();
    let raw = CacheKey::from_raw(key.as_str().to_owned());
    assert_eq!(key, raw);
    assert_eq!(format!("{raw}"), "movie:550");
  }
}
