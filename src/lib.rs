//! A TTL- and invalidation-aware response cache core for content-API
//! frontends backed by slow or rate-limited upstream services.
//!
//! # Features
//! - **Canonical key space**: semantic [`KeySpec`]s serialize to exactly one
//!   colon-delimited key, with sorted parameters and percent-encoded text,
//!   so equal requests always share an entry.
//! - **Volatility-driven TTLs**: every key family resolves through one
//!   reviewable policy table of enumerated classes, re-tunable globally.
//! - **Pattern invalidation**: entity mutations cascade with segment-safe
//!   prefix patterns (`user:42:*`) instead of waiting out TTLs.
//! - **Single-flight fill**: concurrent misses for a key coalesce onto one
//!   detached origin fetch; every waiter shares its result, and no waiter's
//!   cancellation can abort it.
//! - **Pluggable substrate**: the cache runs over any [`StoreBackend`];
//!   an expiry-aware sharded in-memory store is built in.
//! - **Degrade, never break**: store read failures bypass the cache and are
//!   counted, fetch failures fan out but are never cached.

// Public modules that form the API
pub mod builder;
pub mod config;
pub mod error;
pub mod invalidate;
pub mod key;
pub mod metrics;
pub mod runtime;
pub mod store;
pub mod time;
pub mod ttl;

// Internal, crate-only modules
mod cache;
mod flight;
mod shared;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{BoxError, BuildError, CacheError, StoreError};
pub use invalidate::InvalidationPattern;
pub use key::{CacheKey, Identifier, KeySpec, Namespace};
pub use metrics::MetricsSnapshot;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use store::memory::{MemoryStore, MemoryStoreConfig};
pub use store::StoreBackend;
pub use time::Clock;
pub use ttl::{TtlClass, TtlPolicy};
