#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelcache::{
  Cache, CacheBuilder, CacheKey, Clock, KeySpec, MemoryStore, MemoryStoreConfig, StoreBackend,
  StoreError,
};

/// The deterministic payload the shared echo fetcher produces for a spec.
pub fn origin_value(spec: &KeySpec) -> String {
  format!("origin:{}", spec.build_key())
}

/// A cache over a manual clock whose fetcher echoes the canonical key back.
/// Good enough for every test that does not count fetch invocations.
pub fn echo_cache(clock: Clock) -> Cache<String> {
  CacheBuilder::new()
    .shards(4)
    .no_sweeper()
    .clock(clock)
    .fetcher(|spec: KeySpec| async move { Ok(origin_value(&spec)) })
    .build()
    .unwrap()
}

/// A store whose reads and writes can be made to fail on demand, for
/// exercising the degradation semantics. Wraps the real memory store so
/// non-failing operations behave exactly like production.
pub struct FailingStore {
  inner: MemoryStore<String>,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
}

impl FailingStore {
  pub fn new(clock: Clock) -> Self {
    Self {
      inner: MemoryStore::with_config(MemoryStoreConfig {
        shards: 2,
        sweep_interval: None,
        clock,
      }),
      fail_reads: AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
    }
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  fn read_error(&self) -> Result<(), StoreError> {
    if self.fail_reads.load(Ordering::SeqCst) {
      Err(StoreError::new("failing", "injected read failure"))
    } else {
      Ok(())
    }
  }

  fn write_error(&self) -> Result<(), StoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      Err(StoreError::new("failing", "injected write failure"))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl StoreBackend<String> for FailingStore {
  fn name(&self) -> &'static str {
    "failing"
  }

  async fn get(&self, key: &CacheKey) -> Result<Option<Arc<String>>, StoreError> {
    self.read_error()?;
    self.inner.get(key).await
  }

  async fn set(&self, key: &CacheKey, value: Arc<String>, ttl: Duration) -> Result<(), StoreError> {
    self.write_error()?;
    self.inner.set(key, value, ttl).await
  }

  async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
    self.write_error()?;
    self.inner.delete(key).await
  }

  async fn scan(&self, prefix: &str) -> Result<Vec<CacheKey>, StoreError> {
    self.write_error()?;
    self.inner.scan(prefix).await
  }

  async fn clear(&self) -> Result<(), StoreError> {
    self.write_error()?;
    self.inner.clear().await
  }

  async fn close(&self) -> Result<(), StoreError> {
    self.inner.close().await
  }
}
