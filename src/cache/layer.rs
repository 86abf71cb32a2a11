//! Cache layer that puts a cache-first lookup in front of network fetching.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;

use super::traits::{CacheStore, Cacheable};

/// Default time-to-live for fetched collections.
pub const DEFAULT_TTL_MINUTES: i64 = 5;

/// Cache layer that manages the hit/miss logic around a fetcher.
pub struct CacheLayer<S: CacheStore> {
  storage: Arc<S>,
  /// How long a fetched result stays valid
  ttl: Duration,
}

impl<S: CacheStore> CacheLayer<S> {
  /// Create a new cache layer over a shared storage backend.
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
    }
  }

  /// The underlying store.
  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Unexpired cache entry under `key` - return it, the fetcher never runs
  /// 2. Otherwise run the fetcher
  /// 3. Store a successful result (empty lists too) and return it
  ///
  /// Fetch errors are returned untouched and leave the cache as it was. A
  /// failed cache write is logged and does not fail the fetch.
  pub async fn fetch_list<T, E, F, Fut>(&self, key: &str, fetcher: F) -> Result<Vec<T>, E>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    if let Some(cached) = self.storage.get::<Vec<T>>(key) {
      tracing::debug!(key, count = cached.len(), "Cache hit");
      return Ok(cached);
    }

    let data = fetcher().await?;
    if let Err(e) = self.storage.set(key, &data, self.ttl) {
      tracing::warn!(key, error = %e, "Failed to cache fetched result");
    }
    Ok(data)
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
    }
  }
}
