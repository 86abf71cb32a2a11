//! Core traits and types for the caching system.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Trait for values that can be stored in a cache.
///
/// The in-memory store keeps values as-is; persistent stores round-trip them
/// through JSON, hence the serde bounds.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("Cache key cannot be empty")]
  InvalidKey,

  #[error("Lock poisoned: {0}")]
  Poisoned(String),

  #[error("Failed to serialize cache entry '{key}': {source}")]
  Serialize {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("Failed to open cache: {0}")]
  Open(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Key-value store where every entry carries an absolute expiry.
///
/// An expired entry behaves exactly like an absent one, whether or not it has
/// been physically removed yet. Implementations synchronize internally so a
/// shared reference can be used from concurrent tasks.
pub trait CacheStore: Send + Sync {
  /// Store `value` under `key`, expiring `ttl` from now. Overwrites.
  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

  /// Look up an unexpired value.
  ///
  /// `Ok(None)` covers absent, expired and stored-as-a-different-type entries.
  fn try_get<T: Cacheable>(&self, key: &str) -> Result<Option<T>>;

  /// Delete the entry under `key`, if any.
  fn remove(&self, key: &str) -> Result<()>;

  /// Drop every entry.
  fn clear(&self) -> Result<()>;

  /// Whether `key` holds an unexpired entry.
  fn contains(&self, key: &str) -> Result<bool>;

  /// Like [`CacheStore::try_get`], but backend failures also read as a miss.
  fn get<T: Cacheable>(&self, key: &str) -> Option<T> {
    match self.try_get(key) {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
        None
      }
    }
  }
}

pub(super) fn is_blank(key: &str) -> bool {
  key.trim().is_empty()
}
