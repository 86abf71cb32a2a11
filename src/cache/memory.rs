//! In-process cache store.

use chrono::{DateTime, Duration, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::clock::{Clock, SystemClock};
use super::traits::{is_blank, CacheError, CacheStore, Cacheable, Result};

struct Entry {
  value: Box<dyn Any + Send + Sync>,
  expires_at: DateTime<Utc>,
}

/// Cache store backed by a `HashMap` behind a `RwLock`.
///
/// Values are kept as type-erased boxes, so a read with a different type than
/// the one stored reports a miss. Expired entries are evicted lazily when a
/// read or write touches them.
pub struct MemoryStore {
  entries: RwLock<HashMap<String, Entry>>,
  clock: Arc<dyn Clock>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      clock: Arc::new(SystemClock),
    }
  }

  #[cfg(test)]
  pub(crate) fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      clock,
    }
  }

  /// Number of physically held entries, expired ones included.
  #[cfg(test)]
  fn len(&self) -> usize {
    self.entries.read().map(|e| e.len()).unwrap_or(0)
  }

  fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>>> {
    self
      .entries
      .write()
      .map_err(|e| CacheError::Poisoned(e.to_string()))
  }

  fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Entry>>> {
    self
      .entries
      .read()
      .map_err(|e| CacheError::Poisoned(e.to_string()))
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore for MemoryStore {
  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    if is_blank(key) {
      return Err(CacheError::InvalidKey);
    }

    let entry = Entry {
      value: Box::new(value.clone()),
      expires_at: self.clock.now() + ttl,
    };
    self.write()?.insert(key.to_string(), entry);
    Ok(())
  }

  fn try_get<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    if is_blank(key) {
      return Ok(None);
    }

    let now = self.clock.now();
    {
      let entries = self.read()?;
      match entries.get(key) {
        None => return Ok(None),
        Some(entry) if entry.expires_at > now => {
          return Ok(entry.value.downcast_ref::<T>().cloned());
        }
        Some(_) => {}
      }
    }

    // Expired: evict, unless someone replaced it in the meantime
    let mut entries = self.write()?;
    if entries.get(key).is_some_and(|e| e.expires_at <= now) {
      entries.remove(key);
    }
    Ok(None)
  }

  fn remove(&self, key: &str) -> Result<()> {
    if !is_blank(key) {
      self.write()?.remove(key);
    }
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.write()?.clear();
    Ok(())
  }

  fn contains(&self, key: &str) -> Result<bool> {
    if is_blank(key) {
      return Ok(false);
    }
    let now = self.clock.now();
    Ok(
      self
        .read()?
        .get(key)
        .is_some_and(|entry| entry.expires_at > now),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::ManualClock;

  fn store() -> (Arc<ManualClock>, MemoryStore) {
    let clock = Arc::new(ManualClock::default());
    let store = MemoryStore::with_clock(clock.clone());
    (clock, store)
  }

  #[test]
  fn test_entry_expires_after_ttl() {
    let (clock, store) = store();
    store
      .set("assigned_work_items", &vec![1u32, 2, 3], Duration::minutes(5))
      .unwrap();

    assert_eq!(
      store.get::<Vec<u32>>("assigned_work_items"),
      Some(vec![1, 2, 3])
    );

    clock.advance(Duration::minutes(4) + Duration::seconds(59));
    assert!(store.contains("assigned_work_items").unwrap());

    clock.advance(Duration::seconds(2));
    assert_eq!(store.get::<Vec<u32>>("assigned_work_items"), None);
    assert!(!store.contains("assigned_work_items").unwrap());
  }

  #[test]
  fn test_expired_entry_is_evicted_on_read() {
    let (clock, store) = store();
    store.set("k", &"v".to_string(), Duration::seconds(1)).unwrap();
    clock.advance(Duration::seconds(5));

    assert_eq!(store.len(), 1);
    assert!(store.try_get::<String>("k").unwrap().is_none());
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn test_set_overwrites_and_resets_expiry() {
    let (clock, store) = store();
    store.set("k", &1u8, Duration::seconds(10)).unwrap();
    clock.advance(Duration::seconds(8));
    store.set("k", &2u8, Duration::seconds(10)).unwrap();
    clock.advance(Duration::seconds(8));

    assert_eq!(store.get::<u8>("k"), Some(2));
  }

  #[test]
  fn test_wrong_type_reads_as_miss() {
    let (_, store) = store();
    store.set("k", &42u32, Duration::minutes(1)).unwrap();

    assert_eq!(store.get::<String>("k"), None);
    assert_eq!(store.get::<u32>("k"), Some(42));
  }

  #[test]
  fn test_empty_collection_is_a_hit() {
    let (_, store) = store();
    store
      .set("k", &Vec::<String>::new(), Duration::minutes(1))
      .unwrap();

    assert_eq!(store.try_get::<Vec<String>>("k").unwrap(), Some(vec![]));
  }

  #[test]
  fn test_blank_keys() {
    let (_, store) = store();
    assert!(matches!(
      store.set("  ", &1u8, Duration::minutes(1)),
      Err(CacheError::InvalidKey)
    ));
    assert_eq!(store.get::<u8>(""), None);
    assert!(!store.contains("").unwrap());
    store.remove("").unwrap();
  }

  #[test]
  fn test_remove_and_clear() {
    let (_, store) = store();
    store.set("a", &1u8, Duration::minutes(1)).unwrap();
    store.set("b", &2u8, Duration::minutes(1)).unwrap();

    store.remove("a").unwrap();
    assert!(!store.contains("a").unwrap());
    assert!(store.contains("b").unwrap());

    store.clear().unwrap();
    assert!(!store.contains("b").unwrap());
    assert_eq!(store.len(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_writers_and_readers() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for i in 0..16u32 {
      let store = store.clone();
      handles.push(tokio::spawn(async move {
        let key = format!("key-{}", i % 4);
        store.set(&key, &i, Duration::minutes(1)).unwrap();
        store.get::<u32>(&key).is_some()
      }));
    }
    for handle in handles {
      assert!(handle.await.unwrap());
    }
    assert_eq!(store.len(), 4);
  }
}
