//! SQLite-backed cache store.

use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::clock::{Clock, SystemClock};
use super::traits::{is_blank, CacheError, CacheStore, Cacheable, Result};

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    expires_at INTEGER NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expires
    ON cache_entries(expires_at);
"#;

/// Cache store persisted to SQLite, so entries survive process restarts.
///
/// Values are stored as JSON. Expiry is an absolute unix-millis timestamp
/// compared against the injected clock, not SQLite's own notion of now.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open the cache for `server_url` at the default location.
  pub fn open(server_url: &str) -> Result<Self> {
    let path = Self::default_path(server_url)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CacheError::Open(format!("Failed to create cache directory: {}", e)))?;
    }

    Self::open_at(&path, Arc::new(SystemClock))
  }

  /// Open (or create) a cache database at an explicit path.
  pub fn open_at(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
    let conn = Connection::open(path).map_err(|e| {
      CacheError::Open(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn, clock)
  }

  /// Cache that lives only as long as this value.
  #[cfg(test)]
  fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?, clock)
  }

  fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      clock,
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Per-server database path, so caches of different servers never mix.
  fn default_path(server_url: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::Open("Could not determine data directory".to_string()))?;

    Ok(
      data_dir
        .join("tfsv")
        .join(format!("cache-{}.db", server_fingerprint(server_url))),
    )
  }

  fn run_migrations(&self) -> Result<()> {
    self.lock()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::Poisoned(e.to_string()))
  }
}

impl CacheStore for SqliteStore {
  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    if is_blank(key) {
      return Err(CacheError::InvalidKey);
    }

    let data = serde_json::to_vec(value).map_err(|source| CacheError::Serialize {
      key: key.to_string(),
      source,
    })?;
    let now = self.clock.now();
    let expires_at = (now + ttl).timestamp_millis();

    self.lock()?.execute(
      "INSERT OR REPLACE INTO cache_entries (cache_key, data, expires_at, cached_at)
       VALUES (?, ?, ?, ?)",
      params![key, data, expires_at, now.timestamp_millis()],
    )?;
    Ok(())
  }

  fn try_get<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    if is_blank(key) {
      return Ok(None);
    }

    let now = self.clock.now().timestamp_millis();
    let data: Option<Vec<u8>> = self
      .lock()?
      .query_row(
        "SELECT data FROM cache_entries WHERE cache_key = ? AND expires_at > ?",
        params![key, now],
        |row| row.get(0),
      )
      .optional()?;

    Ok(data.and_then(|data| match serde_json::from_slice(&data) {
      Ok(value) => Some(value),
      Err(e) => {
        tracing::debug!(key, error = %e, "Cached entry has a different shape, ignoring");
        None
      }
    }))
  }

  fn remove(&self, key: &str) -> Result<()> {
    if !is_blank(key) {
      self
        .lock()?
        .execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])?;
    }
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.lock()?.execute("DELETE FROM cache_entries", [])?;
    Ok(())
  }

  fn contains(&self, key: &str) -> Result<bool> {
    if is_blank(key) {
      return Ok(false);
    }
    let now = self.clock.now().timestamp_millis();
    let found: Option<i64> = self
      .lock()?
      .query_row(
        "SELECT 1 FROM cache_entries WHERE cache_key = ? AND expires_at > ?",
        params![key, now],
        |row| row.get(0),
      )
      .optional()?;
    Ok(found.is_some())
  }
}

/// Short, stable file-name-safe fingerprint of a server URL.
fn server_fingerprint(server_url: &str) -> String {
  let normalized = server_url.trim().trim_end_matches('/').to_lowercase();
  let mut hasher = Sha256::new();
  hasher.update(normalized.as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}
