//! Generic caching layer with per-entry expiry.
//!
//! This module is TFS-agnostic. It provides:
//! - A `CacheStore` contract: set/get/remove/clear/contains with absolute expiry
//! - An in-memory store and a SQLite store that persists across runs
//! - A `CacheLayer` that runs a fetcher only on a cache miss

mod clock;
mod layer;
mod memory;
mod storage;
mod traits;

#[cfg(test)]
pub use clock::{ManualClock, SystemClock};
pub use layer::CacheLayer;
pub use memory::MemoryStore;
pub use storage::SqliteStore;
pub use traits::CacheStore;
