//! Local Cache - an in-process key/value cache
//!
//! O(1) lookup, sliding TTL expiration and LRU ordering. A single background
//! maintenance task owns the recency list, sweeps expired entries and rebuilds
//! the index once deletions leave most of its capacity unused.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheStats, LocalCache};
pub use config::{parse_memory_size, CacheOptions};
pub use error::{CacheError, Result};
