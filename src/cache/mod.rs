//! Cache Module
//!
//! In-process key/value cache with sliding TTL expiration and LRU ordering.

pub(crate) mod entry;
pub(crate) mod index;
pub(crate) mod lru;
mod stats;
mod store;


// Re-export public types
pub use stats::CacheStats;
pub use store::LocalCache;

pub(crate) use stats::StatsRecorder;
