//! Configuration Module
//!
//! Cache options composed before construction, loadable from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Defaults ==
/// Sliding TTL applied to every entry when none is configured
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(300);

/// Interval between expiration sweeps
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the hand-off queue feeding the maintenance task
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

// == Cache Options ==
/// Options for a [`LocalCache`](crate::LocalCache).
///
/// Only one ttl policy exists per cache. Every entry idles for `expire` before
/// the sweep may remove it, and every touch restarts that clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    expire: Duration,
    max_keys: Option<usize>,
    max_memory: Option<u64>,
    tick_interval: Duration,
    queue_capacity: usize,
}

impl CacheOptions {
    // == Constructor ==
    /// Creates options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    // == Builders ==
    /// Sets the sliding ttl shared by all entries.
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Caps the number of live keys. Zero removes the cap.
    ///
    /// Once the recency list grows past the cap, the least recently used
    /// entries are evicted by the maintenance task.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = (max_keys > 0).then_some(max_keys);
        self
    }

    /// Records a memory ceiling parsed from strings like `"64MB"`.
    ///
    /// The value is validated and exposed but no eviction is driven by it.
    pub fn with_max_memory(mut self, max_memory: &str) -> Result<Self> {
        self.max_memory = Some(parse_memory_size(max_memory)?);
        Ok(self)
    }

    /// Sets the sweep interval, never below one millisecond.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Sets the hand-off queue capacity, never below one.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    // == Accessors ==
    pub fn expire(&self) -> Duration {
        self.expire
    }

    pub fn max_keys(&self) -> Option<usize> {
        self.max_keys
    }

    /// Memory ceiling in bytes, if one was configured
    pub fn max_memory(&self) -> Option<u64> {
        self.max_memory
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    // == From Env ==
    /// Loads options from environment variables, keeping defaults for unset ones.
    ///
    /// # Environment Variables
    /// - `LOCALCACHE_EXPIRE_MS` - Sliding ttl in milliseconds (default: 300000)
    /// - `LOCALCACHE_MAX_KEYS` - Live key cap, 0 for none (default: none)
    /// - `LOCALCACHE_MAX_MEMORY` - Memory ceiling such as `64MB` (default: none)
    /// - `LOCALCACHE_TICK_MS` - Sweep interval in milliseconds (default: 50)
    /// - `LOCALCACHE_QUEUE_CAPACITY` - Hand-off queue size (default: 5)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "LOCALCACHE_EXPIRE_MS")? {
            options = options.with_expire(Duration::from_millis(ms));
        }
        if let Some(max_keys) = parse_var::<usize, _>(&lookup, "LOCALCACHE_MAX_KEYS")? {
            options = options.with_max_keys(max_keys);
        }
        if let Some(max_memory) = lookup("LOCALCACHE_MAX_MEMORY") {
            options = options.with_max_memory(&max_memory)?;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "LOCALCACHE_TICK_MS")? {
            options = options.with_tick_interval(Duration::from_millis(ms));
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "LOCALCACHE_QUEUE_CAPACITY")? {
            options = options.with_queue_capacity(capacity);
        }

        Ok(options)
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expire: DEFAULT_EXPIRE,
            max_keys: None,
            max_memory: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::InvalidOption { name, value: raw }),
        None => Ok(None),
    }
}

// == Memory Size Parsing ==
/// Parses a byte count with an optional `B`, `KB`, `MB` or `GB` suffix.
///
/// Suffixes are case-insensitive binary multiples (1KB = 1024 bytes).
pub fn parse_memory_size(input: &str) -> Result<u64> {
    let normalized = input.trim().to_ascii_uppercase();
    let invalid = || CacheError::InvalidMemorySize(input.to_string());

    let (digits, multiplier) = if let Some(n) = normalized.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = normalized.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = normalized.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = normalized.strip_suffix('B') {
        (n, 1)
    } else {
        (normalized.as_str(), 1)
    };

    let digits = digits.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}
