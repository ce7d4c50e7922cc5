//! Error types for the cache
//!
//! Cache operations are total; only building the configuration can fail.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Memory limit string could not be parsed (expects e.g. "512KB", "64MB", "2GB")
    #[error("Invalid memory size: {0}")]
    InvalidMemorySize(String),

    /// An option value could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidOption {
        /// Option or environment variable name
        name: &'static str,
        /// The rejected raw value
        value: String,
    },
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
