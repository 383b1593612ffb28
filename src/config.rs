//! Cache construction configuration.
//!
//! A plain, publicly-constructible struct assembled as a literal, matching
//! the configuration style the rest of this corpus actually consumes (as
//! opposed to a fluent builder): every field here is either mandatory or has
//! a sensible default, and none requires multi-step validation.

use std::num::NonZeroUsize;

use crate::error::CacheError;

/// Default `max_cache_size`, in bytes.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 1_048_576;

/// Default `max_object_size`, in bytes.
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 102_400;

/// Construction-time parameters for a [`crate::cache::Cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total size budget, in bytes, across all live entries.
    pub max_cache_size: u64,
    /// Largest single value the cache will accept.
    pub max_object_size: u64,
    /// Lower bound on the hash index's capacity; never resized below this.
    pub minsize: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            minsize: NonZeroUsize::new(1).expect("1 is nonzero"),
        }
    }
}

impl CacheConfig {
    /// Builds a config with the given cache size budget and the default
    /// `max_object_size`/`minsize`.
    pub fn with_max_cache_size(max_cache_size: u64) -> Self {
        Self {
            max_cache_size,
            ..Default::default()
        }
    }

    /// Validates the config, rejecting a `max_object_size` that could never
    /// be satisfied by `max_cache_size`.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_object_size > self.max_cache_size {
            return Err(CacheError::InvalidConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_documented_constants() {
        let config = CacheConfig::default();
        assert_eq!(config.max_cache_size, 1_048_576);
        assert_eq!(config.max_object_size, 102_400);
        assert_eq!(config.minsize.get(), 1);
    }

    #[test]
    fn test_with_max_cache_size_overrides_only_that_field() {
        let config = CacheConfig::with_max_cache_size(16);
        assert_eq!(config.max_cache_size, 16);
        assert_eq!(config.max_object_size, DEFAULT_MAX_OBJECT_SIZE);
    }

    #[test]
    fn test_validate_rejects_object_larger_than_cache() {
        let config = CacheConfig {
            max_cache_size: 10,
            max_object_size: 20,
            minsize: NonZeroUsize::new(1).unwrap(),
        };
        assert_eq!(config.validate(), Err(CacheError::InvalidConfig));
    }

    #[test]
    fn test_validate_accepts_equal_sizes() {
        let config = CacheConfig {
            max_cache_size: 10,
            max_object_size: 10,
            minsize: NonZeroUsize::new(1).unwrap(),
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
