//! Cache configuration.
//!
//! Controls the L1 response cache in front of the public pages.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_L1_RESPONSE_LIMIT: usize = 200;
const DEFAULT_L1_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable L1 response cache.
    pub enable_l1_cache: bool,
    /// Maximum HTTP responses in L1 cache.
    pub l1_response_limit: usize,
    /// How long a stored response may be served before it is refetched.
    pub l1_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_l1_cache: true,
            l1_response_limit: DEFAULT_L1_RESPONSE_LIMIT,
            l1_ttl: DEFAULT_L1_TTL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_l1_cache: settings.enable_l1_cache,
            l1_response_limit: settings.l1_response_limit,
            l1_ttl: settings.l1_ttl,
        }
    }
}

impl CacheConfig {
    /// Returns the L1 response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn l1_response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.l1_response_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
