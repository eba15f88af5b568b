//! Vetrina response cache.
//!
//! An L1 cache of rendered public pages. Content edits happen upstream, so
//! entries expire on a TTL instead of being invalidated by events.
//!
//! ```toml
//! [cache]
//! enable_l1_cache = true
//! l1_response_limit = 200
//! l1_ttl_seconds = 60
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::L1Key;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachedResponse, L1Store};
