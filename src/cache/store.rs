//! L1 HTTP response cache for rendered public pages.

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::config::CacheConfig;
use super::keys::L1Key;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_L1_EVICT: &str = "vetrina_cache_l1_evict_total";

/// Cached HTTP response.
#[derive(Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: Instant,
}

impl CachedResponse {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// L1 response cache storage.
///
/// Entries expire after the configured TTL since content changes upstream
/// without notifying the site.
pub struct L1Store {
    responses: RwLock<LruCache<L1Key, CachedResponse>>,
    ttl: Duration,
}

impl L1Store {
    /// Create a new L1 store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: RwLock::new(LruCache::new(config.l1_response_limit_non_zero())),
            ttl: config.l1_ttl,
        }
    }

    pub fn get(&self, key: &L1Key) -> Option<CachedResponse> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &L1Key, now: Instant) -> Option<CachedResponse> {
        let mut responses = rw_write(&self.responses, SOURCE, "l1_get");
        match responses.get(key) {
            Some(cached) if cached.is_fresh(self.ttl, now) => Some(cached.clone()),
            Some(_) => {
                responses.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: L1Key, response: CachedResponse) -> Option<L1Key> {
        let evicted = rw_write(&self.responses, SOURCE, "l1_set")
            .push(key.clone(), response)
            .map(|(evicted_key, _)| evicted_key)
            .filter(|evicted_key| *evicted_key != key);
        if evicted.is_some() {
            counter!(METRIC_L1_EVICT).increment(1);
        }
        evicted
    }

    /// Get the number of cached responses.
    pub fn len(&self) -> usize {
        rw_read(&self.responses, SOURCE, "l1_len").len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str, stored_at: Instant) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            body: Bytes::from(body),
            stored_at,
        }
    }

    #[test]
    fn l1_response_cache_roundtrip() {
        let store = L1Store::new(&CacheConfig::default());
        let key = L1Key::new("/blog/hello-world", "");

        assert!(store.get(&key).is_none());
        assert!(store.set(key.clone(), response("Hello", Instant::now())).is_none());

        let cached = store.get(&key).expect("cached response");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, Bytes::from("Hello"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let config = CacheConfig {
            l1_ttl: Duration::from_secs(30),
            ..Default::default()
        };
        let store = L1Store::new(&config);
        let key = L1Key::new("/", "");
        let stored_at = Instant::now();
        store.set(key.clone(), response("home", stored_at));

        assert!(store.get_at(&key, stored_at + Duration::from_secs(10)).is_some());
        assert!(store.get_at(&key, stored_at + Duration::from_secs(31)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn lru_eviction_reports_the_evicted_key() {
        let config = CacheConfig {
            l1_response_limit: 1,
            ..Default::default()
        };
        let store = L1Store::new(&config);
        let first = L1Key::new("/a", "");
        let second = L1Key::new("/b", "");

        store.set(first.clone(), response("a", Instant::now()));
        assert!(store.set(first.clone(), response("a2", Instant::now())).is_none());
        assert_eq!(
            store.set(second.clone(), response("b", Instant::now())),
            Some(first.clone())
        );
        assert!(store.get(&first).is_none());
        assert_eq!(store.len(), 1);
    }
}
