//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// L1 response cache key: request path plus a hash of the query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct L1Key {
    pub path: String,
    pub query_hash: u64,
}

impl L1Key {
    pub fn new(path: impl Into<String>, query: &str) -> Self {
        Self {
            path: path.into(),
            query_hash: hash_query(query),
        }
    }
}

fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash a query string for L1 cache key generation.
fn hash_query(query: &str) -> u64 {
    hash_value(&query)
}
