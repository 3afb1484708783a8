//! Per-provider memo of raw search results.
//!
//! Entries live for the lifetime of the process. The cache stops accepting
//! new keys once `max` entries exist and nothing is ever evicted (not an LRU).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{CacheStats, Resource};

/// Which provider operation produced the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Search,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    kind: QueryKind,
    topic: String,
    limit: usize,
}

impl QueryKey {
    /// Trims and lower-cases the topic. Only the key is normalized; the
    /// provider still queries with the caller's text.
    pub fn new(kind: QueryKind, topic: &str, limit: usize) -> Self {
        Self {
            kind,
            topic: topic.trim().to_lowercase(),
            limit,
        }
    }
}

pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, Vec<Resource>>>,
    max: usize,
}

impl QueryCache {
    pub fn new(max: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max,
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Vec<Resource>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Store `value` under `key`. A new key is dropped silently when the
    /// cache is full; an existing key is overwritten.
    pub fn put(&self, key: QueryKey, value: Vec<Resource>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.max && !entries.contains_key(&key) {
            return;
        }
        entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_queries: self.len(),
            max: self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn hit(title: &str) -> Vec<Resource> {
        vec![Resource::ranked(
            title.to_string(),
            format!("https://{}.com", title),
            String::new(),
            0,
            ContentType::Article,
        )]
    }

    #[test]
    fn test_key_normalizes_topic() {
        assert_eq!(
            QueryKey::new(QueryKind::Search, "  Binary Search ", 3),
            QueryKey::new(QueryKind::Search, "binary search", 3)
        );
        assert_ne!(
            QueryKey::new(QueryKind::Search, "binary search", 3),
            QueryKey::new(QueryKind::Search, "binary search", 4)
        );
        assert_ne!(
            QueryKey::new(QueryKind::Search, "binary search", 3),
            QueryKey::new(QueryKind::Video, "binary search", 3)
        );
    }

    #[test]
    fn test_get_after_put() {
        let cache = QueryCache::new(4);
        let key = QueryKey::new(QueryKind::Search, "recursion", 2);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), hit("a"));
        assert_eq!(cache.get(&key).unwrap()[0].title, "a");
    }

    #[test]
    fn test_full_cache_drops_new_keys_and_keeps_old() {
        let cache = QueryCache::new(2);
        cache.put(QueryKey::new(QueryKind::Search, "a", 1), hit("a"));
        cache.put(QueryKey::new(QueryKind::Search, "b", 1), hit("b"));
        cache.put(QueryKey::new(QueryKind::Search, "c", 1), hit("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&QueryKey::new(QueryKind::Search, "a", 1)).is_some());
        assert!(cache.get(&QueryKey::new(QueryKind::Search, "b", 1)).is_some());
        assert!(cache.get(&QueryKey::new(QueryKind::Search, "c", 1)).is_none());
    }

    #[test]
    fn test_full_cache_still_overwrites_existing_key() {
        let cache = QueryCache::new(1);
        let key = QueryKey::new(QueryKind::Search, "a", 1);
        cache.put(key.clone(), hit("old"));
        cache.put(key.clone(), hit("new"));
        assert_eq!(cache.get(&key).unwrap()[0].title, "new");
    }

    #[test]
    fn test_stats() {
        let cache = QueryCache::new(200);
        cache.put(QueryKey::new(QueryKind::Video, "a", 1), hit("a"));
        assert_eq!(
            cache.stats(),
            CacheStats {
                cached_queries: 1,
                max: 200
            }
        );
    }
}
