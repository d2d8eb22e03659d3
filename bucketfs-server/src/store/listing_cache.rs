use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use bucketfs_common::store::ObjectRecord;

const DEFAULT_TTL_SECS: u64 = 5;

struct CacheEntry {
    records: Vec<ObjectRecord>,
    inserted_at: Instant,
}

/// Short-lived cache of delimited listings, keyed by prefix.
///
/// Callers invalidate it before every client-facing listing, so it only
/// serves lookups made while one operation is in flight.
pub struct ListingCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, prefix: &str) -> Option<Vec<ObjectRecord>> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(prefix)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.records.clone())
        } else {
            None
        }
    }

    pub fn put(&self, prefix: &str, records: Vec<ObjectRecord>) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                prefix.to_string(),
                CacheEntry {
                    records,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ObjectRecord> {
        vec![
            ObjectRecord::file("bucket/dir/.keep"),
            ObjectRecord::directory("bucket/dir/sub/"),
        ]
    }

    #[test]
    fn test_cache_hit() {
        let cache = ListingCache::new();
        cache.put("bucket/dir/", records());
        assert_eq!(cache.get("bucket/dir/").unwrap().len(), 2);
        assert!(cache.get("bucket/other/").is_none());
    }

    #[test]
    fn test_cache_clear() {
        let cache = ListingCache::new();
        cache.put("bucket/dir/", records());
        cache.clear();
        assert!(cache.get("bucket/dir/").is_none());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = ListingCache::with_ttl(Duration::from_millis(0));
        cache.put("bucket/dir/", records());
        assert!(cache.get("bucket/dir/").is_none());
    }
}
