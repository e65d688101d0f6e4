//! TTL'd, capacity-bounded byte cache.
//!
//! Backs the release-server gateway's read paths. Values are opaque bytes
//! (the gateway stores JSON) under string keys; every entry shares one TTL
//! and one capacity bound. Expiry is lazy: reads treat a stale entry as a
//! miss, writes purge stale entries before evicting the oldest live one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Entries live this long by default.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default entry bound; projects, variable sets, channels, lifecycles, and
/// environments all share the store.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    inserted_at: Instant,
}

/// Thread-safe keyed byte store with uniform TTL and a fixed capacity.
#[derive(Debug)]
pub struct ByteCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for ByteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteCache {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Returns the entry's bytes, or `None` when absent or expired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.bytes.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it so the map does not accumulate dead entries.
        self.entries.write().remove(key);
        None
    }

    /// Inserts or replaces an entry, evicting to stay within capacity.
    pub fn set(&self, key: &str, bytes: Vec<u8>) {
        let mut entries = self.entries.write();

        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                bytes,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = ByteCache::new();
        cache.set("AllProjects", b"[]".to_vec());
        assert_eq!(cache.get("AllProjects"), Some(b"[]".to_vec()));
        assert_eq!(cache.get("AllChannels"), None);
    }

    #[test]
    fn overwrite_replaces_bytes() {
        let cache = ByteCache::new();
        cache.set("key", b"old".to_vec());
        cache.set("key", b"new".to_vec());
        assert_eq!(cache.get("key"), Some(b"new".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = ByteCache::new().with_ttl(Duration::from_millis(10));
        cache.set("key", b"value".to_vec());
        assert!(cache.get("key").is_some());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("key"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = ByteCache::new().with_capacity(2);
        cache.set("first", b"1".to_vec());
        std::thread::sleep(Duration::from_millis(5));
        cache.set("second", b"2".to_vec());
        std::thread::sleep(Duration::from_millis(5));
        cache.set("third", b"3".to_vec());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("first"), None);
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn capacity_prefers_purging_expired() {
        let cache = ByteCache::new()
            .with_capacity(2)
            .with_ttl(Duration::from_millis(10));
        cache.set("stale", b"1".to_vec());
        std::thread::sleep(Duration::from_millis(20));

        cache.set("fresh-a", b"2".to_vec());
        cache.set("fresh-b", b"3".to_vec());
        assert!(cache.get("fresh-a").is_some());
        assert!(cache.get("fresh-b").is_some());
    }

    #[test]
    fn remove_and_clear() {
        let cache = ByteCache::new();
        cache.set("a", b"1".to_vec());
        cache.set("b", b"2".to_vec());
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
