use crate::crypto::key::SymmetricKey;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_CAPACITY: usize = 16;
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

struct CacheValue {
    key: SymmetricKey,
    expires_at: Instant,
}

/// In-memory LRU of derived keys, keyed by salt.
pub struct KeyCache {
    ttl: Duration,
    inner: LruCache<String, CacheValue>,
}

impl KeyCache {
    /// Construct a cache with the provided capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let size = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            inner: LruCache::new(size),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Fetch a key if present and not expired.
    pub fn get(&mut self, salt: &str) -> Option<SymmetricKey> {
        self.get_with_now(salt, Instant::now())
    }

    pub fn insert(&mut self, salt: &str, key: SymmetricKey) {
        self.insert_with_now(salt, key, Instant::now());
    }

    #[cfg(test)]
    pub(crate) fn get_at(&mut self, salt: &str, now: Instant) -> Option<SymmetricKey> {
        self.get_with_now(salt, now)
    }

    #[cfg(test)]
    pub(crate) fn insert_at(&mut self, salt: &str, key: SymmetricKey, now: Instant) {
        self.insert_with_now(salt, key, now);
    }

    fn insert_with_now(&mut self, salt: &str, key: SymmetricKey, now: Instant) {
        let entry = CacheValue {
            key,
            expires_at: now + self.ttl,
        };
        self.inner.put(salt.to_string(), entry);
    }

    fn get_with_now(&mut self, salt: &str, now: Instant) -> Option<SymmetricKey> {
        self.purge_expired(now);
        self.inner.get(salt).map(|value| value.key.clone())
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .inner
            .iter()
            .filter(|(_, value)| value.expires_at <= now)
            .map(|(salt, _)| salt.clone())
            .collect();

        for salt in expired {
            self.inner.pop(&salt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_and_miss() {
        let mut cache = KeyCache::new(4, Duration::from_secs(5));
        assert!(cache.get("profile").is_none());
        cache.insert("profile", SymmetricKey::from_bytes([7; 32]));
        let key = cache.get("profile").expect("cache hit");
        assert_eq!(key.as_bytes(), &[7; 32]);
        assert!(cache.get("insurance").is_none());
    }

    #[test]
    fn cache_expiry() {
        let mut cache = KeyCache::new(4, Duration::from_millis(1));
        let now = Instant::now();
        cache.insert_at("profile", SymmetricKey::from_bytes([1; 32]), now);
        assert!(cache.get_at("profile", now).is_some());
        assert!(cache
            .get_at("profile", now + Duration::from_millis(2))
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let mut cache = KeyCache::new(2, Duration::from_secs(60));
        cache.insert("a", SymmetricKey::from_bytes([1; 32]));
        cache.insert("b", SymmetricKey::from_bytes([2; 32]));
        cache.insert("c", SymmetricKey::from_bytes([3; 32]));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
