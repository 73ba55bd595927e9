use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Size at which `put` first drops expired entries.
const SWEEP_AT: usize = 256;
/// Hard cap; once reached, new pages are rendered but not cached.
pub const MAX_ENTRIES: usize = 1024;

/// Rendered index pages keyed by (viewer, page), each kept for a fixed TTL.
#[derive(Clone)]
pub struct PageCache {
    store: Arc<DashMap<String, (Instant, String)>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self { store: Arc::new(DashMap::new()), ttl }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// `page` is the resolved page number, so `?page=01` and `?page=junk` never add entries.
    pub fn key(viewer: Option<&str>, page: usize) -> String {
        format!("{}|{page}", viewer.unwrap_or(""))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the cached body if it is still fresh; expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled() { return None; }
        let now = Instant::now();
        let hit = self.store.get(key).and_then(|entry| {
            let (stored, body) = entry.value();
            (now.duration_since(*stored) < self.ttl).then(|| body.clone())
        });
        if hit.is_none() {
            self.store.remove(key);
        }
        hit
    }

    pub fn put(&self, key: String, body: String) {
        if !self.enabled() { return; }
        let now = Instant::now();
        if self.store.len() >= SWEEP_AT {
            let ttl = self.ttl;
            self.store.retain(|_, (stored, _)| now.duration_since(*stored) < ttl);
        }
        if self.store.len() >= MAX_ENTRIES && !self.store.contains_key(&key) {
            return;
        }
        self.store.insert(key, (now, body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_until_expiry() {
        let cache = PageCache::new(Duration::from_millis(40));
        let key = PageCache::key(Some("leo"), 1);
        cache.put(key.clone(), "<html>".into());
        assert_eq!(cache.get(&key).as_deref(), Some("<html>"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn zero_ttl_disables() {
        let cache = PageCache::new(Duration::ZERO);
        cache.put("k".into(), "v".into());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entries_are_swept_on_put() {
        let cache = PageCache::new(Duration::from_millis(40));
        for n in 0..SWEEP_AT {
            cache.put(PageCache::key(None, n + 1), "<html>".into());
        }
        assert_eq!(cache.len(), SWEEP_AT);
        std::thread::sleep(Duration::from_millis(60));
        cache.put(PageCache::key(Some("ann"), 1), "<html>".into());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entry_count_is_capped() {
        let cache = PageCache::new(Duration::from_secs(60));
        for n in 0..MAX_ENTRIES + 10 {
            cache.put(PageCache::key(None, n + 1), "<html>".into());
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
        // pages already cached can still be refreshed
        cache.put(PageCache::key(None, 1), "<new>".into());
        assert_eq!(cache.get(&PageCache::key(None, 1)).as_deref(), Some("<new>"));
    }
}
