//! Bounded LRU+TTL cache for sample-value autocomplete lookups (spec §4.H).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 200;
const TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct Entry {
    values: Vec<String>,
    last_touched: Instant,
}

/// Key identifying one autocomplete lookup: a table, column, and the
/// substring the client typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub table: String,
    pub column: String,
    pub substring: String,
}

/// A bounded, TTL-expiring cache of sample-value lookups, keyed by
/// `(table, column, substring)`. Every read or write refreshes the entry's
/// LRU timestamp; entries older than [`TTL`] are treated as absent, and the
/// least-recently-touched entry is evicted once the cache holds
/// [`MAX_ENTRIES`].
pub struct SampleCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `key`, returning `None` on a miss or an expired entry.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let entry = entries.get_mut(key)?;
        if entry.last_touched.elapsed() > TTL {
            entries.remove(key);
            return None;
        }
        entry.last_touched = Instant::now();
        Some(entry.values.clone())
    }

    /// Insert or replace `key`'s cached values, evicting the
    /// least-recently-touched entry first if the cache is full.
    pub fn put(&self, key: CacheKey, values: Vec<String>) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        if entries.len() >= MAX_ENTRIES && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_touched)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            Entry {
                values,
                last_touched: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: &str) -> CacheKey {
        CacheKey {
            table: "events".to_string(),
            column: "user".to_string(),
            substring: n.to_string(),
        }
    }

    #[test]
    fn miss_then_hit() {
        let cache = SampleCache::new();
        assert_eq!(cache.get(&key("a")), None);
        cache.put(key("a"), vec!["alice".to_string()]);
        assert_eq!(cache.get(&key("a")), Some(vec!["alice".to_string()]));
    }

    #[test]
    fn eviction_drops_least_recently_touched() {
        let cache = SampleCache::new();
        for i in 0..MAX_ENTRIES {
            cache.put(key(&i.to_string()), vec![i.to_string()]);
        }
        // Touch every entry except "0", making it the least-recently-touched.
        for i in 1..MAX_ENTRIES {
            cache.get(&key(&i.to_string()));
        }
        cache.put(key("overflow"), vec!["x".to_string()]);
        assert_eq!(cache.get(&key("0")), None);
        assert!(cache.get(&key("overflow")).is_some());
    }
}
