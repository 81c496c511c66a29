//! Bounded LRU caches for the prediction tiers.
//!
//! One `LruTier` instance backs each operation kind (fast prefix,
//! keyboard correction, context, exact match, reject). Each tier is a
//! single mutex-protected `lru::LruCache`, so a get-then-put sequence
//! performed through `get_or_try_insert_with` is atomic with respect to
//! other writers.

use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A thread-safe bounded LRU cache keyed by the tier's string key
/// (`"{operation}:{input}:{limit}"`).
///
/// The size never exceeds the configured capacity; inserting into a full
/// tier evicts the least-recently-touched entry.
#[derive(Debug)]
pub struct LruTier<V: Clone> {
    inner: Mutex<lru::LruCache<String, V>>,
    hits: Mutex<usize>,
    misses: Mutex<usize>,
}

impl<V: Clone> LruTier<V> {
    /// Create a tier with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(lru::LruCache::new(cap)),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Look up a key, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(key) {
            Some(v) => {
                *self.hits.lock().unwrap_or_else(|e| e.into_inner()) += 1;
                Some(v.clone())
            }
            None => {
                *self.misses.lock().unwrap_or_else(|e| e.into_inner()) += 1;
                None
            }
        }
    }

    /// Insert a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key.into(), value);
    }

    /// Atomic get-or-compute: the tier lock is held across `compute`, so
    /// two identical concurrent queries invoke it at most once. A `None`
    /// from `compute` (a blown budget, say) is returned without being
    /// cached, leaving the key free for a later retry.
    pub fn get_or_try_insert_with(
        &self,
        key: &str,
        compute: impl FnOnce() -> Option<V>,
    ) -> Option<V> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(v) = cache.get(key) {
            *self.hits.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            return Some(v.clone());
        }
        *self.misses.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let v = compute()?;
        cache.put(key.to_string(), v.clone());
        Some(v)
    }

    /// Drop every entry whose key matches `predicate`.
    ///
    /// This is the invalidation sweep run on word submission; the
    /// predicate sees the cache key string, not the cached values.
    pub fn remove_keys_matching(&self, predicate: impl Fn(&str) -> bool) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = cache
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            cache.pop(&key);
        }
    }

    /// Remove all entries and reset statistics.
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.hits.lock().unwrap_or_else(|e| e.into_inner()) = 0;
        *self.misses.lock().unwrap_or_else(|e| e.into_inner()) = 0;
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).cap().get()
    }

    /// (hits, misses) counters since the last clear.
    pub fn stats(&self) -> (usize, usize) {
        (
            *self.hits.lock().unwrap_or_else(|e| e.into_inner()),
            *self.misses.lock().unwrap_or_else(|e| e.into_inner()),
        )
    }
}

/// The five caches of the tiered prediction pipeline.
#[derive(Debug)]
pub struct TieredCache {
    /// Fast prefix results, keyed `fast:{prefix}:{limit}`.
    pub fast: LruTier<Vec<String>>,
    /// Keyboard-adjacency correction results, keyed `keyboard:{input}:{limit}`
    /// (heavy-tier results land here too, keyed `heavy:{input}:{limit}`).
    pub keyboard: LruTier<Vec<String>>,
    /// Context predictions, keyed `context:{prev}|{prefix}|{limit}`.
    pub context: LruTier<Vec<String>>,
    /// Words confirmed to exist in the dictionary.
    pub exact: LruTier<bool>,
    /// Words confirmed NOT to exist; distinct from `exact` so a flood of
    /// unknown input cannot evict confirmed words.
    pub reject: LruTier<bool>,
}

impl TieredCache {
    pub fn new(cfg: &crate::Config) -> Self {
        Self {
            fast: LruTier::new(cfg.fast_cache_size),
            keyboard: LruTier::new(cfg.keyboard_cache_size),
            context: LruTier::new(cfg.context_cache_size),
            exact: LruTier::new(cfg.exact_cache_size),
            reject: LruTier::new(cfg.reject_cache_size),
        }
    }

    /// Purge result entries related to a submitted word.
    ///
    /// Matches the submitted word against the cache key string, not the
    /// cached value list. This both under- and over-invalidates in corner
    /// cases; preserved as the documented behavior.
    pub fn invalidate_for_submission(&self, word: &str) {
        self.fast.remove_keys_matching(|k| k.contains(word));
        self.keyboard.remove_keys_matching(|k| k.contains(word));
        self.context.remove_keys_matching(|k| k.contains(word));
    }

    /// Clear every tier.
    pub fn clear_all(&self) {
        self.fast.clear();
        self.keyboard.clear();
        self.context.clear();
        self.exact.clear();
        self.reject.clear();
    }

    /// Human-readable per-tier sizes for diagnostics.
    pub fn stats_string(&self) -> String {
        format!(
            "fast: {}, keyboard: {}, context: {}, exact: {}, reject: {}",
            self.fast.len(),
            self.keyboard.len(),
            self.context.len(),
            self.exact.len(),
            self.reject.len()
        )
    }
}
