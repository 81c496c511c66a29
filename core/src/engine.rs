//! Tiered prediction engine.
//!
//! Wraps a `DictionaryBackend` with per-tier latency budgets and LRU
//! result caches. Every query boundary is non-throwing: a backend
//! failure or a blown budget degrades to an empty candidate list, logged
//! but never propagated to the keystroke path.

use crate::backend::DictionaryBackend;
use crate::cache::TieredCache;
use crate::utils::normalize;
use crate::Config;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a background heavy-correction run, tagged with the request
/// generation so stale deliveries can be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeavyOutcome {
    pub generation: u64,
    pub input: String,
    pub candidates: Vec<String>,
}

/// Budgeted, cached front of a dictionary backend.
pub struct DictionaryEngine {
    backend: Arc<dyn DictionaryBackend>,
    caches: Arc<TieredCache>,
    cfg: Config,
    available: AtomicBool,
    heavy_generation: AtomicU64,
    // Highest heavy generation sent so far. The staleness check and the
    // send happen under this lock so outcomes arrive in order.
    heavy_delivered: Arc<Mutex<u64>>,
}

impl DictionaryEngine {
    pub fn new(backend: Arc<dyn DictionaryBackend>, cfg: Config) -> Self {
        Self {
            backend,
            caches: Arc::new(TieredCache::new(&cfg)),
            cfg,
            available: AtomicBool::new(false),
            heavy_generation: AtomicU64::new(0),
            heavy_delivered: Arc::new(Mutex::new(0)),
        }
    }

    /// Load both dictionary tables, retrying on failure.
    ///
    /// After `load_retries` failed rounds the engine marks itself
    /// unavailable and every query returns empty until a later `load`
    /// succeeds. A successful load warms the fast cache.
    pub fn load(&self, unigram: &Path, bigram: &Path) -> bool {
        for attempt in 1..=self.cfg.load_retries {
            if self.backend.load_unigram(unigram) && self.backend.load_bigram(bigram) {
                self.available.store(true, Ordering::SeqCst);
                info!(attempt, "dictionary loaded");
                self.prewarm();
                return true;
            }
            warn!(attempt, retries = self.cfg.load_retries, "dictionary load failed");
            if attempt < self.cfg.load_retries {
                thread::sleep(Duration::from_millis(self.cfg.load_retry_delay_ms));
            }
        }
        self.available.store(false, Ordering::SeqCst);
        false
    }

    /// Whether the backend is loaded and answering.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && self.backend.is_initialized()
    }

    /// Prefix prediction under the fast-tier budget.
    pub fn fast_predict(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() || limit == 0 || !self.is_available() {
            return Vec::new();
        }
        let key = format!("fast:{}:{}", prefix, limit);
        let out = self.caches.fast.get_or_try_insert_with(&key, || {
            self.run_budgeted(self.cfg.fast_budget_ms, {
                let backend = Arc::clone(&self.backend);
                let prefix = prefix.clone();
                move || backend.fast_predict(&prefix, limit)
            })
        });
        match out {
            Some(out) => out,
            None => {
                warn!(%prefix, "fast tier over budget");
                Vec::new()
            }
        }
    }

    /// Keyboard-adjacency correction under the keyboard-tier budget.
    pub fn keyboard_correct(&self, input: &str, limit: usize) -> Vec<String> {
        let input = normalize(input);
        if input.is_empty() || limit == 0 || !self.is_available() {
            return Vec::new();
        }
        let key = format!("keyboard:{}:{}", input, limit);
        let out = self.caches.keyboard.get_or_try_insert_with(&key, || {
            self.run_budgeted(self.cfg.keyboard_budget_ms, {
                let backend = Arc::clone(&self.backend);
                let input = input.clone();
                move || backend.keyboard_correct(&input, limit)
            })
        });
        match out {
            Some(out) => out,
            None => {
                warn!(%input, "keyboard tier over budget");
                Vec::new()
            }
        }
    }

    /// Context-aware next-word prediction; falls back to plain prefix
    /// prediction when the context tier blows its budget.
    pub fn context_predict(&self, previous: &str, prefix: &str, limit: usize) -> Vec<String> {
        let previous = normalize(previous);
        let prefix = normalize(prefix);
        if limit == 0 || !self.is_available() {
            return Vec::new();
        }
        if previous.is_empty() {
            return self.fast_predict(&prefix, limit);
        }
        let key = format!("context:{}|{}|{}", previous, prefix, limit);
        let out = self.caches.context.get_or_try_insert_with(&key, || {
            self.run_budgeted(self.cfg.context_budget_ms, {
                let backend = Arc::clone(&self.backend);
                let previous = previous.clone();
                let prefix = prefix.clone();
                move || backend.context_predict(&previous, &prefix, limit)
            })
        });
        match out {
            Some(out) => out,
            None => {
                warn!(%previous, %prefix, "context tier over budget, using fast tier");
                self.fast_predict(&prefix, limit)
            }
        }
    }

    /// Dictionary membership with positive and negative caching.
    pub fn is_word(&self, word: &str) -> bool {
        let word = normalize(word);
        if word.is_empty() || !self.is_available() {
            return false;
        }
        if self.caches.reject.get(&word).is_some() {
            return false;
        }
        // Confirmed words go through the exact tier atomically; negatives
        // (and blown budgets) land in the reject tier instead.
        let found = self
            .caches
            .exact
            .get_or_try_insert_with(&word, || {
                let hit = self
                    .run_budgeted(self.cfg.exact_budget_ms, {
                        let backend = Arc::clone(&self.backend);
                        let word = word.clone();
                        move || backend.exact_match(&word)
                    })
                    .unwrap_or(false);
                hit.then_some(true)
            })
            .is_some();
        if !found {
            self.caches.reject.put(word, true);
        }
        found
    }

    /// Blended candidate list for the composing word.
    ///
    /// Priority order: the literal input when it is a dictionary word,
    /// then fast prefix completions up to half the remaining slots, then
    /// keyboard corrections for the rest. Duplicates keep their first
    /// (highest-priority) position.
    pub fn smart_candidates(&self, input: &str, limit: usize) -> Vec<String> {
        let input = normalize(input);
        if input.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut out: Vec<String> = Vec::with_capacity(limit);
        if self.is_word(&input) {
            out.push(input.clone());
        }
        // Prefix completions fill half the remaining slots; corrections
        // take the rest.
        let half = limit.saturating_sub(out.len()).div_ceil(2);
        let mut taken = 0;
        for w in self.fast_predict(&input, limit) {
            if taken >= half || out.len() >= limit {
                break;
            }
            if !out.contains(&w) {
                out.push(w);
                taken += 1;
            }
        }
        for w in self.keyboard_correct(&input, limit) {
            if out.len() >= limit {
                break;
            }
            if !out.contains(&w) {
                out.push(w);
            }
        }
        out.truncate(limit);
        out
    }

    /// Launch the heavy correction tier on a background thread.
    ///
    /// Returns the generation assigned to this request. The outcome is
    /// sent over `tx` unless a newer request already delivered; stale
    /// results are dropped, never sent. Cached results deliver
    /// synchronously.
    pub fn heavy_correct_async(
        &self,
        input: &str,
        limit: usize,
        tx: mpsc::Sender<HeavyOutcome>,
    ) -> u64 {
        let input = normalize(input);
        let generation = self.heavy_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if input.is_empty() || limit == 0 || !self.is_available() {
            return generation;
        }
        let key = format!("heavy:{}:{}", input, limit);
        if let Some(hit) = self.caches.keyboard.get(&key) {
            let mut newest = self.heavy_delivered.lock().unwrap_or_else(|e| e.into_inner());
            if generation >= *newest {
                *newest = generation;
                let _ = tx.send(HeavyOutcome {
                    generation,
                    input,
                    candidates: hit,
                });
            }
            return generation;
        }
        let backend = Arc::clone(&self.backend);
        let delivered = Arc::clone(&self.heavy_delivered);
        let caches = Arc::clone(&self.caches);
        thread::spawn(move || {
            let candidates = backend.heavy_correct(&input, limit);
            // Held across the send so outcomes cannot leave out of order.
            let mut newest = delivered.lock().unwrap_or_else(|e| e.into_inner());
            if generation < *newest {
                debug!(generation, newest = *newest, "dropping stale heavy result");
                return;
            }
            *newest = generation;
            caches.keyboard.put(key, candidates.clone());
            let _ = tx.send(HeavyOutcome {
                generation,
                input,
                candidates,
            });
        });
        generation
    }

    /// A word was committed: sweep related cache entries and tell the
    /// backend.
    pub fn notify_submission(&self, word: &str) {
        let word = normalize(word);
        if word.is_empty() {
            return;
        }
        self.caches.invalidate_for_submission(&word);
        self.backend.notify_submission(&word);
    }

    /// Warm the fast cache with the configured high-traffic prefixes.
    pub fn prewarm(&self) {
        let prefixes = self.cfg.prewarm_prefixes.clone();
        for p in &prefixes {
            let _ = self.fast_predict(p, self.cfg.default_limit);
        }
        debug!(count = prefixes.len(), "fast cache prewarmed");
    }

    /// Per-tier entry counts for diagnostics.
    pub fn cache_stats(&self) -> String {
        self.caches.stats_string()
    }

    /// Drop every cached result.
    pub fn clear_caches(&self) {
        self.caches.clear_all();
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Release the backend; subsequent queries return empty.
    pub fn close(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.backend.close();
    }

    fn run_budgeted<T: Send + 'static>(
        &self,
        budget_ms: u64,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> Option<T> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(job());
        });
        rx.recv_timeout(Duration::from_millis(budget_ms)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct MockBackend {
        words: Vec<(String, u32)>,
        fast_calls: AtomicUsize,
        delay: Mutex<Duration>,
        submitted: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn new(words: &[(&str, u32)]) -> Self {
            Self {
                words: words.iter().map(|(w, f)| (w.to_string(), *f)).collect(),
                fast_calls: AtomicUsize::new(0),
                delay: Mutex::new(Duration::ZERO),
                submitted: Mutex::new(Vec::new()),
            }
        }

        fn set_delay(&self, d: Duration) {
            *self.delay.lock().unwrap() = d;
        }

        fn ranked_with_prefix(&self, prefix: &str) -> Vec<String> {
            let mut hits: Vec<_> = self
                .words
                .iter()
                .filter(|(w, _)| w.starts_with(prefix))
                .collect();
            hits.sort_by(|a, b| b.1.cmp(&a.1));
            hits.into_iter().map(|(w, _)| w.clone()).collect()
        }
    }

    impl DictionaryBackend for MockBackend {
        fn load_unigram(&self, _: &Path) -> bool {
            true
        }
        fn load_bigram(&self, _: &Path) -> bool {
            true
        }
        fn fast_predict(&self, prefix: &str, limit: usize) -> Vec<String> {
            self.fast_calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(*self.delay.lock().unwrap());
            let mut out = self.ranked_with_prefix(prefix);
            out.truncate(limit);
            out
        }
        fn keyboard_correct(&self, _input: &str, _limit: usize) -> Vec<String> {
            vec!["бала".to_string()]
        }
        fn heavy_correct(&self, input: &str, limit: usize) -> Vec<String> {
            // Deterministic slow path for the staleness test.
            if input == "бллл" {
                thread::sleep(Duration::from_millis(150));
            }
            let mut out: Vec<String> = self.words.iter().map(|(w, _)| w.clone()).collect();
            out.truncate(limit);
            out
        }
        fn context_predict(&self, _previous: &str, prefix: &str, limit: usize) -> Vec<String> {
            thread::sleep(*self.delay.lock().unwrap());
            let mut out = self.ranked_with_prefix(prefix);
            out.truncate(limit);
            out
        }
        fn exact_match(&self, word: &str) -> bool {
            self.words.iter().any(|(w, _)| w == word)
        }
        fn notify_submission(&self, word: &str) {
            self.submitted.lock().unwrap().push(word.to_string());
        }
        fn is_initialized(&self) -> bool {
            true
        }
        fn close(&self) {}
    }

    fn engine_with(backend: Arc<MockBackend>) -> DictionaryEngine {
        let cfg = Config {
            fast_budget_ms: 50,
            keyboard_budget_ms: 50,
            context_budget_ms: 50,
            exact_budget_ms: 50,
            load_retry_delay_ms: 1,
            prewarm_prefixes: Vec::new(),
            ..Config::default()
        };
        let engine = DictionaryEngine::new(backend, cfg);
        assert!(engine.load(Path::new("u"), Path::new("b")));
        engine
    }

    #[test]
    fn fast_results_are_cached() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100), ("балға", 50)]));
        let engine = engine_with(Arc::clone(&backend));
        let first = engine.fast_predict("бал", 5);
        let second = engine.fast_predict("бал", 5);
        assert_eq!(first, vec!["бала", "балға"]);
        assert_eq!(first, second);
        assert_eq!(backend.fast_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blown_budget_degrades_to_empty() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(Arc::clone(&backend));
        backend.set_delay(Duration::from_millis(200));
        assert!(engine.fast_predict("ба", 5).is_empty());
    }

    #[test]
    fn context_timeout_falls_back_to_fast_tier() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(Arc::clone(&backend));
        // Warm the fast cache before the backend slows down.
        let _ = engine.fast_predict("ба", 5);
        backend.set_delay(Duration::from_millis(200));
        let out = engine.context_predict("мен", "ба", 5);
        assert_eq!(out, vec!["бала"]);
    }

    #[test]
    fn is_word_uses_reject_cache() {
        let backend = Arc::new(MockBackend::new(&[("сөз", 10)]));
        let engine = engine_with(Arc::clone(&backend));
        assert!(engine.is_word("сөз"));
        assert!(!engine.is_word("сөзз"));
        // Second miss is answered from the reject cache.
        assert!(!engine.is_word("сөзз"));
    }

    #[test]
    fn smart_candidates_put_literal_word_first() {
        let backend = Arc::new(MockBackend::new(&[("ал", 10), ("алма", 100), ("алға", 90)]));
        let engine = engine_with(backend);
        let out = engine.smart_candidates("ал", 5);
        assert_eq!(out[0], "ал");
        assert!(out.contains(&"алма".to_string()));
        assert!(out.contains(&"бала".to_string()));
    }

    #[test]
    fn heavy_outcome_carries_its_generation() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(backend);
        let (tx, rx) = mpsc::channel();
        let generation = engine.heavy_correct_async("балб", 5, tx);
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome.generation, generation);
        assert_eq!(outcome.candidates, vec!["бала"]);
    }

    #[test]
    fn stale_heavy_results_are_dropped() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(Arc::clone(&backend));
        let (tx_old, rx_old) = mpsc::channel();
        let (tx_new, rx_new) = mpsc::channel();
        let old = engine.heavy_correct_async("бллл", 5, tx_old);
        let new = engine.heavy_correct_async("балб", 5, tx_new);
        assert!(new > old);
        let fresh = rx_new.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fresh.generation, new);
        // The slower, older request finishes after the newer one delivered.
        assert!(rx_old.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn heavy_deliveries_never_regress_generations() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(backend);
        // Interleave slow and fast heavy requests into one channel; the
        // generations received must come out in increasing order even
        // when a slow worker finishes after a newer fast one.
        let (tx, rx) = mpsc::channel();
        for _ in 0..20 {
            engine.heavy_correct_async("бллл", 5, tx.clone());
            engine.heavy_correct_async("балб", 5, tx.clone());
        }
        drop(tx);

        let mut last = 0;
        while let Ok(outcome) = rx.recv_timeout(Duration::from_secs(2)) {
            assert!(
                outcome.generation > last,
                "generation {} delivered after {}",
                outcome.generation,
                last
            );
            last = outcome.generation;
        }
        assert!(last > 0);
    }

    #[test]
    fn submission_sweeps_caches_and_reaches_backend() {
        let backend = Arc::new(MockBackend::new(&[("бала", 100)]));
        let engine = engine_with(Arc::clone(&backend));
        let _ = engine.fast_predict("бала", 5);
        engine.notify_submission("бала");
        assert_eq!(backend.submitted.lock().unwrap().as_slice(), ["бала"]);
        // The submitted word appears in the cache key, so the sweep
        // removes the entry and the next query recomputes it.
        let _ = engine.fast_predict("бала", 5);
        assert_eq!(backend.fast_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn submission_sweep_is_keyed_by_substring_only() {
        let backend = Arc::new(MockBackend::new(&[("бал", 50), ("бала", 100)]));
        let engine = engine_with(Arc::clone(&backend));
        let _ = engine.fast_predict("бал", 5);
        // "бала" is not a substring of the "fast:бал:5" key, so that
        // entry survives the sweep. Coarse, but the documented behavior.
        engine.notify_submission("бала");
        let _ = engine.fast_predict("бал", 5);
        assert_eq!(backend.fast_calls.load(Ordering::SeqCst), 1);
    }
}
