//! Dictionary backend capability boundary.
//!
//! `DictionaryBackend` is the contract the prediction engine talks to;
//! one instance exists per supported language. `EmbeddedBackend` is the
//! in-process implementation (trie + `GramStore` + keyboard adjacency +
//! bounded edit distance); deployments may swap in an external module
//! behind the same trait.

use crate::gram_store::GramStore;
use crate::utils::normalize;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, error};

/// Operations an opaque prediction/correction module must provide.
///
/// Implementations must never panic across this boundary; failures are
/// reported as `false` or empty lists.
pub trait DictionaryBackend: Send + Sync {
    /// Load the unigram table from `path`. Idempotent.
    fn load_unigram(&self, path: &Path) -> bool;
    /// Load the bigram table from `path`. Idempotent.
    fn load_bigram(&self, path: &Path) -> bool;
    /// Prefix lookup, most frequent first.
    fn fast_predict(&self, prefix: &str, limit: usize) -> Vec<String>;
    /// Correct a possibly-misspelled input by substituting physically
    /// adjacent keys.
    fn keyboard_correct(&self, input: &str, limit: usize) -> Vec<String>;
    /// Full spell-correction pass. Expensive; the engine runs this on a
    /// background task and may discard the result.
    fn heavy_correct(&self, input: &str, limit: usize) -> Vec<String>;
    /// Next-word prediction given the previously committed word.
    fn context_predict(&self, previous: &str, prefix: &str, limit: usize) -> Vec<String>;
    /// Whether `word` is a dictionary word.
    fn exact_match(&self, word: &str) -> bool;
    /// A word was committed by the user.
    fn notify_submission(&self, word: &str);
    /// Whether both tables loaded successfully.
    fn is_initialized(&self) -> bool;
    /// Release resources; queries afterwards return empty results.
    fn close(&self);
}

/// Physical key neighborhood for one keyboard layout.
///
/// Two characters are adjacent when their keys touch on the layout grid:
/// same row one column apart, or neighboring rows within one column.
#[derive(Debug, Clone, Default)]
pub struct KeyAdjacency {
    neighbors: AHashMap<char, Vec<char>>,
}

impl KeyAdjacency {
    /// Build an adjacency map from layout rows, top row first.
    pub fn from_rows(rows: &[&str]) -> Self {
        let grid: Vec<Vec<char>> = rows.iter().map(|r| r.chars().collect()).collect();
        let mut neighbors: AHashMap<char, Vec<char>> = AHashMap::new();
        for (ri, row) in grid.iter().enumerate() {
            for (ci, &ch) in row.iter().enumerate() {
                let entry = neighbors.entry(ch).or_default();
                let mut push = |c: char| {
                    if c != ch && !entry.contains(&c) {
                        entry.push(c);
                    }
                };
                for dr in [-1i32, 0, 1] {
                    let Some(r) = grid.get((ri as i32 + dr) as usize) else {
                        continue;
                    };
                    for dc in [-1i32, 0, 1] {
                        if let Some(&c) = r.get((ci as i32 + dc) as usize) {
                            push(c);
                        }
                    }
                }
            }
        }
        Self { neighbors }
    }

    /// The standard Kazakh Cyrillic layout.
    pub fn cyrillic_kazakh() -> Self {
        Self::from_rows(&[
            "әіңғүұқөһ",
            "йцукенгшщзхъ",
            "фывапролджэ",
            "ячсмитьбю",
        ])
    }

    /// QWERTY-based Kazakh Latin layout.
    pub fn latin() -> Self {
        Self::from_rows(&[
            "qwertyuıop",
            "asdfghjklñ",
            "zxcvbnmşü",
        ])
    }

    /// Characters adjacent to `ch` on this layout.
    pub fn neighbors(&self, ch: char) -> &[char] {
        self.neighbors.get(&ch).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// In-process dictionary backend over a `GramStore`.
///
/// Both logical tables live in one relational store file, so
/// `load_unigram` and `load_bigram` accept the same path; the first call
/// opens the store, the second verifies it.
pub struct EmbeddedBackend {
    state: RwLock<Option<Loaded>>,
    adjacency: KeyAdjacency,
    last_submitted: Mutex<Option<String>>,
}

struct Loaded {
    store: GramStore,
    path: PathBuf,
    unigram_ready: bool,
    bigram_ready: bool,
}

impl EmbeddedBackend {
    /// Create a backend for the given layout; tables load later through
    /// the `DictionaryBackend` contract.
    pub fn new(adjacency: KeyAdjacency) -> Self {
        Self {
            state: RwLock::new(None),
            adjacency,
            last_submitted: Mutex::new(None),
        }
    }

    /// Convenience constructor for an already-populated store.
    pub fn with_store(store: GramStore, path: PathBuf, adjacency: KeyAdjacency) -> Self {
        Self {
            state: RwLock::new(Some(Loaded {
                store,
                path,
                unigram_ready: true,
                bigram_ready: true,
            })),
            adjacency,
            last_submitted: Mutex::new(None),
        }
    }

    /// Most recently submitted word, if any.
    pub fn last_submitted(&self) -> Option<String> {
        self.last_submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn load_table(&self, path: &Path, bigram: bool) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(loaded) = state.as_mut() {
            if loaded.path == path {
                if bigram {
                    loaded.bigram_ready = true;
                } else {
                    loaded.unigram_ready = true;
                }
                return true;
            }
            error!(
                requested = %path.display(),
                open = %loaded.path.display(),
                "embedded backend keeps both tables in one store file"
            );
            return false;
        }
        match GramStore::open(path) {
            Ok(store) => {
                debug!(path = %path.display(), rows = store.len(), "gram store opened");
                *state = Some(Loaded {
                    store,
                    path: path.to_path_buf(),
                    unigram_ready: !bigram,
                    bigram_ready: bigram,
                });
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "gram store open failed");
                false
            }
        }
    }

    fn with_store_read<T>(&self, f: impl FnOnce(&GramStore) -> T, empty: T) -> T {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.as_ref() {
            Some(loaded) => f(&loaded.store),
            None => empty,
        }
    }
}

impl DictionaryBackend for EmbeddedBackend {
    fn load_unigram(&self, path: &Path) -> bool {
        self.load_table(path, false)
    }

    fn load_bigram(&self, path: &Path) -> bool {
        self.load_table(path, true)
    }

    fn fast_predict(&self, prefix: &str, limit: usize) -> Vec<String> {
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        self.with_store_read(|s| s.prefix_search(prefix, limit), Vec::new())
    }

    fn keyboard_correct(&self, input: &str, limit: usize) -> Vec<String> {
        if input.is_empty() || limit == 0 {
            return Vec::new();
        }
        self.with_store_read(
            |store| {
                let chars: Vec<char> = input.chars().collect();
                let mut words: Vec<(String, u32)> = Vec::new();
                let mut prefixes: Vec<String> = Vec::new();
                for (i, &ch) in chars.iter().enumerate() {
                    for &sub in self.adjacency.neighbors(ch) {
                        let mut candidate: String =
                            chars.iter().take(i).collect();
                        candidate.push(sub);
                        candidate.extend(chars.iter().skip(i + 1));
                        if store.contains(&candidate) {
                            if !words.iter().any(|(w, _)| w == &candidate) {
                                let freq = store.frequency(&candidate);
                                words.push((candidate, freq));
                            }
                        } else if !prefixes.contains(&candidate) {
                            prefixes.push(candidate);
                        }
                    }
                }
                words.sort_by(|a, b| b.1.cmp(&a.1));
                let mut out: Vec<String> = words.into_iter().map(|(w, _)| w).collect();
                // Fill the remainder with completions of corrected prefixes.
                for p in prefixes {
                    if out.len() >= limit {
                        break;
                    }
                    for w in store.prefix_search(&p, limit - out.len()) {
                        if !out.contains(&w) {
                            out.push(w);
                        }
                    }
                }
                out.truncate(limit);
                out
            },
            Vec::new(),
        )
    }

    fn heavy_correct(&self, input: &str, limit: usize) -> Vec<String> {
        if input.is_empty() || limit == 0 {
            return Vec::new();
        }
        let input = normalize(input);
        self.with_store_read(
            |store| {
                let mut scored: Vec<(usize, u32, String)> = Vec::new();
                for word in store.most_frequent(usize::MAX) {
                    if let Some(d) = bounded_edit_distance(&input, &word, 2) {
                        if d > 0 {
                            scored.push((d, store.frequency(&word), word));
                        }
                    }
                }
                scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
                scored.into_iter().take(limit).map(|(_, _, w)| w).collect()
            },
            Vec::new(),
        )
    }

    fn context_predict(&self, previous: &str, prefix: &str, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        self.with_store_read(|s| s.context_next(previous, prefix, limit), Vec::new())
    }

    fn exact_match(&self, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        self.with_store_read(|s| s.contains(word), false)
    }

    fn notify_submission(&self, word: &str) {
        let mut last = self.last_submitted.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(word.to_string());
    }

    fn is_initialized(&self) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .as_ref()
            .map(|l| l.unigram_ready && l.bigram_ready)
            .unwrap_or(false)
    }

    fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = None;
    }
}

/// Levenshtein distance with a cutoff; `None` when the distance exceeds
/// `max`. Row-wise DP with an early exit once a whole row is above the
/// cutoff.
fn bounded_edit_distance(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        let mut row_min = cur[0];
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
            row_min = row_min.min(cur[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (prev[b.len()] <= max).then_some(prev[b.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn backend_with(rows: &[(&str, u32)]) -> EmbeddedBackend {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.redb");
        let mut store = GramStore::open(&path).unwrap();
        store
            .import_unigrams(rows.iter().map(|(w, f)| (w.to_string(), *f)))
            .unwrap();
        std::mem::forget(dir);
        EmbeddedBackend::with_store(store, path, KeyAdjacency::cyrillic_kazakh())
    }

    #[test]
    fn adjacency_is_symmetric_and_local() {
        let adj = KeyAdjacency::cyrillic_kazakh();
        assert!(adj.neighbors('й').contains(&'ц'));
        assert!(adj.neighbors('ц').contains(&'й'));
        // Opposite ends of the row are not neighbors.
        assert!(!adj.neighbors('й').contains(&'ъ'));
    }

    #[test]
    fn keyboard_correct_substitutes_nearby_keys() {
        // "сапа" typed as "сама": п sits directly above м on the layout.
        let backend = backend_with(&[("сапа", 50), ("дала", 40)]);
        let out = backend.keyboard_correct("сама", 5);
        assert!(out.contains(&"сапа".to_string()));
    }

    #[test]
    fn heavy_correct_ranks_by_distance_then_frequency() {
        let backend = backend_with(&[("бала", 100), ("балта", 60), ("дала", 90)]);
        let out = backend.heavy_correct("балб", 5);
        // distance 1: "бала" (100) and "далб"? no — "дала" is distance 2.
        assert_eq!(out[0], "бала");
        assert!(out.contains(&"балта".to_string()));
    }

    #[test]
    fn queries_before_load_return_empty() {
        let backend = EmbeddedBackend::new(KeyAdjacency::cyrillic_kazakh());
        assert!(!backend.is_initialized());
        assert!(backend.fast_predict("а", 5).is_empty());
        assert!(!backend.exact_match("бала"));
    }

    #[test]
    fn load_contract_is_idempotent_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kk.redb");
        let backend = EmbeddedBackend::new(KeyAdjacency::cyrillic_kazakh());
        assert!(backend.load_unigram(&path));
        assert!(!backend.is_initialized());
        assert!(backend.load_bigram(&path));
        assert!(backend.is_initialized());
        // A different path for the second table is refused.
        assert!(!backend.load_bigram(&PathBuf::from("/nonexistent/other.redb")));
        backend.close();
        assert!(!backend.is_initialized());
    }

    #[test]
    fn bounded_edit_distance_cutoff() {
        assert_eq!(bounded_edit_distance("бала", "бала", 2), Some(0));
        assert_eq!(bounded_edit_distance("бала", "балта", 2), Some(1));
        assert_eq!(bounded_edit_distance("бала", "сөйлем", 2), None);
    }
}
