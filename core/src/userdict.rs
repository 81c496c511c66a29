//! Learned per-user dictionary.
//!
//! Words the user commits that the static dictionary does not know land
//! here, together with (previous word -> word) context counts. The whole
//! structure lives in memory; a bincode snapshot is written to disk on
//! demand and automatically every `autosave_threshold` mutations, with a
//! `.bak` copy kept from the previous successful save.

use crate::trie::PrefixIndex;
use crate::utils::normalize;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    words: Vec<(String, u32)>,
    contexts: Vec<(String, Vec<(String, u32)>)>,
}

#[derive(Default)]
struct State {
    words: AHashMap<String, u32>,
    index: PrefixIndex,
    contexts: AHashMap<String, AHashMap<String, u32>>,
    dirty: u32,
    path: Option<PathBuf>,
}

impl State {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            words: self.words.iter().map(|(w, f)| (w.clone(), *f)).collect(),
            contexts: self
                .contexts
                .iter()
                .map(|(prev, m)| {
                    (
                        prev.clone(),
                        m.iter().map(|(w, c)| (w.clone(), *c)).collect(),
                    )
                })
                .collect(),
        }
    }

    fn rebuild_index(&mut self) {
        let mut index = PrefixIndex::new();
        for word in self.words.keys() {
            index.insert(word);
        }
        self.index = index;
    }
}

/// Thread-safe learned dictionary, bounded by `capacity`.
///
/// When full, adding a new word evicts the current lowest-frequency
/// entry, so long-standing habits survive one-off typos.
pub struct UserDictionary {
    state: Mutex<State>,
    // Serializes snapshot writes from foreground and autosave threads.
    save_lock: Arc<Mutex<()>>,
    capacity: usize,
    autosave_threshold: u32,
}

impl UserDictionary {
    pub fn new(capacity: usize, autosave_threshold: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            save_lock: Arc::new(Mutex::new(())),
            capacity: capacity.max(1),
            autosave_threshold: autosave_threshold.max(1),
        }
    }

    pub fn with_config(cfg: &crate::Config) -> Self {
        Self::new(cfg.user_dict_capacity, cfg.autosave_threshold)
    }

    /// Load the snapshot at `path`, remembering it as the autosave
    /// target. Idempotent: loading the already-loaded path is a no-op; a
    /// missing file is treated as an empty dictionary.
    ///
    /// The whole check-and-load runs under the state lock, so concurrent
    /// first-time callers share one initialization: the first performs
    /// the work, the rest observe its outcome.
    pub fn load(&self, path: &Path) -> anyhow::Result<()> {
        let mut state = self.lock_state();
        if state.path.as_deref() == Some(path) {
            return Ok(());
        }
        state.words.clear();
        state.contexts.clear();
        state.index = PrefixIndex::new();
        state.dirty = 0;
        if path.exists() {
            let bytes = std::fs::read(path)?;
            let snapshot: Snapshot = bincode::deserialize(&bytes)?;
            for (word, freq) in snapshot.words {
                state.words.insert(word, freq);
            }
            for (prev, entries) in snapshot.contexts {
                state.contexts.insert(prev, entries.into_iter().collect());
            }
            state.rebuild_index();
            info!(path = %path.display(), words = state.words.len(), "user dictionary loaded");
        } else {
            debug!(path = %path.display(), "no user dictionary snapshot, starting empty");
        }
        state.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Raise the frequency of `word` by `freq_delta`, inserting it if
    /// unknown. Returns false for empty input.
    pub fn add_word(&self, word: &str, freq_delta: u32) -> bool {
        let word = normalize(word);
        if word.is_empty() {
            return false;
        }
        let mut state = self.lock_state();
        self.bump(&mut state, &word, freq_delta);
        self.mutated(&mut state);
        true
    }

    /// Record a use of `word` after `previous`, feeding the context map
    /// with the same delta.
    pub fn add_word_with_context(&self, word: &str, previous: &str, freq_delta: u32) -> bool {
        let word = normalize(word);
        let previous = normalize(previous);
        if word.is_empty() {
            return false;
        }
        let mut state = self.lock_state();
        self.bump(&mut state, &word, freq_delta);
        if !previous.is_empty() {
            let count = state
                .contexts
                .entry(previous)
                .or_default()
                .entry(word)
                .or_insert(0);
            *count = count.saturating_add(freq_delta);
        }
        self.mutated(&mut state);
        true
    }

    /// Forget a word entirely, including its context entries.
    pub fn remove_word(&self, word: &str) -> bool {
        let word = normalize(word);
        let mut state = self.lock_state();
        if state.words.remove(&word).is_none() {
            return false;
        }
        for entries in state.contexts.values_mut() {
            entries.remove(&word);
        }
        state.rebuild_index();
        self.mutated(&mut state);
        true
    }

    /// Adjust the stored frequency of an existing word by `delta`,
    /// saturating at the `u32` bounds.
    pub fn update_frequency(&self, word: &str, delta: i32) -> bool {
        let word = normalize(word);
        let mut state = self.lock_state();
        match state.words.get_mut(&word) {
            Some(f) => {
                *f = if delta >= 0 {
                    f.saturating_add(delta as u32)
                } else {
                    f.saturating_sub(delta.unsigned_abs())
                };
                self.mutated(&mut state);
                true
            }
            None => false,
        }
    }

    /// Learned words starting with `prefix`, most frequent first.
    pub fn search_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let state = self.lock_state();
        let mut hits: Vec<(String, u32)> = state
            .index
            .words_with_prefix(&prefix)
            .into_iter()
            .map(|w| {
                let f = state.words.get(&w).copied().unwrap_or(0);
                (w, f)
            })
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        hits.into_iter().take(limit).map(|(w, _)| w).collect()
    }

    /// Context-ranked completions: words seen after `previous` come
    /// first, then plain prefix matches fill the remainder.
    pub fn search_with_context(&self, previous: &str, prefix: &str, limit: usize) -> Vec<String> {
        let previous = normalize(previous);
        let prefix = normalize(prefix);
        if limit == 0 {
            return Vec::new();
        }
        let mut out: Vec<String> = Vec::new();
        {
            let state = self.lock_state();
            if let Some(entries) = state.contexts.get(&previous) {
                let mut ranked: Vec<(&String, u32)> = entries
                    .iter()
                    .filter(|(w, _)| w.starts_with(&prefix))
                    .map(|(w, c)| (w, *c))
                    .collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1));
                out.extend(ranked.into_iter().take(limit).map(|(w, _)| w.clone()));
            }
        }
        if out.len() < limit && !prefix.is_empty() {
            for w in self.search_prefix(&prefix, limit) {
                if out.len() >= limit {
                    break;
                }
                if !out.contains(&w) {
                    out.push(w);
                }
            }
        }
        out
    }

    pub fn contains_word(&self, word: &str) -> bool {
        let word = normalize(word);
        self.lock_state().words.contains_key(&word)
    }

    /// Bulk import, then persist in the background.
    pub fn import_words(&self, words: impl IntoIterator<Item = (String, u32)>) -> usize {
        let mut imported = 0;
        {
            let mut state = self.lock_state();
            for (word, freq) in words {
                let word = normalize(&word);
                if word.is_empty() {
                    continue;
                }
                let existing = state.words.get(&word).copied().unwrap_or(0);
                state.words.insert(word.clone(), existing.max(freq));
                state.index.insert(&word);
                imported += 1;
            }
            self.enforce_capacity(&mut state);
        }
        self.save_in_background();
        imported
    }

    /// All learned words with their frequencies, unordered.
    pub fn export_words(&self) -> Vec<(String, u32)> {
        self.lock_state()
            .words
            .iter()
            .map(|(w, f)| (w.clone(), *f))
            .collect()
    }

    /// Drop everything learned; the snapshot path is kept so later
    /// saves still know their target.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.words.clear();
        state.contexts.clear();
        state.index = PrefixIndex::new();
        self.mutated(&mut state);
    }

    /// (word count, context-pair count).
    pub fn stats(&self) -> (usize, usize) {
        let state = self.lock_state();
        let pairs = state.contexts.values().map(|m| m.len()).sum();
        (state.words.len(), pairs)
    }

    /// Human-readable summary for diagnostics.
    pub fn stats_string(&self) -> String {
        let (words, pairs) = self.stats();
        format!("words: {}, context pairs: {}, capacity: {}", words, pairs, self.capacity)
    }

    /// Write a snapshot to the loaded path now, keeping the previous
    /// file as `.bak`.
    pub fn save(&self) -> anyhow::Result<()> {
        let (snapshot, path) = {
            let state = self.lock_state();
            let path = state
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("user dictionary has no snapshot path"))?;
            (state.snapshot(), path)
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_snapshot(&snapshot, &path)
    }

    fn bump(&self, state: &mut State, word: &str, freq_delta: u32) {
        match state.words.get_mut(word) {
            Some(f) => *f = f.saturating_add(freq_delta),
            None => {
                state.words.insert(word.to_string(), freq_delta.max(1));
                state.index.insert(word);
                self.enforce_capacity(state);
            }
        }
    }

    fn enforce_capacity(&self, state: &mut State) {
        let mut evicted = false;
        while state.words.len() > self.capacity {
            let victim = state
                .words
                .iter()
                .min_by_key(|(_, f)| **f)
                .map(|(w, _)| w.clone());
            match victim {
                Some(w) => {
                    state.words.remove(&w);
                    for entries in state.contexts.values_mut() {
                        entries.remove(&w);
                    }
                    debug!(word = %w, "evicted lowest-frequency user word");
                    evicted = true;
                }
                None => break,
            }
        }
        if evicted {
            state.rebuild_index();
        }
    }

    fn mutated(&self, state: &mut State) {
        state.dirty += 1;
        if state.dirty >= self.autosave_threshold {
            state.dirty = 0;
            if let Some(path) = state.path.clone() {
                self.spawn_save(state.snapshot(), path);
            }
        }
    }

    fn save_in_background(&self) {
        let (snapshot, path) = {
            let state = self.lock_state();
            match state.path.clone() {
                Some(path) => (state.snapshot(), path),
                None => return,
            }
        };
        self.spawn_save(snapshot, path);
    }

    fn spawn_save(&self, snapshot: Snapshot, path: PathBuf) {
        let lock = Arc::clone(&self.save_lock);
        thread::spawn(move || {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = write_snapshot(&snapshot, &path) {
                warn!(path = %path.display(), error = %e, "user dictionary autosave failed");
            }
        });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_snapshot(snapshot: &Snapshot, path: &Path) -> anyhow::Result<()> {
    let bytes = bincode::serialize(snapshot)?;
    std::fs::write(path, bytes)?;
    let mut bak = path.as_os_str().to_owned();
    bak.push(".bak");
    std::fs::copy(path, PathBuf::from(bak))?;
    Ok(())
}

impl std::fmt::Debug for UserDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (words, pairs) = self.stats();
        f.debug_struct("UserDictionary")
            .field("words", &words)
            .field("context_pairs", &pairs)
            .field("capacity", &self.capacity)
            .finish()
    }
}
