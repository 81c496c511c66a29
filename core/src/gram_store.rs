//! Unigram/bigram/phrase store backing the in-process dictionary backend.
//!
//! Two logical tables live in one redb database file:
//! `unigram(word -> freq)` and `bigram(word1 -> [(word2, freq), ...])`,
//! the bigram rows serialized with bincode and kept sorted by frequency
//! descending. At load time the unigram rows are mirrored into memory: a
//! `PrefixIndex` for enumeration, a frequency map for ranking, and the
//! phrase indexes derived from multi-word rows ("A B" contributes
//! `next_after["A"] += "B"` and `phrases_starting_with["A"] += "A B"`).
//! After loading the store is read-only.

use crate::trie::PrefixIndex;
use crate::utils::normalize;
use ahash::AHashMap;
use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const UNIGRAM: TableDefinition<&str, u32> = TableDefinition::new("unigram");
const BIGRAM: TableDefinition<&str, &[u8]> = TableDefinition::new("bigram");

/// One `(nextWord, frequency)` entry of a word's bigram distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigramRow {
    pub word: String,
    pub freq: u32,
}

/// Frequency-ranked word and phrase store.
pub struct GramStore {
    db: Database,
    /// Every unigram row, including multi-word phrases.
    words: AHashMap<String, u32>,
    /// Single words (no separator) sorted by frequency descending.
    by_freq: Vec<String>,
    /// Enumeration trie over rows longer than one character.
    index: PrefixIndex,
    /// Phrase-derived next-word index: "A B" adds B under A.
    next_after: AHashMap<String, Vec<String>>,
    /// First word of a phrase to the full phrase text.
    starting: AHashMap<String, Vec<String>>,
}

impl GramStore {
    /// Open (or create) the database at `path` and mirror its unigram
    /// rows into the in-memory indexes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("open gram store {}", path.display()))?;
        // Ensure both tables exist so later read transactions never fail.
        let txn = db.begin_write()?;
        txn.open_table(UNIGRAM)?;
        txn.open_table(BIGRAM)?;
        txn.commit()?;

        let mut store = Self {
            db,
            words: AHashMap::new(),
            by_freq: Vec::new(),
            index: PrefixIndex::new(),
            next_after: AHashMap::new(),
            starting: AHashMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Rebuild the in-memory mirrors from the unigram table.
    pub fn reload(&mut self) -> Result<()> {
        self.words.clear();
        self.by_freq.clear();
        self.index = PrefixIndex::new();
        self.next_after.clear();
        self.starting.clear();

        let txn = self.db.begin_read()?;
        let table = txn.open_table(UNIGRAM)?;
        for item in table.iter()? {
            let (k, v) = item?;
            let word = k.value().to_string();
            let freq = v.value();
            if word.is_empty() {
                continue;
            }
            self.add_row(word, freq);
        }

        let mut singles: Vec<(&String, &u32)> = self
            .words
            .iter()
            .filter(|(w, _)| !w.contains(' ') && w.chars().count() > 1)
            .collect();
        singles.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        self.by_freq = singles.into_iter().map(|(w, _)| w.clone()).collect();

        debug!(
            words = self.words.len(),
            phrases = self.starting.len(),
            "gram store loaded"
        );
        Ok(())
    }

    fn add_row(&mut self, word: String, freq: u32) {
        // Single characters stay out of the trie; they drown prefix results.
        if word.chars().count() > 1 {
            self.index.insert(&word);
        }
        if word.contains(' ') {
            let parts: Vec<&str> = word.split_whitespace().collect();
            if parts.len() >= 2 {
                for pair in parts.windows(2) {
                    let next = self.next_after.entry(pair[0].to_string()).or_default();
                    if !next.iter().any(|w| w == pair[1]) {
                        next.push(pair[1].to_string());
                    }
                }
                let full = self.starting.entry(parts[0].to_string()).or_default();
                if !full.iter().any(|p| p == &word) {
                    full.push(word.clone());
                }
            }
        }
        self.words.insert(word, freq);
    }

    /// Bulk-import unigram rows (load/build time only).
    pub fn import_unigrams<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(UNIGRAM)?;
            for (word, freq) in rows {
                let word = normalize(&word);
                if word.is_empty() {
                    continue;
                }
                // Frequencies only increase on import, never decrease.
                let prev = table.get(word.as_str())?.map(|g| g.value()).unwrap_or(0);
                table.insert(word.as_str(), prev.max(freq))?;
            }
        }
        txn.commit()?;
        self.reload()
    }

    /// Bulk-import bigram rows as `(word1, word2, freq)` triples.
    pub fn import_bigrams<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String, u32)>,
    {
        let mut grouped: AHashMap<String, Vec<BigramRow>> = AHashMap::new();
        for (w1, w2, freq) in rows {
            let w1 = normalize(&w1);
            let w2 = normalize(&w2);
            if w1.is_empty() || w2.is_empty() {
                continue;
            }
            let rows = grouped.entry(w1).or_default();
            match rows.iter_mut().find(|r| r.word == w2) {
                Some(row) => row.freq = row.freq.max(freq),
                None => rows.push(BigramRow { word: w2, freq }),
            }
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BIGRAM)?;
            for (w1, mut rows) in grouped {
                if let Some(existing) = table.get(w1.as_str())? {
                    if let Ok(old) = bincode::deserialize::<Vec<BigramRow>>(existing.value()) {
                        for row in old {
                            if !rows.iter().any(|r| r.word == row.word) {
                                rows.push(row);
                            }
                        }
                    }
                }
                rows.sort_by(|a, b| b.freq.cmp(&a.freq).then_with(|| a.word.cmp(&b.word)));
                let payload = bincode::serialize(&rows)?;
                table.insert(w1.as_str(), payload.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Frequency of a unigram row, 0 when absent.
    pub fn frequency(&self, word: &str) -> u32 {
        self.words.get(word).copied().unwrap_or(0)
    }

    /// Whether `word` exists as a full unigram row.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    /// Words starting with `prefix`, ranked by frequency descending.
    pub fn prefix_search(&self, prefix: &str, limit: usize) -> Vec<String> {
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut hits = self.index.words_with_prefix(prefix);
        hits.sort_by(|a, b| self.frequency(b).cmp(&self.frequency(a)));
        hits.truncate(limit);
        hits
    }

    /// Globally most frequent single words.
    pub fn most_frequent(&self, limit: usize) -> Vec<String> {
        self.by_freq.iter().take(limit).cloned().collect()
    }

    /// Bigram rows for `word1`, most frequent first, optionally filtered
    /// by a prefix on the following word.
    pub fn bigram_next(&self, word1: &str, prefix: &str, limit: usize) -> Vec<String> {
        let rows = match self.read_bigram_rows(word1) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(word1, error = %e, "bigram read failed");
                return Vec::new();
            }
        };
        rows.into_iter()
            .map(|r| r.word)
            .filter(|w| prefix.is_empty() || w.starts_with(prefix))
            .take(limit)
            .collect()
    }

    fn read_bigram_rows(&self, word1: &str) -> Result<Vec<BigramRow>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BIGRAM)?;
        match table.get(word1)? {
            Some(payload) => Ok(bincode::deserialize(payload.value())?),
            None => Ok(Vec::new()),
        }
    }

    /// Next-word prediction for `previous`, filling up to `limit` results
    /// from, in order: the bigram table, phrase-derived next words, plain
    /// prefix search, and finally the global most-frequent words. Later
    /// stages only supply the remainder.
    pub fn context_next(&self, previous: &str, prefix: &str, limit: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let push = |word: String, out: &mut Vec<String>| {
            if !word.is_empty() && !out.iter().any(|w| w == &word) {
                out.push(word);
            }
        };

        for w in self.bigram_next(previous, prefix, limit) {
            push(w, &mut out);
            if out.len() >= limit {
                return out;
            }
        }

        if let Some(nexts) = self.next_after.get(previous) {
            for w in nexts {
                if prefix.is_empty() || w.starts_with(prefix) {
                    push(w.clone(), &mut out);
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        }

        if !prefix.is_empty() {
            for w in self.prefix_search(prefix, limit) {
                push(w, &mut out);
                if out.len() >= limit {
                    return out;
                }
            }
        }

        for w in self.most_frequent(limit) {
            if prefix.is_empty() || w.starts_with(prefix) {
                push(w, &mut out);
                if out.len() >= limit {
                    break;
                }
            }
        }
        out
    }

    /// Full phrases whose first word is `word`.
    pub fn phrases_starting_with(&self, word: &str) -> &[String] {
        self.starting.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of unigram rows.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl std::fmt::Debug for GramStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GramStore")
            .field("words", &self.words.len())
            .field("phrases", &self.starting.len())
            .finish()
    }
}
