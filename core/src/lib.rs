//! libqazaq-core
//!
//! Prediction-and-conversion engine for a multi-script input method
//! (Kazakh in Cyrillic/Latin/Arabic scripts, plus Russian and English
//! word prediction). The crate owns the tiered dictionary lookup and
//! caching pipeline, the bigram/phrase context model, the learned user
//! dictionary, script transliteration and the per-keystroke
//! orchestration that merges these sources under latency budgets.
//!
//! Public API:
//! - `PrefixIndex` - trie over the static word set
//! - `GramStore` - redb-backed unigram/bigram/phrase store
//! - `DictionaryBackend` / `EmbeddedBackend` - capability boundary and
//!   the in-process implementation
//! - `DictionaryEngine` - tiered prediction with budgets and caches
//! - `UserDictionary` - persisted per-user vocabulary
//! - `ScriptConverter` - Latin/Cyrillic/Arabic transliteration
//! - `CandidateOrchestrator` - per-keystroke coordinator
//! - `Config` - budgets, capacities and feature knobs
use serde::{Deserialize, Serialize};

pub mod trie;
pub use trie::PrefixIndex;

pub mod cache;
pub use cache::{LruTier, TieredCache};

pub mod gram_store;
pub use gram_store::GramStore;

pub mod backend;
pub use backend::{DictionaryBackend, EmbeddedBackend, KeyAdjacency};

pub mod engine;
pub use engine::{DictionaryEngine, HeavyOutcome};

pub mod userdict;
pub use userdict::UserDictionary;

pub mod convert;
pub use convert::{Script, ScriptConverter};

pub mod orchestrator;
pub use orchestrator::{
    CandidateOrchestrator, CandidateSink, ComposeState, ConversionState, KeyboardType,
    PredictionRequest,
};

/// Engine configuration.
///
/// Defaults carry the constants observed in production use: tier budgets
/// of 10/20/30/5 ms, cache capacities 500/1000/2000/2000/5000 and a
/// 10 000-entry user dictionary autosaved every 50 mutations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Budget for the fast prefix tier, in milliseconds.
    pub fast_budget_ms: u64,
    /// Budget for the keyboard-adjacency correction tier.
    pub keyboard_budget_ms: u64,
    /// Budget for bigram/phrase context queries.
    pub context_budget_ms: u64,
    /// Budget for exact-match existence checks.
    pub exact_budget_ms: u64,

    /// Capacity of the fast-prefix result cache.
    pub fast_cache_size: usize,
    /// Capacity of the keyboard-correction result cache.
    pub keyboard_cache_size: usize,
    /// Capacity of the context-prediction result cache.
    pub context_cache_size: usize,
    /// Capacity of the positive exact-match cache.
    pub exact_cache_size: usize,
    /// Capacity of the negative (reject) cache.
    pub reject_cache_size: usize,

    /// Dictionary load attempts before the engine marks itself unavailable.
    pub load_retries: u32,
    /// Delay between load attempts, in milliseconds.
    pub load_retry_delay_ms: u64,

    /// Prefixes warmed into the fast cache right after a successful load.
    pub prewarm_prefixes: Vec<String>,

    /// Maximum number of user dictionary entries; the lowest-frequency
    /// entry is evicted once the capacity is reached.
    pub user_dict_capacity: usize,
    /// Mutations between automatic background saves of the user dictionary.
    pub autosave_threshold: u32,

    /// Candidate count for normal requests.
    pub default_limit: usize,
    /// Candidate count when the expanded candidate view is open.
    pub expanded_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fast_budget_ms: 10,
            keyboard_budget_ms: 20,
            context_budget_ms: 30,
            exact_budget_ms: 5,
            fast_cache_size: 500,
            keyboard_cache_size: 1000,
            context_cache_size: 2000,
            exact_cache_size: 2000,
            reject_cache_size: 5000,
            load_retries: 3,
            load_retry_delay_ms: 1000,
            // Most frequent initial letters in the Kazakh corpus.
            prewarm_prefixes: ["а", "б", "қ", "с", "м", "о", "т", "ү", "і", "ә"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_dict_capacity: 10_000,
            autosave_threshold: 50,
            default_limit: 10,
            expanded_limit: 15,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    ///
    /// All dictionary keys pass through here so that composed and
    /// decomposed encodings of the same Cyrillic/Arabic text compare equal.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }
}
