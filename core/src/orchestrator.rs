//! Per-keystroke coordination.
//!
//! The orchestrator owns the active keyboard, compose and conversion
//! state, one `DictionaryEngine` per predictive keyboard and the shared
//! `UserDictionary`. Each keystroke allocates a generation; candidate
//! lists are assembled on a worker thread and delivered through a
//! `CandidateSink`, with stale generations dropped at the delivery gate
//! so a fast typist never sees results for an older prefix.

use crate::convert::{Script, ScriptConverter};
use crate::engine::DictionaryEngine;
use crate::userdict::UserDictionary;
use crate::utils::normalize;
use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// The keyboards the input method ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyboardType {
    CyrillicKazakh,
    Latin,
    Arabic,
    Russian,
    English,
    Chinese,
}

impl KeyboardType {
    /// The writing system this keyboard produces, when it participates
    /// in script conversion.
    pub fn script(self) -> Option<Script> {
        match self {
            KeyboardType::CyrillicKazakh => Some(Script::Cyrillic),
            KeyboardType::Latin => Some(Script::Latin),
            KeyboardType::Arabic => Some(Script::Arabic),
            KeyboardType::Russian | KeyboardType::English | KeyboardType::Chinese => None,
        }
    }
}

/// Lifecycle of the word being composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposeState {
    /// Nothing buffered.
    #[default]
    Idle,
    /// Characters buffered, candidates pending or shown inline.
    Composing,
    /// The candidate view has focus.
    Candidate,
    /// A word was just committed; next-word predictions are showing.
    Predict,
}

/// Conversion mode for one keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionState {
    pub active: bool,
    pub target: Option<KeyboardType>,
}

/// One in-flight candidate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    pub generation: u64,
    pub keyboard: KeyboardType,
    pub prefix: String,
    pub previous_word: Option<String>,
    pub expanded: bool,
}

/// Receives candidate lists as they become ready. Implementations must
/// tolerate delivery from a worker thread.
pub trait CandidateSink: Send + Sync {
    fn deliver(&self, request: &PredictionRequest, candidates: Vec<String>);
}

/// Coordinates engines, the user dictionary and conversion per keystroke.
pub struct CandidateOrchestrator {
    engines: AHashMap<KeyboardType, Arc<DictionaryEngine>>,
    userdict: Arc<UserDictionary>,
    converter: ScriptConverter,
    cfg: crate::Config,
    keyboard: Mutex<KeyboardType>,
    compose: Arc<Mutex<ComposeState>>,
    conversion: Mutex<AHashMap<KeyboardType, ConversionState>>,
    last_committed: Mutex<Option<String>>,
    generation: AtomicU64,
    // Highest generation handed to a sink. A plain atomic is not enough
    // here: the staleness check and the delivery must happen under one
    // lock, or an older list can slip out after a newer one.
    delivered: Arc<Mutex<u64>>,
}

impl CandidateOrchestrator {
    pub fn new(userdict: Arc<UserDictionary>, cfg: crate::Config) -> Self {
        Self {
            engines: AHashMap::new(),
            userdict,
            converter: ScriptConverter::new(),
            cfg,
            keyboard: Mutex::new(KeyboardType::CyrillicKazakh),
            compose: Arc::new(Mutex::new(ComposeState::Idle)),
            conversion: Mutex::new(AHashMap::new()),
            last_committed: Mutex::new(None),
            generation: AtomicU64::new(0),
            delivered: Arc::new(Mutex::new(0)),
        }
    }

    /// Attach the prediction engine serving one keyboard.
    pub fn with_engine(mut self, keyboard: KeyboardType, engine: Arc<DictionaryEngine>) -> Self {
        self.engines.insert(keyboard, engine);
        self
    }

    pub fn set_keyboard(&self, keyboard: KeyboardType) {
        *self.lock(&self.keyboard) = keyboard;
    }

    pub fn keyboard(&self) -> KeyboardType {
        *self.lock(&self.keyboard)
    }

    pub fn compose_state(&self) -> ComposeState {
        *self.lock(&self.compose)
    }

    /// The candidate view took focus.
    pub fn focus_candidates(&self) {
        let mut state = self.lock(&self.compose);
        if *state == ComposeState::Composing {
            *state = ComposeState::Candidate;
        }
    }

    /// Abandon the current composition.
    pub fn reset_composition(&self) {
        *self.lock(&self.compose) = ComposeState::Idle;
    }

    /// Ask for candidates for the current prefix.
    ///
    /// Allocates and returns a fresh generation, moves the compose state
    /// to `Composing`, and assembles the list on a worker thread. The
    /// sink only sees this request if no newer one has delivered first.
    ///
    /// Merge priority: the literal prefix first, then user-learned words
    /// seen after `previous_word`, then user-learned prefix matches,
    /// then the main dictionary.
    pub fn request_candidates(
        &self,
        prefix: &str,
        previous_word: Option<&str>,
        expanded: bool,
        sink: Arc<dyn CandidateSink>,
    ) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = PredictionRequest {
            generation,
            keyboard: self.keyboard(),
            prefix: normalize(prefix),
            previous_word: previous_word.map(normalize).filter(|p| !p.is_empty()),
            expanded,
        };
        if request.prefix.is_empty() && request.previous_word.is_none() {
            return generation;
        }
        *self.lock(&self.compose) = if request.prefix.is_empty() {
            ComposeState::Predict
        } else {
            ComposeState::Composing
        };
        let limit = if expanded {
            self.cfg.expanded_limit
        } else {
            self.cfg.default_limit
        };
        let engine = self.engines.get(&request.keyboard).cloned();
        let userdict = Arc::clone(&self.userdict);
        let delivered = Arc::clone(&self.delivered);
        let compose = Arc::clone(&self.compose);
        let user_budget_ms = self.cfg.context_budget_ms;
        thread::spawn(move || {
            let candidates = assemble(&request, engine.as_deref(), &userdict, limit, user_budget_ms);
            // Held across the delivery so generations reach the sink in
            // order.
            let mut newest = delivered.lock().unwrap_or_else(|e| e.into_inner());
            if generation < *newest {
                debug!(generation, newest = *newest, "dropping stale candidate list");
                return;
            }
            *newest = generation;
            if !candidates.is_empty() && !request.prefix.is_empty() {
                let mut state = compose.lock().unwrap_or_else(|e| e.into_inner());
                if *state == ComposeState::Composing {
                    *state = ComposeState::Candidate;
                }
            }
            sink.deliver(&request, candidates);
        });
        generation
    }

    /// The user committed a word: learn it, let the engine invalidate,
    /// and move to next-word prediction.
    pub fn commit(&self, word: &str, previous_word: Option<&str>) {
        let word = normalize(word);
        if word.is_empty() {
            return;
        }
        match previous_word.map(normalize).filter(|p| !p.is_empty()) {
            Some(prev) => {
                self.userdict.add_word_with_context(&word, &prev, 1);
            }
            None => {
                self.userdict.add_word(&word, 1);
            }
        }
        let engine = self.engines.get(&self.keyboard());
        if let Some(engine) = engine {
            engine.notify_submission(&word);
        }
        *self.lock(&self.last_committed) = Some(word.clone());
        // Predict only when something can actually be suggested next.
        let has_followups = !self.userdict.search_with_context(&word, "", 1).is_empty()
            || engine
                .map(|e| !e.context_predict(&word, "", 1).is_empty())
                .unwrap_or(false);
        *self.lock(&self.compose) = if has_followups {
            ComposeState::Predict
        } else {
            ComposeState::Idle
        };
    }

    /// The most recently committed word, if any.
    pub fn last_committed_word(&self) -> Option<String> {
        self.lock(&self.last_committed).clone()
    }

    /// Whether the candidate strip currently shows next-word predictions
    /// rather than completions of a typed prefix.
    pub fn is_showing_context_predictions(&self) -> bool {
        self.compose_state() == ComposeState::Predict
    }

    /// Short label for the active conversion target, shown on the
    /// conversion key. None while conversion is off.
    pub fn target_symbol(&self) -> Option<&'static str> {
        let state = self.conversion_state();
        match state.target.filter(|_| state.active) {
            Some(KeyboardType::Latin) => Some("ABC"),
            Some(KeyboardType::CyrillicKazakh) => Some("КИР"),
            Some(KeyboardType::Arabic) => Some("عرب"),
            _ => None,
        }
    }

    /// Full name of the active conversion target for menus and tooltips.
    pub fn target_display_name(&self) -> Option<&'static str> {
        let state = self.conversion_state();
        match state.target.filter(|_| state.active) {
            Some(KeyboardType::Latin) => Some("Latin"),
            Some(KeyboardType::CyrillicKazakh) => Some("Cyrillic"),
            Some(KeyboardType::Arabic) => Some("Arabic"),
            _ => None,
        }
    }

    /// Conversion targets offered on the current keyboard. Keyboards
    /// without a convertible script offer none.
    pub fn available_targets(&self) -> Vec<KeyboardType> {
        match self.keyboard() {
            KeyboardType::Latin => vec![KeyboardType::CyrillicKazakh, KeyboardType::Arabic],
            KeyboardType::CyrillicKazakh => vec![KeyboardType::Latin, KeyboardType::Arabic],
            KeyboardType::Arabic => vec![KeyboardType::Latin, KeyboardType::CyrillicKazakh],
            _ => Vec::new(),
        }
    }

    /// Turn conversion mode on for the current keyboard.
    pub fn enable_conversion(&self, target: KeyboardType) -> bool {
        let keyboard = self.keyboard();
        if !self.available_targets().contains(&target) {
            return false;
        }
        self.lock(&self.conversion).insert(
            keyboard,
            ConversionState {
                active: true,
                target: Some(target),
            },
        );
        true
    }

    /// Turn conversion mode off for the current keyboard.
    pub fn disable_conversion(&self) {
        let keyboard = self.keyboard();
        self.lock(&self.conversion)
            .insert(keyboard, ConversionState::default());
    }

    /// Conversion state of the current keyboard.
    pub fn conversion_state(&self) -> ConversionState {
        self.lock(&self.conversion)
            .get(&self.keyboard())
            .copied()
            .unwrap_or_default()
    }

    /// Transliterate committed text according to the current keyboard's
    /// conversion state; inactive conversion passes text through.
    pub fn convert_text(&self, text: &str) -> String {
        let state = self.conversion_state();
        let (Some(from), Some(to)) = (
            self.keyboard().script(),
            state.target.filter(|_| state.active).and_then(KeyboardType::script),
        ) else {
            return text.to_string();
        };
        self.converter.convert(text, from, to)
    }

    /// Transliterate a punctuation keypress under the same rules.
    pub fn convert_punctuation(&self, punctuation: char) -> char {
        let state = self.conversion_state();
        match state.target.filter(|_| state.active).and_then(KeyboardType::script) {
            Some(target) if self.keyboard().script().is_some() => {
                self.converter.convert_punctuation(punctuation, target)
            }
            _ => punctuation,
        }
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn assemble(
    request: &PredictionRequest,
    engine: Option<&DictionaryEngine>,
    userdict: &Arc<UserDictionary>,
    limit: usize,
    user_budget_ms: u64,
) -> Vec<String> {
    // Learned words are looked up on their own thread under their own
    // timeout while the engine (budgeted internally) runs here.
    let (tx, rx) = mpsc::channel();
    {
        let userdict = Arc::clone(userdict);
        let request = request.clone();
        thread::spawn(move || {
            let prefix = request.prefix.as_str();
            let hits = match &request.previous_word {
                Some(prev) => userdict.search_with_context(prev, prefix, limit),
                None if !prefix.is_empty() => userdict.search_prefix(prefix, limit),
                None => Vec::new(),
            };
            let _ = tx.send(hits);
        });
    }
    let main = engine
        .map(|engine| match &request.previous_word {
            Some(prev) => engine.context_predict(prev, &request.prefix, limit),
            None => engine.smart_candidates(&request.prefix, limit),
        })
        .unwrap_or_default();
    let learned = rx
        .recv_timeout(Duration::from_millis(user_budget_ms))
        .unwrap_or_default();

    let mut out: Vec<String> = Vec::with_capacity(limit);
    let push = |w: String, out: &mut Vec<String>| {
        if out.len() < limit && !w.is_empty() && !out.contains(&w) {
            out.push(w);
        }
    };
    let prefix = request.prefix.as_str();
    // The literal input always leads, even before it is a known word.
    if !prefix.is_empty() {
        push(prefix.to_string(), &mut out);
    }
    for w in learned {
        push(w, &mut out);
    }
    for w in main {
        push(w, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EmbeddedBackend, KeyAdjacency};
    use crate::gram_store::GramStore;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelSink(Mutex<mpsc::Sender<(u64, Vec<String>)>>);

    impl CandidateSink for ChannelSink {
        fn deliver(&self, request: &PredictionRequest, candidates: Vec<String>) {
            let _ = self
                .0
                .lock()
                .unwrap()
                .send((request.generation, candidates));
        }
    }

    fn orchestrator_with_words(words: &[(&str, u32)]) -> CandidateOrchestrator {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.redb");
        let mut store = GramStore::open(&path).unwrap();
        store
            .import_unigrams(words.iter().map(|(w, f)| (w.to_string(), *f)))
            .unwrap();
        std::mem::forget(dir);
        let backend = Arc::new(EmbeddedBackend::with_store(
            store,
            path.clone(),
            KeyAdjacency::cyrillic_kazakh(),
        ));
        let cfg = crate::Config {
            load_retry_delay_ms: 1,
            prewarm_prefixes: Vec::new(),
            ..crate::Config::default()
        };
        let engine = Arc::new(DictionaryEngine::new(backend, cfg.clone()));
        assert!(engine.load(&path, &path));
        let userdict = Arc::new(UserDictionary::new(100, 1000));
        CandidateOrchestrator::new(userdict, cfg)
            .with_engine(KeyboardType::CyrillicKazakh, engine)
    }

    fn recv(rx: &mpsc::Receiver<(u64, Vec<String>)>) -> (u64, Vec<String>) {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn literal_word_leads_the_candidate_list() {
        let orch = orchestrator_with_words(&[("ал", 10), ("алма", 100)]);
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));
        let generation = orch.request_candidates("ал", None, false, sink);
        let (got, candidates) = recv(&rx);
        assert_eq!(got, generation);
        assert_eq!(candidates[0], "ал");
        assert!(candidates.contains(&"алма".to_string()));
        // Nonempty results move the composition into candidate focus.
        assert_eq!(orch.compose_state(), ComposeState::Candidate);
    }

    #[test]
    fn learned_words_outrank_the_main_dictionary() {
        let orch = orchestrator_with_words(&[("сөздік", 100)]);
        orch.commit("сөзқұрау", None);
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));
        orch.request_candidates("сөз", None, false, sink);
        let (_, candidates) = recv(&rx);
        let learned = candidates.iter().position(|w| w == "сөзқұрау").unwrap();
        let main = candidates.iter().position(|w| w == "сөздік").unwrap();
        assert!(learned < main);
    }

    #[test]
    fn commit_moves_to_predict_and_learns_context() {
        let orch = orchestrator_with_words(&[("бала", 100)]);
        orch.commit("күн", Some("қайырлы"));
        assert_eq!(orch.compose_state(), ComposeState::Predict);

        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));
        orch.request_candidates("", Some("қайырлы"), false, sink);
        let (_, candidates) = recv(&rx);
        assert_eq!(candidates[0], "күн");
    }

    #[test]
    fn generations_increase_per_request() {
        let orch = orchestrator_with_words(&[("бала", 100)]);
        let (tx, rx) = mpsc::channel();
        let first =
            orch.request_candidates("б", None, false, Arc::new(ChannelSink(Mutex::new(tx.clone()))));
        let second =
            orch.request_candidates("ба", None, false, Arc::new(ChannelSink(Mutex::new(tx))));
        assert!(second > first);
        // Both may deliver, but never out of generation order per sink.
        let _ = recv(&rx);
    }

    #[test]
    fn delivered_generations_never_regress() {
        let userdict = Arc::new(UserDictionary::new(1000, 100_000));
        userdict.add_word("привет", 1);
        let orch = CandidateOrchestrator::new(userdict, crate::Config::default());
        orch.set_keyboard(KeyboardType::Russian);

        // Rapid-fire pairs of requests, all feeding one sink. Whatever
        // subset of workers wins the race, the generations the sink sees
        // must be strictly increasing.
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));
        for _ in 0..500 {
            orch.request_candidates("п", None, false, Arc::clone(&sink) as Arc<dyn CandidateSink>);
            orch.request_candidates("пр", None, false, Arc::clone(&sink) as Arc<dyn CandidateSink>);
        }
        drop(sink);

        let mut last = 0;
        while let Ok((generation, _)) = rx.recv_timeout(Duration::from_secs(2)) {
            assert!(
                generation > last,
                "generation {} delivered after {}",
                generation,
                last
            );
            last = generation;
        }
        assert!(last > 0);
    }

    #[test]
    fn keyboards_without_engine_still_serve_learned_words() {
        let userdict = Arc::new(UserDictionary::new(100, 1000));
        userdict.add_word("привет", 1);
        let orch = CandidateOrchestrator::new(userdict, crate::Config::default());
        orch.set_keyboard(KeyboardType::Russian);
        let (tx, rx) = mpsc::channel();
        orch.request_candidates("при", None, false, Arc::new(ChannelSink(Mutex::new(tx))));
        let (_, candidates) = recv(&rx);
        assert_eq!(candidates, vec!["при", "привет"]);
    }

    #[test]
    fn conversion_state_is_per_keyboard() {
        let orch = orchestrator_with_words(&[]);
        orch.set_keyboard(KeyboardType::Latin);
        assert!(orch.enable_conversion(KeyboardType::CyrillicKazakh));
        assert!(orch.conversion_state().active);

        orch.set_keyboard(KeyboardType::Arabic);
        assert!(!orch.conversion_state().active);

        orch.set_keyboard(KeyboardType::Latin);
        assert_eq!(orch.convert_text("bala"), "бала");
        orch.disable_conversion();
        assert_eq!(orch.convert_text("bala"), "bala");
    }

    #[test]
    fn chinese_keyboard_offers_no_conversion() {
        let orch = orchestrator_with_words(&[]);
        orch.set_keyboard(KeyboardType::Chinese);
        assert!(orch.available_targets().is_empty());
        assert!(!orch.enable_conversion(KeyboardType::Latin));
        assert_eq!(orch.convert_text("你好"), "你好");
    }

    #[test]
    fn commit_tracks_the_last_word_and_prediction_focus() {
        let orch = orchestrator_with_words(&[("бала", 100)]);
        assert_eq!(orch.last_committed_word(), None);
        assert!(!orch.is_showing_context_predictions());

        orch.commit("күн", Some("қайырлы"));
        assert_eq!(orch.last_committed_word(), Some("күн".to_string()));
        assert!(orch.is_showing_context_predictions());

        orch.reset_composition();
        assert!(!orch.is_showing_context_predictions());
        // The committed word is remembered past the composition reset.
        assert_eq!(orch.last_committed_word(), Some("күн".to_string()));
    }

    #[test]
    fn conversion_target_labels_follow_the_active_target() {
        let orch = orchestrator_with_words(&[]);
        orch.set_keyboard(KeyboardType::Latin);
        assert_eq!(orch.target_symbol(), None);
        assert_eq!(orch.target_display_name(), None);

        orch.enable_conversion(KeyboardType::CyrillicKazakh);
        assert_eq!(orch.target_symbol(), Some("КИР"));
        assert_eq!(orch.target_display_name(), Some("Cyrillic"));

        orch.enable_conversion(KeyboardType::Arabic);
        assert_eq!(orch.target_symbol(), Some("عرب"));

        orch.disable_conversion();
        assert_eq!(orch.target_symbol(), None);
    }

    #[test]
    fn punctuation_follows_the_conversion_target() {
        let orch = orchestrator_with_words(&[]);
        orch.set_keyboard(KeyboardType::CyrillicKazakh);
        orch.enable_conversion(KeyboardType::Arabic);
        assert_eq!(orch.convert_punctuation('?'), '؟');
        orch.disable_conversion();
        assert_eq!(orch.convert_punctuation('?'), '?');
    }
}
