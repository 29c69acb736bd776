//! Response Engine
//!
//! Owns every piece of mutable state (corpus, used-response sets, learned
//! phrases, bank growth, RNG) behind one mutex and runs the per-request
//! pipeline:
//!
//! ```text
//! query -> classify -> route -> [nearest history] -> select | synthesize
//!       -> append to corpus -> re-cluster / snapshot on interval boundaries
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bank::{render, BankError, ResponseBank, Scope};
use crate::cluster::{Clusterer, KMeans};
use crate::config::ReplybankConfig;
use crate::corpus::Corpus;
use crate::dedup::DedupTracker;
use crate::intent::{ClassifierConfig, IntentClassifier, MatchKind};
use crate::normalize::QueryNormalizer;
use crate::router::CategoryRouter;
use crate::similarity::{IndexError, SimilarityIndex};
use crate::store::{CorpusSnapshot, TrainingDataStore};
use crate::synth::Synthesizer;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Query cannot be empty")]
    EmptyQuery,

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error("Clustering failed: {0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Internal(String),
}

/// Inbound request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Outbound response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
    pub status: String,
}

/// How a response was routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Routed category or intent fallback
    Success,
    /// Category borrowed from a similar historical query
    Clustered,
    /// Similarity lookup failed; routed category used
    Degraded(String),
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Success => write!(f, "Success"),
            ResponseStatus::Clustered => write!(f, "Success (clustered)"),
            ResponseStatus::Degraded(reason) => write!(f, "{}", reason),
        }
    }
}

/// Full outcome of one request
#[derive(Debug, Clone)]
pub struct Answer {
    /// Trimmed query text
    pub query: String,
    pub response: String,
    pub status: ResponseStatus,
    pub intent: String,
    /// Scope the response was drawn from
    pub scope: Scope,
    /// True when the scope's templates were exhausted
    pub synthesized: bool,
}

impl Answer {
    pub fn into_response(self) -> QueryResponse {
        QueryResponse {
            query: self.query,
            response: self.response,
            status: self.status.to_string(),
        }
    }
}

/// Read-only classification of a query
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyReport {
    pub intent: String,
    pub match_kind: String,
    pub score: f32,
    pub category: Option<String>,
}

/// Per-category bank usage
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub templates: usize,
    pub generated: usize,
    pub used: usize,
}

/// Engine counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub corpus_size: usize,
    pub clustered: usize,
    pub queries_this_run: u64,
    pub learned_phrases: usize,
    pub used_responses: usize,
    pub generated_templates: usize,
    pub num_clusters: usize,
    pub data_file: PathBuf,
}

/// Response selection engine
pub struct ResponseEngine {
    state: Mutex<EngineState>,
}

impl ResponseEngine {
    /// Open an engine with the bank named by the config (or the built-in one)
    pub fn open(config: ReplybankConfig) -> Result<Self, EngineError> {
        let bank = match &config.bank.path {
            Some(path) => ResponseBank::load(path)?,
            None => ResponseBank::builtin()?,
        };
        Ok(Self::with_bank(config, bank))
    }

    /// Open an engine over an explicit bank
    pub fn with_bank(config: ReplybankConfig, bank: ResponseBank) -> Self {
        let state = EngineState::new(config, bank);
        ResponseEngine {
            state: Mutex::new(state),
        }
    }

    /// Answer a query
    pub fn respond(&self, query: &str) -> Result<QueryResponse, EngineError> {
        self.answer(query).map(Answer::into_response)
    }

    /// Answer a query, reporting how the response was chosen
    pub fn answer(&self, query: &str) -> Result<Answer, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        let mut state = self.state.lock();
        panic::catch_unwind(AssertUnwindSafe(|| state.answer(query))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("Request for '{}' panicked: {}", query, message);
            EngineError::Internal(message)
        })
    }

    /// Replace the clustering implementation used on training passes
    pub fn set_clusterer(&self, clusterer: Box<dyn Clusterer + Send>) {
        self.state.lock().clusterer = clusterer;
    }

    /// Classify a query without learning from it
    pub fn classify(&self, query: &str) -> ClassifyReport {
        let mut state = self.state.lock();
        let state = &mut *state;
        let result = state.classifier.peek(&mut state.normalizer, query);
        ClassifyReport {
            intent: result.intent,
            match_kind: match result.kind {
                MatchKind::Exact => "exact",
                MatchKind::FuzzyKeyword => "fuzzy keyword",
                MatchKind::LearnedPhrase => "learned phrase",
                MatchKind::Unknown => "none",
            }
            .to_string(),
            score: result.score,
            category: state.router.route(query).map(str::to_string),
        }
    }

    /// Re-cluster the whole corpus now and snapshot; returns labelled count
    pub fn force_cluster(&self) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        let labelled = state.recluster()?;
        state.save();
        Ok(labelled)
    }

    /// Forget everything learned and write an empty snapshot
    pub fn reset(&self) {
        self.state.lock().reset();
    }

    /// Forget session-scope history only
    pub fn reset_session(&self) {
        self.state.lock().dedup.reset_session();
    }

    pub fn stats(&self) -> EngineStats {
        self.state.lock().stats()
    }

    pub fn categories(&self) -> Vec<CategorySummary> {
        self.state.lock().categories()
    }

    /// Current snapshot of learned state
    pub fn snapshot(&self) -> CorpusSnapshot {
        self.state.lock().snapshot()
    }

    /// Persist learned state now
    pub fn flush(&self) {
        self.state.lock().save();
    }

    /// Persist learned state and drop the engine
    pub fn close(self) {
        self.state.into_inner().save();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "request handler panicked".to_string()
    }
}

struct EngineState {
    config: ReplybankConfig,
    /// Bank as loaded, before any synthesized templates
    base_bank: ResponseBank,
    bank: ResponseBank,
    normalizer: QueryNormalizer,
    classifier: IntentClassifier,
    router: CategoryRouter,
    dedup: DedupTracker,
    synthesizer: Synthesizer,
    index: SimilarityIndex,
    clusterer: Box<dyn Clusterer + Send>,
    corpus: Corpus,
    intent_mappings: BTreeMap<String, String>,
    store: TrainingDataStore,
    rng: ChaCha8Rng,
    query_count: u64,
}

impl EngineState {
    fn new(config: ReplybankConfig, bank: ResponseBank) -> Self {
        let mut rng = match config.engine.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let classifier = IntentClassifier::from_intents(
            ClassifierConfig {
                keyword_threshold: config.intent.keyword_threshold,
                learned_threshold: config.intent.learned_threshold,
            },
            bank.intents(),
        );
        let synthesizer = Synthesizer::new(
            bank.skeletons().to_vec(),
            bank.fallback_actions().to_vec(),
            config.synthesis.max_attempts,
        );
        let index = SimilarityIndex::new(
            config.similarity.max_features,
            config.similarity.threshold,
            config.engine.num_clusters,
        );
        let clusterer = Box::new(KMeans::new(rng.gen(), config.clustering.max_iterations));

        let mut state = EngineState {
            router: CategoryRouter::from_bank(&bank),
            base_bank: bank.clone(),
            bank,
            normalizer: QueryNormalizer::new(),
            classifier,
            dedup: DedupTracker::new(),
            synthesizer,
            index,
            clusterer,
            corpus: Corpus::new(),
            intent_mappings: BTreeMap::new(),
            store: TrainingDataStore::new(config.storage.data_file.clone()),
            rng,
            query_count: 0,
            config,
        };
        let snapshot = state.store.load();
        state.restore(snapshot);
        state
    }

    fn restore(&mut self, snapshot: CorpusSnapshot) {
        let restored = self.bank.restore_generated(&snapshot.generated_responses);
        if restored > 0 {
            log::info!("Restored {} generated templates", restored);
        }
        self.classifier.restore_learned(snapshot.learned_phrases);
        self.dedup.restore_persistent(snapshot.used_responses);
        self.intent_mappings = snapshot.intent_mappings;

        let normalizer = &mut self.normalizer;
        let router = &self.router;
        let (corpus, repaired) =
            Corpus::restore(snapshot.queries, snapshot.cluster_labels, |raw| {
                (normalizer.normalize(raw), router.route(raw).map(str::to_string))
            });
        if repaired {
            log::warn!(
                "Cluster labels did not match {} stored queries; repaired",
                corpus.len()
            );
        }
        self.corpus = corpus;
        self.index.invalidate();
    }

    fn answer(&mut self, query: &str) -> Answer {
        let started = Instant::now();
        let query_lower = query.to_lowercase();

        let classification = self.classifier.classify_detailed(&mut self.normalizer, query);
        let intent = classification.intent;
        self.intent_mappings
            .insert(query_lower.clone(), intent.clone());

        let routed = self.router.route(query).map(str::to_string);
        let mut category = routed.clone();
        let mut status = ResponseStatus::Success;

        if self.corpus.len() >= self.config.engine.num_clusters {
            match self
                .index
                .nearest_history(&self.corpus, query, &mut self.rng)
            {
                Ok(Some(neighbor)) => {
                    if let Some(borrowed) = neighbor.category {
                        log::debug!(
                            "'{}' borrows '{}' from history '{}' ({:.3})",
                            query,
                            borrowed,
                            neighbor.raw,
                            neighbor.similarity
                        );
                        category = Some(borrowed);
                        status = ResponseStatus::Clustered;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Similarity lookup failed for '{}': {}", query, e);
                    status = ResponseStatus::Degraded(format!("Similarity lookup failed: {}", e));
                }
            }
        }

        let scope = match category {
            Some(name) if self.bank.contains(&Scope::Category(name.clone())) => {
                Scope::Category(name)
            }
            _ => self.bank.intent_scope(&intent),
        };
        let (response, synthesized) = self.select(&scope, &query_lower);

        let normalized = self.normalizer.normalize(query);
        self.corpus.push(query, normalized, routed);
        self.query_count += 1;
        self.after_record();

        log::debug!(
            "Answered '{}' from {} in {:?}",
            query,
            scope,
            started.elapsed()
        );
        Answer {
            query: query.to_string(),
            response,
            status,
            intent,
            scope,
            synthesized,
        }
    }

    /// Pick an unused rendered template, synthesizing one when none is left
    fn select(&mut self, scope: &Scope, query_lower: &str) -> (String, bool) {
        let scope_key = scope.key();
        let mut available: Vec<String> = self
            .bank
            .templates(scope)
            .iter()
            .map(|t| render(t, query_lower))
            .filter(|r| !self.dedup.is_used(query_lower, &scope_key, r))
            .collect();
        available.dedup();

        if let Some(choice) = available.choose(&mut self.rng).cloned() {
            self.dedup.record(query_lower, &scope_key, &choice);
            return (choice, false);
        }

        let synthesis = self.synthesizer.synthesize(
            query_lower,
            self.bank.actions(scope),
            |template, rendered| {
                self.dedup.is_used(query_lower, &scope_key, rendered)
                    || self.bank.knows_template(scope, template)
            },
            &mut self.rng,
        );
        if synthesis.exhausted {
            log::warn!(
                "Synthesis for {} exhausted {} attempts; reusing a candidate",
                scope,
                synthesis.attempts
            );
        }
        self.dedup.record(query_lower, &scope_key, &synthesis.rendered);
        if self.bank.add_template(scope, &synthesis.template) {
            log::info!("Added synthesized template to {}", scope);
        }
        (synthesis.rendered, true)
    }

    fn after_record(&mut self) {
        let engine = &self.config.engine;
        if self.query_count % engine.train_interval == 0
            && self.corpus.len() >= engine.num_clusters
        {
            if let Err(e) = self.recluster() {
                log::warn!("Re-clustering failed: {}", e);
            }
            self.save();
        } else if self.query_count % engine.save_interval == 0 {
            self.save();
        }
    }

    /// Re-derive every label from the full corpus
    fn recluster(&mut self) -> Result<usize, IndexError> {
        let k = self.config.engine.num_clusters;
        if self.corpus.len() < k {
            return Ok(0);
        }
        let started = Instant::now();
        let rows = self.index.corpus_rows(&self.corpus)?.to_vec();
        let labels = self.clusterer.fit(&rows, k);
        self.corpus.relabel(&labels);
        log::info!(
            "Clustered {} queries into {} groups in {:?}",
            self.corpus.len(),
            k,
            started.elapsed()
        );
        Ok(self.corpus.clustered_len())
    }

    fn snapshot(&self) -> CorpusSnapshot {
        CorpusSnapshot {
            queries: self.corpus.queries(),
            cluster_labels: self.corpus.labels(),
            generated_responses: self.bank.generated().clone(),
            used_responses: self.dedup.export_persistent(),
            learned_phrases: self.classifier.learned_phrases().clone(),
            intent_mappings: self.intent_mappings.clone(),
            updated_at: None,
        }
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&self.snapshot()) {
            log::error!("Failed to save training data: {}", e);
        }
    }

    fn reset(&mut self) {
        self.bank = self.base_bank.clone();
        self.dedup = DedupTracker::new();
        self.classifier.restore_learned(BTreeMap::new());
        self.intent_mappings.clear();
        self.corpus.clear();
        self.index.invalidate();
        self.query_count = 0;
        self.store.reset();
        log::info!("Reset training data at {}", self.store.path().display());
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            corpus_size: self.corpus.len(),
            clustered: self.corpus.clustered_len(),
            queries_this_run: self.query_count,
            learned_phrases: self.classifier.learned_phrases().len(),
            used_responses: self.dedup.persistent_len(),
            generated_templates: self.bank.generated().values().map(Vec::len).sum(),
            num_clusters: self.config.engine.num_clusters,
            data_file: self.store.path().to_path_buf(),
        }
    }

    fn categories(&self) -> Vec<CategorySummary> {
        self.bank
            .categories()
            .iter()
            .map(|c| {
                let scope = Scope::Category(c.name.clone());
                CategorySummary {
                    name: c.name.clone(),
                    templates: c.templates.len(),
                    generated: self.bank.generated().get(&c.name).map_or(0, Vec::len),
                    used: self.dedup.persistent(&scope.key()).map_or(0, |s| s.len()),
                }
            })
            .collect()
    }
}
