//! Replybank - Canned-Response Selection Engine
//!
//! Answers free-text customer queries from a curated, per-category bank of
//! response templates without repeating itself. When a category's templates are
//! used up, a new response is synthesized from authored fragments and added to
//! the bank.
//!
//! # Pipeline
//!
//! ```text
//! query ─► QueryNormalizer ─► IntentClassifier (learns phrases)
//!       ─► CategoryRouter ─► SimilarityIndex (once the corpus has K queries)
//!       ─► DedupTracker selection ─► Synthesizer (bank exhausted)
//!       ─► Corpus append ─► KMeans re-clustering / TrainingDataStore snapshot
//! ```
//!
//! # Example
//!
//! ```no_run
//! use replybank::{ReplybankConfig, ResponseEngine};
//!
//! let engine = ResponseEngine::open(ReplybankConfig::default()).unwrap();
//! let reply = engine.respond("How do I cancel my ticket?").unwrap();
//! println!("{}", reply.response);
//! engine.close();
//! ```

pub mod bank;
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod dedup;
pub mod engine;
pub mod http;
pub mod intent;
pub mod normalize;
pub mod router;
pub mod similarity;
pub mod store;
pub mod synth;

pub use bank::{BankError, ResponseBank, Scope};
pub use cluster::{Clusterer, KMeans};
pub use config::{ConfigError, ReplybankConfig};
pub use corpus::{Corpus, QueryRecord};
pub use dedup::DedupTracker;
pub use engine::{
    Answer, EngineError, EngineStats, QueryRequest, QueryResponse, ResponseEngine, ResponseStatus,
};
pub use intent::{Classification, IntentClassifier, MatchKind};
pub use normalize::QueryNormalizer;
pub use router::CategoryRouter;
pub use similarity::{IndexError, SimilarityIndex, TfIdfVectorizer};
pub use store::{CorpusSnapshot, StoreError, TrainingDataStore};
pub use synth::{Synthesis, Synthesizer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
