//! # Recall Engine
//!
//! A long-term memory store for a conversational assistant: conversation
//! turns are ingested into typed memory records carrying an emotional-affect
//! profile and a dense embedding, retained under a time-decaying retention
//! score that mimics human forgetting, and surfaced on demand by a
//! similarity + emotional-resonance retrieval scorer with archive recall.
//! A daily batch performs recall reinforcement, tier compression, forced
//! ratio enforcement, archive revival, relation maintenance, and pruning.
//!
//! ## Scope
//!
//! This crate is the memory lifecycle engine itself: the data model, the
//! retention/decay mathematics, the retrieval scorer, and the batch engine.
//! It does not perform turn extraction from a host transcript, does not
//! generate embeddings or run the analysis LLM itself (see
//! [`embeddings::EmbeddingProvider`] and [`providers::AnalysisProvider`]),
//! and does not provide a CLI — [`engine::Engine`] exposes the operations a
//! CLI would wrap.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use recall_engine::config::MemoryConfig;
//! use recall_engine::engine::Engine;
//! use recall_engine::storage::Store;
//!
//! # struct MyEmbeddings;
//! # impl recall_engine::embeddings::EmbeddingProvider for MyEmbeddings {
//! #     fn embed(&self, _text: &str) -> recall_engine::embeddings::Result<Vec<f32>> {
//! #         Ok(vec![0.0; recall_engine::memory::EMBEDDING_DIMENSIONS])
//! #     }
//! # }
//! # struct MyAnalysis;
//! # impl recall_engine::providers::AnalysisProvider for MyAnalysis {
//! #     fn analyze_turn(&self, _u: &str, _a: &str) -> recall_engine::providers::Result<recall_engine::providers::TurnAnalysis> {
//! #         unimplemented!()
//! #     }
//! #     fn summarize_to_level2(&self, _t: &str, _c: &str) -> recall_engine::providers::Result<recall_engine::providers::TriggerContent> {
//! #         unimplemented!()
//! #     }
//! #     fn extract_keywords_to_level3(&self, _t: &str, _c: &str) -> recall_engine::providers::Result<recall_engine::providers::TriggerContent> {
//! #         unimplemented!()
//! #     }
//! # }
//! let store = Store::open_default()?;
//! let config = MemoryConfig::default();
//! let analysis = MyAnalysis;
//! let embeddings = MyEmbeddings;
//! let engine = Engine::new(store, config, &analysis, &embeddings);
//!
//! let now = chrono::Utc::now().fixed_offset();
//! engine.ingest("what's the deploy window tonight?", "9pm to 11pm UTC", now)?;
//! let hits = engine.recall("deploy window", None, now)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod ingestion;
pub mod memory;
pub mod output;
pub mod providers;
pub mod recall;
pub mod relations;
pub mod resonance;
pub mod retention;
pub mod retrieval;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use batch::{BatchCounters, BatchError, BatchOutcome};
pub use config::{ConfigError, MemoryConfig};
pub use embeddings::{cosine_similarity, EmbeddingError, EmbeddingProvider};
pub use engine::{Engine, EngineError, ListFilter, Stats};
pub use ingestion::{IngestError, IngestOutcome};
pub use memory::{
    Category, Level, MemoryRecord, Relation, RelationType, Valence, EMBEDDING_DIMENSIONS,
    LEVEL_ARCHIVE, LEVEL_FULL, LEVEL_KEYWORDS, LEVEL_SUMMARY,
};
pub use output::{format_memories_block, RetrievedMemory};
pub use providers::{AnalysisProvider, ProviderError, TriggerContent, TurnAnalysis};
pub use resonance::EmotionContext;
pub use retrieval::{RetrievalError, ScoredMemory};
pub use storage::{FieldValue, Store, StorageError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::config::MemoryConfig;
    pub use crate::embeddings::EmbeddingProvider;
    pub use crate::engine::{Engine, EngineError, ListFilter, Stats};
    pub use crate::ingestion::IngestOutcome;
    pub use crate::memory::{Category, MemoryRecord, Valence};
    pub use crate::providers::AnalysisProvider;
    pub use crate::resonance::EmotionContext;
    pub use crate::retrieval::ScoredMemory;
    pub use crate::storage::Store;
}
