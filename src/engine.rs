//! The engine facade: owns a [`Store`] plus the configured providers and
//! exposes the operations a CLI or host process wraps (`run_batch`,
//! `list`, `show`, `delete`, `protect`, `unprotect`, `stats`,
//! `purge_archive`, `search`, `ingest`) — one type collecting the
//! component-level free functions (`ingestion::ingest_turn`,
//! `retrieval::retrieve`, `batch::run_batch`) behind a single handle a CLI
//! or host process constructs once and calls repeatedly.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::batch::{self, BatchError, BatchOutcome};
use crate::config::MemoryConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::ingestion::{self, IngestError, IngestOutcome};
use crate::memory::MemoryRecord;
use crate::providers::{AnalysisProvider, ProviderError};
use crate::resonance::EmotionContext;
use crate::retrieval::{self, RetrievalError, ScoredMemory};
use crate::storage::{FieldValue, StorageError, Store};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("refusing to {action} protected record {id} without force")]
    ProtectedWithoutForce { action: &'static str, id: String },
}

/// Filter accepted by [`Engine::list`].
#[derive(Debug, Clone, Copy, Default)]
pub enum ListFilter {
    #[default]
    All,
    Active,
    Archived,
    Level(u8),
    Protected,
}

/// Aggregate counts surfaced by [`Engine::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub total: usize,
    pub level1: usize,
    pub level2: usize,
    pub level3: usize,
    pub archived: usize,
    pub protected: usize,
}

/// Owns a store handle plus the two provider seams and the tuned config.
/// Construct one per process/call-site — there is no process-wide
/// singleton; every caller builds its own `Engine` against the shared
/// store file.
pub struct Engine<'p> {
    store: Store,
    config: MemoryConfig,
    analysis_provider: &'p dyn AnalysisProvider,
    embedding_provider: &'p dyn EmbeddingProvider,
}

impl<'p> Engine<'p> {
    pub fn new(
        store: Store,
        config: MemoryConfig,
        analysis_provider: &'p dyn AnalysisProvider,
        embedding_provider: &'p dyn EmbeddingProvider,
    ) -> Self {
        Self {
            store,
            config,
            analysis_provider,
            embedding_provider,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Ingests one turn. See [`ingestion::ingest_turn`].
    pub fn ingest(
        &self,
        user_text: &str,
        assistant_text: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<Option<IngestOutcome>, EngineError> {
        Ok(ingestion::ingest_turn(
            &self.store,
            self.analysis_provider,
            self.embedding_provider,
            user_text,
            assistant_text,
            timestamp,
            &self.config,
        )?)
    }

    /// Retrieves memories relevant to `query`. See [`retrieval::retrieve`].
    pub fn recall(
        &self,
        query: &str,
        current_emotion: Option<&EmotionContext>,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<ScoredMemory>, EngineError> {
        Ok(retrieval::retrieve(
            &self.store,
            self.embedding_provider,
            query,
            current_emotion,
            now,
            &self.config,
        )?)
    }

    /// Runs one batch invocation. See [`batch::run_batch`].
    pub fn run_batch(
        &self,
        now: DateTime<FixedOffset>,
        force: bool,
    ) -> Result<BatchOutcome, EngineError> {
        Ok(batch::run_batch(
            &self.store,
            self.analysis_provider,
            self.embedding_provider,
            &self.config,
            now,
            force,
        )?)
    }

    /// `search(text, active_only, limit)`: a retrieval call with the
    /// archive scan and top-k overridden per-call rather than via the
    /// tuned config, for callers (CLI `search` subcommand) that want to
    /// restrict or widen a single query without mutating `self.config`.
    pub fn search(
        &self,
        text: &str,
        active_only: bool,
        limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<ScoredMemory>, EngineError> {
        let mut config = self.config.clone();
        if active_only {
            config.retrieval.enable_archive_recall = false;
        }
        config.retrieval.top_k = limit;
        Ok(retrieval::retrieve(
            &self.store,
            self.embedding_provider,
            text,
            None,
            now,
            &config,
        )?)
    }

    /// Lists records matching `filter`. A full-table scan, same cost
    /// shape as `get_active`/`get_archived` (no persistent index is kept
    /// for the compound filters here — they're operator tooling, not a
    /// hot path).
    pub fn list(&self, filter: ListFilter) -> Result<Vec<MemoryRecord>, EngineError> {
        let mut records: Vec<MemoryRecord> = self
            .store
            .get_active()?
            .into_iter()
            .chain(self.store.get_archived()?)
            .collect();
        records.retain(|r| match filter {
            ListFilter::All => true,
            ListFilter::Active => r.is_active(),
            ListFilter::Archived => r.is_archived(),
            ListFilter::Level(level) => r.current_level == level,
            ListFilter::Protected => r.protected,
        });
        Ok(records)
    }

    pub fn show(&self, id: &str) -> Result<MemoryRecord, EngineError> {
        Ok(self.store.get(id)?)
    }

    /// Deletes `id` unconditionally once `force` is set; a protected
    /// record otherwise refuses. The same protected-record exemption the
    /// batch engine honors for pruning applies here to explicit operator
    /// deletion, with `force` as the deliberate override.
    pub fn delete(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let record = self.store.get(id)?;
        if record.protected && !force {
            return Err(EngineError::ProtectedWithoutForce {
                action: "delete",
                id: id.to_string(),
            });
        }
        self.store.delete(id)?;
        Ok(())
    }

    pub fn protect(&self, id: &str) -> Result<(), EngineError> {
        self.store.update(id, &[FieldValue::Protected(true)])?;
        Ok(())
    }

    pub fn unprotect(&self, id: &str) -> Result<(), EngineError> {
        self.store.update(id, &[FieldValue::Protected(false)])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<Stats, EngineError> {
        let active = self.store.get_active()?;
        let archived = self.store.get_archived()?;
        let mut stats = Stats {
            total: active.len() + archived.len(),
            archived: archived.len(),
            ..Default::default()
        };
        for record in &active {
            match record.current_level {
                crate::memory::LEVEL_FULL => stats.level1 += 1,
                crate::memory::LEVEL_SUMMARY => stats.level2 += 1,
                crate::memory::LEVEL_KEYWORDS => stats.level3 += 1,
                _ => {}
            }
        }
        stats.protected = active.iter().chain(archived.iter()).filter(|r| r.protected).count();
        Ok(stats)
    }

    /// Deletes every archived record; protected archived records are
    /// skipped unless `force` is set.
    pub fn purge_archive(&self, force: bool) -> Result<usize, EngineError> {
        let archived = self.store.get_archived()?;
        let ids: Vec<String> = archived
            .into_iter()
            .filter(|r| force || !r.protected)
            .map(|r| r.id)
            .collect();
        let count = ids.len();
        if !ids.is_empty() {
            self.store.delete_many(&ids)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::test_record;
    use crate::providers::tests::MockAnalysisProvider;

    struct StubEmbed;
    impl EmbeddingProvider for StubEmbed {
        fn embed(&self, _text: &str) -> crate::embeddings::Result<Vec<f32>> {
            Ok(vec![0.0; crate::memory::EMBEDDING_DIMENSIONS])
        }
    }

    fn engine(store: Store, analysis: &MockAnalysisProvider, embed: &StubEmbed) -> Engine<'_> {
        Engine::new(store, MemoryConfig::default(), analysis, embed)
    }

    #[test]
    fn stats_counts_levels_archive_and_protected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.sqlite3")).unwrap();

        let mut l1 = test_record("mem_20260101_001");
        l1.current_level = crate::memory::LEVEL_FULL;
        store.insert(&l1).unwrap();

        let mut archived = test_record("mem_20260101_002");
        archived.current_level = crate::memory::LEVEL_ARCHIVE;
        archived.archived_at = Some(chrono::Utc::now().fixed_offset());
        archived.protected = true;
        store.insert(&archived).unwrap();

        let analysis = MockAnalysisProvider::new(vec![]);
        let embed = StubEmbed;
        let eng = engine(store, &analysis, &embed);

        let stats = eng.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.level1, 1);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.protected, 1);
    }

    #[test]
    fn delete_protected_without_force_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.sqlite3")).unwrap();
        let mut record = test_record("mem_20260101_001");
        record.protected = true;
        store.insert(&record).unwrap();

        let analysis = MockAnalysisProvider::new(vec![]);
        let embed = StubEmbed;
        let eng = engine(store, &analysis, &embed);

        let err = eng.delete(&record.id, false).unwrap_err();
        assert!(matches!(err, EngineError::ProtectedWithoutForce { .. }));
        assert!(eng.show(&record.id).is_ok());

        eng.delete(&record.id, true).unwrap();
        assert!(eng.show(&record.id).is_err());
    }

    #[test]
    fn protect_and_unprotect_toggle_the_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.sqlite3")).unwrap();
        let record = test_record("mem_20260101_001");
        store.insert(&record).unwrap();

        let analysis = MockAnalysisProvider::new(vec![]);
        let embed = StubEmbed;
        let eng = engine(store, &analysis, &embed);

        eng.protect(&record.id).unwrap();
        assert!(eng.show(&record.id).unwrap().protected);
        eng.unprotect(&record.id).unwrap();
        assert!(!eng.show(&record.id).unwrap().protected);
    }

    #[test]
    fn purge_archive_skips_protected_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.sqlite3")).unwrap();
        let mut protected = test_record("mem_20260101_001");
        protected.archived_at = Some(chrono::Utc::now().fixed_offset());
        protected.protected = true;
        store.insert(&protected).unwrap();
        let mut plain = test_record("mem_20260101_002");
        plain.archived_at = Some(chrono::Utc::now().fixed_offset());
        store.insert(&plain).unwrap();

        let analysis = MockAnalysisProvider::new(vec![]);
        let embed = StubEmbed;
        let eng = engine(store, &analysis, &embed);

        let purged = eng.purge_archive(false).unwrap();
        assert_eq!(purged, 1);
        assert!(eng.show(&protected.id).is_ok());
        assert!(eng.show(&plain.id).is_err());

        let purged = eng.purge_archive(true).unwrap();
        assert_eq!(purged, 1);
        assert!(eng.show(&protected.id).is_err());
    }

    #[test]
    fn list_filters_by_level_and_protected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.sqlite3")).unwrap();
        let mut a = test_record("mem_20260101_001");
        a.current_level = crate::memory::LEVEL_FULL;
        store.insert(&a).unwrap();
        let mut b = test_record("mem_20260101_002");
        b.current_level = crate::memory::LEVEL_SUMMARY;
        b.protected = true;
        store.insert(&b).unwrap();

        let analysis = MockAnalysisProvider::new(vec![]);
        let embed = StubEmbed;
        let eng = engine(store, &analysis, &embed);

        assert_eq!(eng.list(ListFilter::All).unwrap().len(), 2);
        assert_eq!(eng.list(ListFilter::Level(crate::memory::LEVEL_FULL)).unwrap().len(), 1);
        assert_eq!(eng.list(ListFilter::Protected).unwrap().len(), 1);
    }
}
