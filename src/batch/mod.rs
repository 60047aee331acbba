//! The daily batch engine: nine phases run in strict order, each committed
//! as its own transaction, guarded by the `last_compression_run` state key.

mod phases;

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::config::MemoryConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::memory::MemoryRecord;
use crate::providers::{AnalysisProvider, ProviderError};
use crate::storage::{FieldValue, Store, StorageError};

const LAST_COMPRESSION_RUN_KEY: &str = "last_compression_run";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Counters surfaced by a completed batch run, one field per phase metric
/// documented for the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchCounters {
    pub recalled_processed: u32,
    pub days_updated: u32,
    pub scores_updated: u32,
    pub l1_to_l2: u32,
    pub l2_to_l3: u32,
    pub l3_to_l4: u32,
    pub revived: u32,
    pub l1_forced: u32,
    pub l2_forced: u32,
    pub l3_forced: u32,
    pub relations_new: u32,
    pub relations_updated: u32,
    pub deleted: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum BatchOutcome {
    /// `interval_hours` has not elapsed since the last run and `force`
    /// was not set.
    Skipped,
    Completed(BatchCounters),
}

/// Runs one batch invocation. Guarded by `last_compression_run` unless
/// `force` is set; phases run strictly in order P1-P9.
pub fn run_batch(
    store: &Store,
    analysis_provider: &dyn AnalysisProvider,
    embedding_provider: &dyn EmbeddingProvider,
    config: &MemoryConfig,
    now: DateTime<FixedOffset>,
    force: bool,
) -> Result<BatchOutcome, BatchError> {
    let last_run = store
        .get_state(LAST_COMPRESSION_RUN_KEY)?
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok());

    if !force {
        if let Some(last_run) = last_run {
            let elapsed_hours = (now - last_run).num_seconds() as f64 / 3600.0;
            if elapsed_hours < config.compression.interval_hours as f64 {
                return Ok(BatchOutcome::Skipped);
            }
        }
    }

    let mut records: Vec<MemoryRecord> = store
        .get_active()?
        .into_iter()
        .chain(store.get_archived()?)
        .collect();

    let mut newly_embedded: HashSet<String> = records
        .iter()
        .filter(|r| last_run.map_or(true, |since| r.created > since))
        .map(|r| r.id.clone())
        .collect();

    let mut counters = BatchCounters::default();

    let (recalled_processed, days_updated) =
        phases::p1_recall_reinforcement(&mut records, &config.recall, config.retention.max_decay_coefficient);
    counters.recalled_processed = recalled_processed;
    counters.days_updated = days_updated;
    persist_all(store, &records)?;

    counters.scores_updated = phases::p3_rescore(&mut records);
    persist_all(store, &records)?;

    let compression = phases::p4_threshold_compression(
        &mut records,
        &config.levels,
        analysis_provider,
        embedding_provider,
        now,
        &mut newly_embedded,
    )?;
    counters.l1_to_l2 = compression.l1_to_l2;
    counters.l2_to_l3 = compression.l2_to_l3;
    counters.l3_to_l4 = compression.l3_to_l4;
    persist_all(store, &records)?;

    let revival = phases::p5_archive_revival(&mut records, &config.archive, &config.levels, now);
    counters.revived = revival.revived;
    persist_all(store, &records)?;

    let ratio = phases::p6_ratio_enforcement(
        &mut records,
        &config.levels,
        analysis_provider,
        embedding_provider,
        now,
        &mut newly_embedded,
    )?;
    counters.l1_forced = ratio.l1_forced;
    counters.l2_forced = ratio.l2_forced;
    counters.l3_forced = ratio.l3_forced;
    persist_all(store, &records)?;

    let relations = phases::p7_relation_maintenance(&mut records, &config.relations, &newly_embedded);
    counters.relations_new = relations.relations_new;
    counters.relations_updated = relations.relations_updated;
    persist_all(store, &records)?;

    let to_delete = phases::p8_archive_pruning(&records, &config.archive, now);
    if !to_delete.is_empty() {
        store.delete_many(&to_delete)?;
        counters.deleted = to_delete.len() as u32;
    }

    store.set_state(LAST_COMPRESSION_RUN_KEY, &now.to_rfc3339())?;

    Ok(BatchOutcome::Completed(counters))
}

/// Writes every mutable field of every record back to the store in one
/// transaction — simpler than per-phase diffing and still gives each
/// phase its own commit boundary.
fn persist_all(store: &Store, records: &[MemoryRecord]) -> Result<(), BatchError> {
    let updates: Vec<(String, Vec<FieldValue>)> = records
        .iter()
        .map(|record| {
            let mut fields = vec![
                FieldValue::MemoryDays(record.memory_days),
                FieldValue::RecalledSinceLastBatch(record.recalled_since_last_batch),
                FieldValue::RecallCount(record.recall_count),
                FieldValue::DecayCoefficient(record.decay_coefficient),
                FieldValue::Keywords(record.keywords.clone()),
                FieldValue::CurrentLevel(record.current_level),
                FieldValue::Trigger(record.trigger.clone()),
                FieldValue::Content(record.content.clone()),
                FieldValue::Relations(record.relations.clone()),
                FieldValue::RetentionScore(record.retention_score),
                FieldValue::ArchivedAt(record.archived_at),
                FieldValue::Protected(record.protected),
                FieldValue::RevivalRequested(record.revival_requested),
                FieldValue::RevivalRequestedAt(record.revival_requested_at),
            ];
            if let Some(embedding) = &record.embedding {
                fields.push(FieldValue::Embedding(embedding.clone()));
            }
            (record.id.clone(), fields)
        })
        .collect();
    store.update_many(&updates)?;
    Ok(())
}
