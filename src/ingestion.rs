//! Ingestion: turn → affect/summary analysis → embedding → record insert.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone};
use thiserror::Error;

use crate::config::MemoryConfig;
use crate::embeddings::EmbeddingProvider;
use crate::memory::MemoryRecord;
use crate::providers::{AnalysisProvider, ProviderError, TurnAnalysis};
use crate::retention;
use crate::storage::{Store, StorageError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("analysis or embedding provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("provider response violated the schema: {0}")]
    Schema(String),
    #[error("could not allocate a unique id after {0} attempts")]
    DuplicateId(u32),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("embedding dimension mismatch: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),
}

const MAX_ID_RETRY_ATTEMPTS: u32 = 20;

/// Result of a single successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    /// `true` if the record requested `protected = true` but the
    /// protected-count limit was already reached, so it was inserted
    /// unprotected rather than silently dropped.
    pub protected_overflow: bool,
}

/// Turns whose user text begins with `/` are host commands, not memories.
fn is_host_command(user_text: &str) -> bool {
    user_text.starts_with('/')
}

/// Ingests one turn. Returns `Ok(None)` for a skipped host-command turn,
/// `Ok(Some(outcome))` on success. Errors abort only this turn — the
/// caller's loop over a session's turns should continue past them.
pub fn ingest_turn(
    store: &Store,
    analysis_provider: &dyn AnalysisProvider,
    embedding_provider: &dyn EmbeddingProvider,
    user_text: &str,
    assistant_text: &str,
    timestamp: DateTime<FixedOffset>,
    config: &MemoryConfig,
) -> Result<Option<IngestOutcome>, IngestError> {
    if is_host_command(user_text) {
        return Ok(None);
    }

    let analysis = analysis_provider.analyze_turn(user_text, assistant_text)?;
    validate_analysis(&analysis)?;

    let coeff = retention::decay_coefficient(analysis.category, analysis.emotional_intensity);

    let embed_text = format!("{} {}", analysis.trigger, analysis.content);
    let embedding = embedding_provider.embed(&embed_text)?;
    crate::embeddings::validate_dimensions(&embedding)?;

    let memory_days0 =
        hours_until_next_batch(timestamp, config.compression.schedule_hour) / 24.0;
    let retention_score0 = analysis.emotional_intensity as f64;

    let protected_overflow = analysis.protected
        && protected_count(store)? >= config.protection.max_protected_memories;
    let protected = analysis.protected && !protected_overflow;

    let record = MemoryRecord {
        id: String::new(), // filled in by insert_with_generated_id
        created: timestamp,
        updated_at: timestamp,
        memory_days: memory_days0,
        recalled_since_last_batch: false,
        recall_count: 0,
        emotional_intensity: analysis.emotional_intensity,
        emotional_valence: analysis.emotional_valence,
        emotional_arousal: analysis.emotional_arousal,
        emotional_tags: analysis.emotional_tags.into_iter().collect(),
        decay_coefficient: coeff,
        category: analysis.category,
        keywords: analysis.keywords,
        current_level: crate::memory::LEVEL_FULL,
        trigger: analysis.trigger,
        content: analysis.content,
        embedding: Some(embedding),
        relations: Vec::new(),
        retention_score: retention_score0,
        archived_at: None,
        protected,
        revival_requested: false,
        revival_requested_at: None,
    };

    let id = insert_with_generated_id(store, record, timestamp)?;

    Ok(Some(IngestOutcome {
        id,
        protected_overflow,
    }))
}

fn validate_analysis(analysis: &TurnAnalysis) -> Result<(), IngestError> {
    if !(0..=100).contains(&analysis.emotional_intensity) {
        return Err(IngestError::Schema(format!(
            "emotional_intensity out of range: {}",
            analysis.emotional_intensity
        )));
    }
    if !(0..=100).contains(&analysis.emotional_arousal) {
        return Err(IngestError::Schema(format!(
            "emotional_arousal out of range: {}",
            analysis.emotional_arousal
        )));
    }
    if analysis.trigger.trim().is_empty() {
        return Err(IngestError::Schema("trigger must not be empty".into()));
    }
    Ok(())
}

fn protected_count(store: &Store) -> Result<usize, IngestError> {
    let active = store.get_active()?;
    let archived = store.get_archived()?;
    Ok(active.iter().chain(archived.iter()).filter(|r| r.protected).count())
}

/// Generates a `mem_YYYYMMDD_NNN` id and inserts, regenerating the id
/// suffix and retrying on a [`StorageError::DuplicateId`] collision.
fn insert_with_generated_id(
    store: &Store,
    mut record: MemoryRecord,
    timestamp: DateTime<FixedOffset>,
) -> Result<String, IngestError> {
    let date_str = timestamp.format("%Y%m%d").to_string();
    let counter_key = format!("id_counter_{date_str}");

    for _ in 0..MAX_ID_RETRY_ATTEMPTS {
        let current: u32 = store
            .get_state(&counter_key)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        let id = format!("mem_{date_str}_{next:03}");
        record.id = id.clone();

        match store.insert(&record) {
            Ok(()) => {
                store.set_state(&counter_key, &next.to_string())?;
                return Ok(id);
            }
            Err(StorageError::DuplicateId(_)) => {
                store.set_state(&counter_key, &next.to_string())?;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(IngestError::DuplicateId(MAX_ID_RETRY_ATTEMPTS))
}

/// `hours_until(next_batch_hour)` — hours from `now` to the next
/// occurrence of `schedule_hour:00` in `now`'s own offset.
fn hours_until_next_batch(now: DateTime<FixedOffset>, schedule_hour: u32) -> f64 {
    let schedule_time = NaiveTime::from_hms_opt(schedule_hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let target_date = if now.time() < schedule_time {
        now.date_naive()
    } else {
        now.date_naive() + chrono::Duration::days(1)
    };
    let target_naive = target_date.and_time(schedule_time);
    let target = now.offset().from_local_datetime(&target_naive).unwrap();
    (target - now).num_milliseconds() as f64 / (1000.0 * 3600.0)
}
