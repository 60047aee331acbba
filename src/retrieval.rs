//! Retrieval: query embedding, cosine scan, priority scoring, and
//! threshold+fallback top-k selection.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::config::MemoryConfig;
use crate::embeddings::{cosine_similarity, EmbeddingError, EmbeddingProvider};
use crate::memory::MemoryRecord;
use crate::resonance::{self, EmotionContext};
use crate::storage::{FieldValue, Store, StorageError};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One scored candidate before side effects are applied.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub from_archive: bool,
    pub priority: f64,
}

/// Runs a retrieval and applies its `mark_recalled`/revival-request side
/// effects. Returns the selected, priority-ordered candidates.
pub fn retrieve(
    store: &Store,
    embedding_provider: &dyn EmbeddingProvider,
    query: &str,
    current_emotion: Option<&EmotionContext>,
    now: DateTime<FixedOffset>,
    config: &MemoryConfig,
) -> Result<Vec<ScoredMemory>, RetrievalError> {
    if query.starts_with('/') {
        return Ok(Vec::new());
    }

    let query_embedding = embedding_provider.embed(query)?;

    let mut candidates = Vec::new();
    for record in store.get_active()? {
        if record.embedding.is_some() {
            candidates.push((record, false));
        }
    }
    if config.retrieval.enable_archive_recall {
        for record in store.get_archived()? {
            if record.embedding.is_some() {
                candidates.push((record, true));
            }
        }
    }

    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .map(|(record, from_archive)| {
            let priority = score_candidate(&record, &query_embedding, current_emotion, &config.resonance);
            ScoredMemory {
                record,
                from_archive,
                priority,
            }
        })
        .collect();

    let selected = select_top_k(&mut scored, config.retrieval.relevance_threshold, config.retrieval.top_k);

    apply_side_effects(store, &selected, now)?;

    Ok(selected)
}

fn score_candidate(
    record: &MemoryRecord,
    query_embedding: &[f32],
    current_emotion: Option<&EmotionContext>,
    resonance_config: &crate::config::ResonanceConfig,
) -> f64 {
    let embedding = record.embedding.as_deref().unwrap_or(&[]);
    let sim = cosine_similarity(query_embedding, embedding).max(0.0) as f64;
    let base = record.retention_score * sim * (1.0 + 0.1 * record.recall_count as f64);

    match current_emotion {
        Some(ctx) => {
            let bonus = resonance::resonance_bonus(
                record.emotional_valence,
                record.emotional_arousal,
                &record.emotional_tags,
                ctx,
                resonance_config,
            );
            base + resonance_config.alpha * bonus * record.retention_score
        }
        None => base,
    }
}

/// Of the candidates with `priority > 0`, picks those `>= threshold`; if
/// that set has at least `top_k` items, returns its top-k by priority.
/// Otherwise returns the global top-k of the full scored list. Ties are
/// broken by more recent `created`.
fn select_top_k(scored: &mut [ScoredMemory], threshold: f64, top_k: usize) -> Vec<ScoredMemory> {
    let positive: Vec<&ScoredMemory> = scored.iter().filter(|m| m.priority > 0.0).collect();
    let above_threshold: Vec<&ScoredMemory> =
        positive.iter().filter(|m| m.priority >= threshold).copied().collect();

    let pool: Vec<&ScoredMemory> = if above_threshold.len() >= top_k {
        above_threshold
    } else {
        positive
    };

    let mut ranked: Vec<&ScoredMemory> = pool;
    ranked.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.created.cmp(&a.record.created))
    });
    ranked.into_iter().take(top_k).cloned().collect()
}

fn apply_side_effects(
    store: &Store,
    selected: &[ScoredMemory],
    now: DateTime<FixedOffset>,
) -> Result<(), RetrievalError> {
    let active_ids: Vec<String> = selected
        .iter()
        .filter(|m| !m.from_archive)
        .map(|m| m.record.id.clone())
        .collect();
    if !active_ids.is_empty() {
        store.mark_recalled(&active_ids)?;
    }

    for m in selected.iter().filter(|m| m.from_archive) {
        store.update(
            &m.record.id,
            &[
                FieldValue::RevivalRequested(true),
                FieldValue::RevivalRequestedAt(Some(now)),
            ],
        )?;
    }

    Ok(())
}
