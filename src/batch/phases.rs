//! Individual batch phases (P1, P3-P8; P2 is folded into P1, P9 is the
//! orchestrator's own final write). Each phase mutates an in-memory working
//! set; the orchestrator persists the result after each call.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};

use crate::config::{ArchiveConfig, DeleteConditionMode, LevelsConfig, RecallConfig, RelationsConfig};
use crate::embeddings::EmbeddingProvider;
use crate::memory::{MemoryRecord, Relation, LEVEL_ARCHIVE, LEVEL_FULL, LEVEL_KEYWORDS, LEVEL_SUMMARY};
use crate::providers::AnalysisProvider;
use crate::recall::apply_recall_cycle;
use crate::relations;
use crate::retention;

use super::BatchError;

/// P1 (recall reinforcement) + P2 (aging, folded in). Returns
/// `(recalled_processed, days_updated)`.
pub fn p1_recall_reinforcement(
    records: &mut [MemoryRecord],
    recall_config: &RecallConfig,
    max_coefficient: f64,
) -> (u32, u32) {
    let mut recalled_processed = 0;
    let mut days_updated = 0;
    for record in records.iter_mut().filter(|r| r.is_active()) {
        if record.recalled_since_last_batch {
            recalled_processed += 1;
        }
        apply_recall_cycle(record, recall_config, max_coefficient);
        days_updated += 1;
    }
    (recalled_processed, days_updated)
}

/// P3: recomputes `retention_score` for every non-archived record.
pub fn p3_rescore(records: &mut [MemoryRecord]) -> u32 {
    let mut scores_updated = 0;
    for record in records.iter_mut().filter(|r| r.is_active()) {
        record.retention_score =
            retention::retention_score(record.emotional_intensity, record.decay_coefficient, record.memory_days);
        scores_updated += 1;
    }
    scores_updated
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompressionCounters {
    pub l1_to_l2: u32,
    pub l2_to_l3: u32,
    pub l3_to_l4: u32,
}

/// Applies exactly one level-down transition to `record` (L1->L2, L2->L3,
/// or L3->L4), invoking the matching provider call and re-embedding where
/// applicable. No-op if already at L4.
fn demote_once(
    record: &mut MemoryRecord,
    analysis: &dyn AnalysisProvider,
    embeddings: &dyn EmbeddingProvider,
    now: DateTime<FixedOffset>,
    newly_embedded: &mut HashSet<String>,
) -> Result<Option<u8>, BatchError> {
    match record.current_level {
        LEVEL_FULL => {
            let summary = analysis.summarize_to_level2(&record.trigger, &record.content)?;
            record.trigger = summary.trigger;
            record.content = summary.content;
            record.current_level = LEVEL_SUMMARY;
            let text = format!("{} {}", record.trigger, record.content);
            record.embedding = Some(embeddings.embed(&text)?);
            newly_embedded.insert(record.id.clone());
            Ok(Some(LEVEL_FULL))
        }
        LEVEL_SUMMARY => {
            let extracted = analysis.extract_keywords_to_level3(&record.trigger, &record.content)?;
            record.trigger = extracted.trigger;
            record.content = extracted.content;
            record.current_level = LEVEL_KEYWORDS;
            let text = format!("{} {}", record.trigger, record.content);
            record.embedding = Some(embeddings.embed(&text)?);
            newly_embedded.insert(record.id.clone());
            Ok(Some(LEVEL_SUMMARY))
        }
        LEVEL_KEYWORDS => {
            record.archived_at = Some(now);
            record.current_level = LEVEL_ARCHIVE;
            Ok(Some(LEVEL_KEYWORDS))
        }
        _ => Ok(None),
    }
}

/// P4: for each non-protected active record whose natural level sits below
/// (numerically above) its stored level, demotes it exactly one level this
/// batch — a record more than one boundary below its natural level makes
/// up the remainder on a later batch rather than cascading through several
/// compressions in one run. A provider/embedding failure on a given record
/// is logged and that record simply stays at its prior level, to be
/// retried next batch; it never aborts the phase for the rest of the set.
pub fn p4_threshold_compression(
    records: &mut [MemoryRecord],
    levels: &LevelsConfig,
    analysis: &dyn AnalysisProvider,
    embeddings: &dyn EmbeddingProvider,
    now: DateTime<FixedOffset>,
    newly_embedded: &mut HashSet<String>,
) -> Result<CompressionCounters, BatchError> {
    let mut counters = CompressionCounters::default();
    for record in records.iter_mut().filter(|r| r.is_active() && !r.protected) {
        let target = retention::natural_level(record.retention_score, levels);
        if record.current_level >= target {
            continue;
        }
        match demote_once(record, analysis, embeddings, now, newly_embedded) {
            Ok(Some(LEVEL_FULL)) => counters.l1_to_l2 += 1,
            Ok(Some(LEVEL_SUMMARY)) => counters.l2_to_l3 += 1,
            Ok(Some(LEVEL_KEYWORDS)) => counters.l3_to_l4 += 1,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    id = %record.id,
                    %error,
                    "tier compression failed; record stays at its prior level and will be retried next batch"
                );
            }
        }
    }
    Ok(counters)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RevivalCounters {
    pub revived: u32,
}

/// P5: revives archived, revival-requested records whose projected L3
/// ratio stays within the cap, oldest request first.
pub fn p5_archive_revival(records: &mut [MemoryRecord], archive: &ArchiveConfig, levels: &LevelsConfig, now: DateTime<FixedOffset>) -> RevivalCounters {
    let mut l3_count = records
        .iter()
        .filter(|r| r.is_active() && !r.protected && r.current_level == LEVEL_KEYWORDS)
        .count();
    let mut active_count = records.iter().filter(|r| r.is_active() && !r.protected).count();

    let mut candidate_ids: Vec<String> = records
        .iter()
        .filter(|r| r.is_archived() && r.revival_requested)
        .map(|r| r.id.clone())
        .collect();
    candidate_ids.sort_by_key(|id| {
        records
            .iter()
            .find(|r| &r.id == id)
            .and_then(|r| r.revival_requested_at)
    });

    let mut counters = RevivalCounters::default();
    for id in candidate_ids {
        let Some(record) = records.iter_mut().find(|r| r.id == id) else { continue };
        let projected_ratio = (l3_count + 1) as f64 / (active_count + 1) as f64;
        if projected_ratio <= archive.l3_revival_ratio_cap {
            let archived_days = record
                .archived_at
                .map(|at| (now - at).num_days())
                .unwrap_or(0);
            let decayed = record.emotional_intensity as f64 * archive.revival_decay_per_day.powi(archived_days as i32);
            let floor = levels.l3_threshold + archive.revival_min_margin;

            record.archived_at = None;
            record.current_level = LEVEL_KEYWORDS;
            record.revival_requested = false;
            record.recalled_since_last_batch = true;
            record.recall_count += 1;
            record.retention_score = decayed.max(floor);

            l3_count += 1;
            active_count += 1;
            counters.revived += 1;
        } else {
            record.revival_requested = false;
        }
    }
    counters
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RatioCounters {
    pub l1_forced: u32,
    pub l2_forced: u32,
    pub l3_forced: u32,
}

fn quota(ratio: f64, total: usize) -> usize {
    (ratio * total as f64).ceil() as usize
}

fn level_population(records: &[MemoryRecord], level: u8) -> usize {
    records
        .iter()
        .filter(|r| r.is_active() && !r.protected && r.current_level == level)
        .count()
}

/// Selects the `excess` lowest-priority non-protected active records at
/// `level`, ordered by `(retention_score asc, created asc, recall_count asc)`.
fn select_demotion_targets(records: &[MemoryRecord], level: u8, excess: usize) -> Vec<String> {
    let mut candidates: Vec<&MemoryRecord> = records
        .iter()
        .filter(|r| r.is_active() && !r.protected && r.current_level == level)
        .collect();
    candidates.sort_by(|a, b| {
        a.retention_score
            .partial_cmp(&b.retention_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.created.cmp(&b.created))
            .then_with(|| a.recall_count.cmp(&b.recall_count))
    });
    candidates.into_iter().take(excess).map(|r| r.id.clone()).collect()
}

/// P6: enforces the target tier ratios against the non-protected active
/// count fixed at phase start, processing L1 then L2 then L3 in order and
/// recomputing each level's population after the previous level's
/// demotions land.
pub fn p6_ratio_enforcement(
    records: &mut [MemoryRecord],
    levels: &LevelsConfig,
    analysis: &dyn AnalysisProvider,
    embeddings: &dyn EmbeddingProvider,
    now: DateTime<FixedOffset>,
    newly_embedded: &mut HashSet<String>,
) -> Result<RatioCounters, BatchError> {
    let total = records.iter().filter(|r| r.is_active() && !r.protected).count();
    let mut counters = RatioCounters::default();

    for level in [LEVEL_FULL, LEVEL_SUMMARY, LEVEL_KEYWORDS] {
        let ratio = match level {
            LEVEL_FULL => levels.l1_ratio,
            LEVEL_SUMMARY => levels.l2_ratio,
            _ => levels.l3_ratio,
        };
        let population = level_population(records, level);
        let cap = quota(ratio, total);
        if population <= cap {
            continue;
        }
        let excess = population - cap;
        let targets = select_demotion_targets(records, level, excess);
        for id in &targets {
            let Some(record) = records.iter_mut().find(|r| &r.id == id) else { continue };
            match demote_once(record, analysis, embeddings, now, newly_embedded) {
                Ok(Some(_)) => match level {
                    LEVEL_FULL => counters.l1_forced += 1,
                    LEVEL_SUMMARY => counters.l2_forced += 1,
                    _ => counters.l3_forced += 1,
                },
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        id = %record.id,
                        %error,
                        "forced ratio demotion failed; record stays at its prior level and will be retried next batch"
                    );
                }
            }
        }
    }

    Ok(counters)
}

/// P7: integrity, direction re-evaluation, and auto-linking, restricted to
/// the active subset (archived records carry no meaningful edges).
pub fn p7_relation_maintenance(
    records: &mut [MemoryRecord],
    config: &RelationsConfig,
    newly_embedded_ids: &HashSet<String>,
) -> relations::RelationCounters {
    let archived_ids: HashSet<String> = records.iter().filter(|r| r.is_archived()).map(|r| r.id.clone()).collect();
    let before: HashMap<String, usize> = records.iter().map(|r| (r.id.clone(), r.relations.len())).collect();

    let mut active: Vec<MemoryRecord> = records.iter().filter(|r| r.is_active()).cloned().collect();
    relations::integrity_pass(&mut active, &archived_ids);
    let flipped = relations::direction_reevaluation_pass(&mut active, config);
    let added = relations::auto_link_pass(&mut active, newly_embedded_ids, config);

    let updated: HashMap<String, Vec<Relation>> = active.into_iter().map(|r| (r.id, r.relations)).collect();
    let mut integrity_drops = 0;
    for record in records.iter_mut() {
        if let Some(new_relations) = updated.get(&record.id) {
            let before_len = before.get(&record.id).copied().unwrap_or(0);
            if new_relations.len() < before_len {
                integrity_drops += 1;
            }
            record.relations = new_relations.clone();
        }
    }

    relations::RelationCounters {
        relations_new: added,
        relations_updated: flipped + integrity_drops,
    }
}

/// P8: ids of archived records satisfying the configured delete condition
/// set (no-op unless `archive.auto_delete_enabled`).
pub fn p8_archive_pruning(records: &[MemoryRecord], archive: &ArchiveConfig, now: DateTime<FixedOffset>) -> Vec<String> {
    if !archive.auto_delete_enabled {
        return Vec::new();
    }
    records
        .iter()
        .filter(|r| r.is_archived() && !r.protected)
        .filter(|r| {
            let archived_at = r.archived_at.expect("filtered to archived records");
            let age_days = (now - archived_at).num_days();
            let mut conditions = vec![age_days > archive.retention_days];
            if archive.delete_require_zero_recall {
                conditions.push(r.recall_count == 0);
            }
            conditions.push(r.emotional_intensity < archive.delete_max_intensity);
            match archive.delete_condition_mode {
                DeleteConditionMode::And => conditions.into_iter().all(|c| c),
                DeleteConditionMode::Or => conditions.into_iter().any(|c| c),
            }
        })
        .map(|r| r.id.clone())
        .collect()
}
