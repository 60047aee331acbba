//! Relation maintenance: integrity, direction re-evaluation, and
//! auto-linking (batch phase P7).

use std::collections::{HashMap, HashSet};

use crate::config::RelationsConfig;
use crate::embeddings::cosine_similarity;
use crate::memory::{MemoryRecord, Relation, RelationType};

#[derive(Debug, Default, Clone, Copy)]
pub struct RelationCounters {
    pub relations_new: u32,
    pub relations_updated: u32,
}

/// Drops relations whose target is missing or archived. Operates on the
/// full active set in place; `archived_ids` is the set of ids currently
/// archived (excluded as valid targets).
pub fn integrity_pass(active: &mut [MemoryRecord], archived_ids: &HashSet<String>) {
    let active_ids: HashSet<String> = active.iter().map(|r| r.id.clone()).collect();
    for record in active.iter_mut() {
        record.relations.retain(|rel| {
            active_ids.contains(&rel.target_id) && !archived_ids.contains(&rel.target_id)
        });
    }
}

/// For every surviving edge `A -> B`, flips it to `B -> A` (same type) if
/// `score(B) - score(A) > score_proximity_threshold`. Mutates `active` in
/// place and returns the number of edges flipped.
pub fn direction_reevaluation_pass(active: &mut [MemoryRecord], config: &RelationsConfig) -> u32 {
    let scores: HashMap<String, f64> = active
        .iter()
        .map(|r| (r.id.clone(), r.retention_score))
        .collect();

    let mut flips: Vec<(String, String, RelationType)> = Vec::new();
    for record in active.iter() {
        for rel in &record.relations {
            let score_a = scores.get(&record.id).copied().unwrap_or(0.0);
            let score_b = scores.get(&rel.target_id).copied().unwrap_or(0.0);
            if score_b - score_a > config.score_proximity_threshold {
                flips.push((record.id.clone(), rel.target_id.clone(), rel.relation_type));
            }
        }
    }

    for (from, to, relation_type) in &flips {
        if let Some(source) = active.iter_mut().find(|r| &r.id == from) {
            source.relations.retain(|r| &r.target_id != to || r.relation_type != *relation_type);
        }
        if let Some(target) = active.iter_mut().find(|r| &r.id == to) {
            if !target
                .relations
                .iter()
                .any(|r| &r.target_id == from && r.relation_type == *relation_type)
            {
                target.relations.push(Relation::new(from.clone(), *relation_type));
            }
        }
    }

    enforce_fan_out(active, &scores, config);
    flips.len() as u32
}

/// Auto-links `n in N` (newly inserted / re-embedded) against every active
/// record by cosine similarity, adding a `same_topic` edge from the
/// higher-score endpoint to the lower-score endpoint when similarity meets
/// the configured threshold and no edge already exists between the pair.
/// Returns the number of new edges added.
pub fn auto_link_pass(
    active: &mut [MemoryRecord],
    newly_embedded_ids: &HashSet<String>,
    config: &RelationsConfig,
) -> u32 {
    if !config.enable_auto_linking {
        return 0;
    }

    let snapshot: Vec<(String, f64, Option<Vec<f32>>)> = active
        .iter()
        .map(|r| (r.id.clone(), r.retention_score, r.embedding.clone()))
        .collect();

    let mut new_edges: Vec<(String, String)> = Vec::new();
    // Tracks `(higher, lower)` pairs already queued this pass — two mutually
    // similar members of `N` each visit the same pair (once as `n`, once as
    // `other`), and `already_linked` alone can't see a pair this same loop
    // just decided to add, since it only reads `active`'s existing edges.
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

    for (n_id, n_score, n_embedding) in snapshot.iter().filter(|(id, _, _)| newly_embedded_ids.contains(id)) {
        let Some(n_vec) = n_embedding else { continue };
        for (other_id, other_score, other_embedding) in &snapshot {
            if other_id == n_id {
                continue;
            }
            let Some(other_vec) = other_embedding else { continue };
            let sim = cosine_similarity(n_vec, other_vec);
            if sim < config.auto_link_similarity_threshold {
                continue;
            }
            let (higher, lower) = if n_score >= *other_score {
                (n_id.clone(), other_id.clone())
            } else {
                (other_id.clone(), n_id.clone())
            };
            if already_linked(active, &higher, &lower) {
                continue;
            }
            if !seen_pairs.insert((higher.clone(), lower.clone())) {
                continue;
            }
            new_edges.push((higher, lower));
        }
    }

    for (from, to) in &new_edges {
        if let Some(source) = active.iter_mut().find(|r| &r.id == from) {
            source.relations.push(Relation::new(to.clone(), RelationType::SameTopic));
        }
    }

    let scores: HashMap<String, f64> = active.iter().map(|r| (r.id.clone(), r.retention_score)).collect();
    enforce_fan_out(active, &scores, config);

    new_edges.len() as u32
}

fn already_linked(active: &[MemoryRecord], a: &str, b: &str) -> bool {
    active
        .iter()
        .find(|r| r.id == a)
        .is_some_and(|r| r.relations.iter().any(|rel| rel.target_id == b))
}

/// Enforces `|relations(x)| <= max_relations_per_memory` by dropping the
/// lowest-priority existing edges first (lowest target score first).
fn enforce_fan_out(active: &mut [MemoryRecord], scores: &HashMap<String, f64>, config: &RelationsConfig) {
    for record in active.iter_mut() {
        if record.relations.len() <= config.max_relations_per_memory {
            continue;
        }
        record
            .relations
            .sort_by(|a, b| {
                let sa = scores.get(&a.target_id).copied().unwrap_or(0.0);
                let sb = scores.get(&b.target_id).copied().unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
        record.relations.truncate(config.max_relations_per_memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::test_record;

    #[test]
    fn integrity_pass_drops_relations_to_missing_or_archived_targets() {
        let mut a = test_record("mem_20260101_001");
        a.relations = vec![
            Relation::new("mem_20260101_002", RelationType::Continues),
            Relation::new("mem_missing", RelationType::References),
        ];
        let mut archived_ids = HashSet::new();
        archived_ids.insert("mem_20260101_003".to_string());
        let mut b = test_record("mem_20260101_002");
        b.relations = vec![Relation::new("mem_20260101_003", RelationType::References)];

        let mut active = vec![a, b];
        integrity_pass(&mut active, &archived_ids);

        assert_eq!(active[0].relations.len(), 1);
        assert_eq!(active[0].relations[0].target_id, "mem_20260101_002");
        assert!(active[1].relations.is_empty());
    }

    #[test]
    fn s6_direction_flip_when_target_outscores_source_by_more_than_epsilon() {
        let mut a = test_record("mem_A");
        a.retention_score = 40.0;
        a.relations = vec![Relation::new("mem_B", RelationType::Continues)];
        let mut b = test_record("mem_B");
        b.retention_score = 55.0;

        let mut active = vec![a, b];
        let config = RelationsConfig::default();
        let flipped = direction_reevaluation_pass(&mut active, &config);

        assert_eq!(flipped, 1);
        assert!(active[0].relations.is_empty());
        assert_eq!(active[1].relations.len(), 1);
        assert_eq!(active[1].relations[0].target_id, "mem_A");
        assert_eq!(active[1].relations[0].relation_type, RelationType::Continues);
    }

    #[test]
    fn no_flip_within_epsilon() {
        let mut a = test_record("mem_A");
        a.retention_score = 70.0;
        a.relations = vec![Relation::new("mem_B", RelationType::Continues)];
        let mut b = test_record("mem_B");
        b.retention_score = 60.0;

        let mut active = vec![a, b];
        let config = RelationsConfig::default();
        let flipped = direction_reevaluation_pass(&mut active, &config);

        assert_eq!(flipped, 0);
        assert_eq!(active[0].relations.len(), 1);
    }

    #[test]
    fn auto_link_adds_same_topic_edge_from_higher_to_lower_score() {
        let mut a = test_record("mem_A");
        a.retention_score = 80.0;
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = test_record("mem_B");
        b.retention_score = 40.0;
        b.embedding = Some(vec![0.99, 0.01, 0.0]);

        let mut active = vec![a, b];
        let mut newly_embedded = HashSet::new();
        newly_embedded.insert("mem_A".to_string());
        let config = RelationsConfig::default();

        let added = auto_link_pass(&mut active, &newly_embedded, &config);
        assert_eq!(added, 1);
        assert_eq!(active[0].relations.len(), 1);
        assert_eq!(active[0].relations[0].target_id, "mem_B");
        assert_eq!(active[0].relations[0].relation_type, RelationType::SameTopic);
    }

    #[test]
    fn auto_link_counts_a_mutually_similar_pair_once_not_twice() {
        // Both ends of the pair are newly embedded, so the pair is visited
        // once as (n=A, other=B) and once as (n=B, other=A); both visits
        // resolve to the same (higher, lower) edge and must not double-add.
        let mut a = test_record("mem_A");
        a.retention_score = 80.0;
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = test_record("mem_B");
        b.retention_score = 40.0;
        b.embedding = Some(vec![0.99, 0.01, 0.0]);

        let mut active = vec![a, b];
        let mut newly_embedded = HashSet::new();
        newly_embedded.insert("mem_A".to_string());
        newly_embedded.insert("mem_B".to_string());
        let config = RelationsConfig::default();

        let added = auto_link_pass(&mut active, &newly_embedded, &config);
        assert_eq!(added, 1);
        assert_eq!(active[0].relations.len(), 1);
        assert_eq!(active[0].relations[0].target_id, "mem_B");
        assert!(active[1].relations.is_empty());
    }

    #[test]
    fn auto_link_skips_pairs_already_linked() {
        let mut a = test_record("mem_A");
        a.retention_score = 80.0;
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        a.relations = vec![Relation::new("mem_B", RelationType::SameTopic)];
        let mut b = test_record("mem_B");
        b.retention_score = 40.0;
        b.embedding = Some(vec![0.99, 0.01, 0.0]);

        let mut active = vec![a, b];
        let mut newly_embedded = HashSet::new();
        newly_embedded.insert("mem_A".to_string());
        let config = RelationsConfig::default();

        let added = auto_link_pass(&mut active, &newly_embedded, &config);
        assert_eq!(added, 0);
    }

    #[test]
    fn fan_out_enforcement_keeps_highest_scoring_targets() {
        let mut hub = test_record("mem_hub");
        hub.relations = (0..12)
            .map(|i| Relation::new(format!("mem_{i}"), RelationType::SameTopic))
            .collect();
        let mut scores = HashMap::new();
        for i in 0..12 {
            scores.insert(format!("mem_{i}"), i as f64);
        }
        let mut active = vec![hub];
        let config = RelationsConfig::default();
        enforce_fan_out(&mut active, &scores, &config);

        assert_eq!(active[0].relations.len(), config.max_relations_per_memory);
        // highest-scoring targets (11, 10, ...) survive
        assert!(active[0].relations.iter().any(|r| r.target_id == "mem_11"));
        assert!(!active[0].relations.iter().any(|r| r.target_id == "mem_0"));
    }
}
