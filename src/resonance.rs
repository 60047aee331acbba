//! Resonance: the emotional-similarity bonus layered onto retrieval
//! priority when a current emotion context is supplied.

use std::collections::BTreeSet;

use crate::config::ResonanceConfig;
use crate::memory::Valence;

/// The caller's emotional context at query time.
#[derive(Debug, Clone)]
pub struct EmotionContext {
    pub valence: Valence,
    pub arousal: i32,
    pub tags: BTreeSet<String>,
}

/// `valence_bonus + arousal_bonus + tag_bonus`, each computed per the
/// formulas below and scaled by the configured weights.
pub fn resonance_bonus(
    mem_valence: Valence,
    mem_arousal: i32,
    mem_tags: &BTreeSet<String>,
    current: &EmotionContext,
    config: &ResonanceConfig,
) -> f64 {
    valence_bonus(mem_valence, current.valence, config)
        + arousal_bonus(mem_arousal, current.arousal, config)
        + tag_bonus(mem_tags, &current.tags, config)
}

fn valence_bonus(mem: Valence, current: Valence, config: &ResonanceConfig) -> f64 {
    if mem == current {
        config.valence_bonus
    } else {
        0.0
    }
}

fn arousal_bonus(mem_arousal: i32, current_arousal: i32, config: &ResonanceConfig) -> f64 {
    let delta = (mem_arousal - current_arousal).unsigned_abs() as f64;
    (config.arousal_bonus_max * (1.0 - delta / 100.0)).max(0.0)
}

fn tag_bonus(mem_tags: &BTreeSet<String>, current_tags: &BTreeSet<String>, config: &ResonanceConfig) -> f64 {
    if mem_tags.is_empty() || current_tags.is_empty() {
        return 0.0;
    }
    let overlap = mem_tags.intersection(current_tags).count();
    let denom = mem_tags.len().max(current_tags.len());
    (overlap as f64 / denom as f64) * config.tag_bonus_max
}
