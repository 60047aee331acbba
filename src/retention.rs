//! Retention/decay mathematics: decay-coefficient selection, the
//! retention-score formula, and level classification.

use crate::config::LevelsConfig;
use crate::memory::{Category, Level, LEVEL_ARCHIVE, LEVEL_FULL, LEVEL_KEYWORDS, LEVEL_SUMMARY};

/// Linearly interpolates the decay coefficient within a category's range
/// by intensity: `coeff = min_c + (max_c - min_c) * intensity/100`.
pub fn decay_coefficient(category: Category, intensity: i32) -> f64 {
    let (min_c, max_c) = category.decay_range();
    let fraction = (intensity.clamp(0, 100) as f64) / 100.0;
    min_c + (max_c - min_c) * fraction
}

/// `retention_score = intensity * coeff^days`, computed via
/// `exp(days * ln coeff)` to avoid overflow/NaN for large `days`.
/// A non-positive coefficient is treated defensively as 0.
pub fn retention_score(intensity: i32, coeff: f64, days: f64) -> f64 {
    if coeff <= 0.0 {
        return 0.0;
    }
    let decayed = (days * coeff.ln()).exp();
    intensity as f64 * decayed
}

/// Natural level classification from a score alone, ignoring ratio
/// enforcement — the batch engine applies forced ratios on top of this.
pub fn natural_level(score: f64, levels: &LevelsConfig) -> Level {
    if score > levels.l1_threshold {
        LEVEL_FULL
    } else if score > levels.l2_threshold {
        LEVEL_SUMMARY
    } else if score > levels.l3_threshold {
        LEVEL_KEYWORDS
    } else {
        LEVEL_ARCHIVE
    }
}
