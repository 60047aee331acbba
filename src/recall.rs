//! Recall reinforcement: the per-batch aging/strengthening step applied to
//! every non-archived record (phases P1/P2 of the batch engine).

use crate::config::RecallConfig;
use crate::memory::MemoryRecord;

/// Applies one batch cycle of recall reinforcement or aging to a single
/// non-archived record, in place. Archived records must not be passed
/// here — the caller filters them out so aging stays frozen for them.
pub fn apply_recall_cycle(record: &mut MemoryRecord, config: &RecallConfig, max_coefficient: f64) {
    debug_assert!(record.is_active(), "recall cycle must skip archived records");
    if record.recalled_since_last_batch {
        record.memory_days *= config.days_multiplier;
        record.decay_coefficient =
            (record.decay_coefficient + config.coefficient_boost).min(max_coefficient);
        record.recall_count += 1;
        record.recalled_since_last_batch = false;
    } else {
        record.memory_days += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::test_record;

    #[test]
    fn recalled_record_halves_days_boosts_coefficient_and_counts() {
        // S2: days=10, coeff=0.90, count=0, recalled -> days=5, coeff=0.92, count=1
        let mut record = test_record("mem_20260101_001");
        record.memory_days = 10.0;
        record.decay_coefficient = 0.90;
        record.recall_count = 0;
        record.recalled_since_last_batch = true;

        apply_recall_cycle(&mut record, &RecallConfig::default(), 0.999);

        assert_eq!(record.memory_days, 5.0);
        assert!((record.decay_coefficient - 0.92).abs() < 1e-9);
        assert_eq!(record.recall_count, 1);
        assert!(!record.recalled_since_last_batch);
    }

    #[test]
    fn non_recalled_record_only_ages_by_one_day() {
        let mut record = test_record("mem_20260101_002");
        record.memory_days = 3.0;
        record.decay_coefficient = 0.90;
        record.recall_count = 2;
        record.recalled_since_last_batch = false;

        apply_recall_cycle(&mut record, &RecallConfig::default(), 0.999);

        assert_eq!(record.memory_days, 4.0);
        assert_eq!(record.decay_coefficient, 0.90);
        assert_eq!(record.recall_count, 2);
    }

    #[test]
    fn coefficient_boost_is_capped_at_max_decay_coefficient() {
        let mut record = test_record("mem_20260101_003");
        record.decay_coefficient = 0.989;
        record.recalled_since_last_batch = true;

        apply_recall_cycle(&mut record, &RecallConfig::default(), 0.999);

        assert_eq!(record.decay_coefficient, 0.999);
    }

    #[test]
    fn coefficient_monotone_non_decreasing_under_repeated_recall() {
        let mut record = test_record("mem_20260101_004");
        record.decay_coefficient = 0.70;
        let mut previous = record.decay_coefficient;
        for _ in 0..50 {
            record.recalled_since_last_batch = true;
            apply_recall_cycle(&mut record, &RecallConfig::default(), 0.999);
            assert!(record.decay_coefficient >= previous);
            assert!(record.decay_coefficient <= 0.999);
            previous = record.decay_coefficient;
        }
    }
}
