//! Engine configuration.
//!
//! A JSON document with the sections listed below. Every section derives
//! `Default` and `#[serde(default)]` so a config file may specify only the
//! sections (or keys) it wants to override; unknown keys are ignored by
//! `serde_json` without extra ceremony.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub levels: LevelsConfig,
    #[serde(default)]
    pub recall: RecallConfig,
    #[serde(default)]
    pub resonance: ResonanceConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub relations: RelationsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl MemoryConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_decay_coefficient: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_decay_coefficient: 0.999,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelsConfig {
    pub l1_threshold: f64,
    pub l2_threshold: f64,
    pub l3_threshold: f64,
    pub l1_ratio: f64,
    pub l2_ratio: f64,
    pub l3_ratio: f64,
    pub archive_ratio: f64,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            l1_threshold: 50.0,
            l2_threshold: 20.0,
            l3_threshold: 5.0,
            l1_ratio: 0.15,
            l2_ratio: 0.30,
            l3_ratio: 0.35,
            archive_ratio: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub days_multiplier: f64,
    pub coefficient_boost: f64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            days_multiplier: 0.5,
            coefficient_boost: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    pub valence_bonus: f64,
    pub arousal_bonus_max: f64,
    pub tag_bonus_max: f64,
    pub alpha: f64,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            valence_bonus: 0.3,
            arousal_bonus_max: 0.2,
            tag_bonus_max: 0.5,
            alpha: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub interval_hours: i64,
    pub schedule_hour: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
            schedule_hour: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationsConfig {
    pub max_relations_per_memory: usize,
    pub score_proximity_threshold: f64,
    pub enable_auto_linking: bool,
    pub auto_link_similarity_threshold: f32,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            max_relations_per_memory: 10,
            score_proximity_threshold: 5.0,
            enable_auto_linking: true,
            auto_link_similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub relevance_threshold: f64,
    pub recall_count_weight: f64,
    pub enable_archive_recall: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 5.0,
            recall_count_weight: 0.1,
            enable_archive_recall: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteConditionMode {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub auto_delete_enabled: bool,
    pub retention_days: i64,
    pub delete_require_zero_recall: bool,
    pub delete_max_intensity: i32,
    pub delete_condition_mode: DeleteConditionMode,
    pub revival_decay_per_day: f64,
    pub revival_min_margin: f64,
    pub l3_revival_ratio_cap: f64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            auto_delete_enabled: false,
            retention_days: 365,
            delete_require_zero_recall: true,
            delete_max_intensity: 20,
            delete_condition_mode: DeleteConditionMode::And,
            revival_decay_per_day: 0.995,
            revival_min_margin: 3.0,
            l3_revival_ratio_cap: 0.35,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub max_protected_memories: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            max_protected_memories: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: crate::memory::EMBEDDING_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = MemoryConfig::default();
        assert_eq!(cfg.retention.max_decay_coefficient, 0.999);
        assert_eq!(cfg.levels.l1_threshold, 50.0);
        assert_eq!(cfg.relations.max_relations_per_memory, 10);
        assert_eq!(cfg.protection.max_protected_memories, 50);
        assert_eq!(cfg.embedding.dimensions, 1536);
    }

    #[test]
    fn unknown_keys_and_missing_sections_are_tolerated() {
        let json = r#"{"retention": {"max_decay_coefficient": 0.99}, "bogus_section": {"x": 1}}"#;
        let cfg = MemoryConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.retention.max_decay_coefficient, 0.99);
        assert_eq!(cfg.levels.l2_threshold, 20.0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(MemoryConfig::from_json_str("{not json").is_err());
    }
}
