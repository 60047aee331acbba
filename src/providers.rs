//! Analysis provider — the LLM collaborator behind ingestion and tier
//! compression. Out of scope: the model/HTTP client itself; the engine
//! only depends on this trait's contract.

use serde::Deserialize;
use thiserror::Error;

use crate::memory::{Category, Valence};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider response violated the expected schema: {0}")]
    SchemaViolation(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Raw JSON response for the ingestion analysis call, mirroring the exact
/// wire contract (eight required keys, plus the advisory `protected` flag).
/// `#[serde(deny_unknown_fields)]` is intentionally *not* set here — the
/// provider is free to add future keys the engine simply ignores.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnAnalysis {
    pub emotional_intensity: i32,
    pub emotional_valence: Valence,
    pub emotional_arousal: i32,
    pub emotional_tags: Vec<String>,
    pub category: Category,
    pub keywords: Vec<String>,
    pub trigger: String,
    pub content: String,
    #[serde(default)]
    pub protected: bool,
}

/// A `{trigger, content}` pair, the shared shape of both compression
/// prompts' responses.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerContent {
    pub trigger: String,
    pub content: String,
}

pub trait AnalysisProvider: Send + Sync {
    /// Ingestion analysis: affect profile + category + keywords + a
    /// trigger/content summary pair for one turn.
    fn analyze_turn(&self, user_text: &str, assistant_text: &str) -> Result<TurnAnalysis>;

    /// L1→L2 tier compression: condenses an existing trigger/content pair
    /// into a one-sentence trigger and a 2-3 sentence content summary.
    fn summarize_to_level2(&self, trigger: &str, content: &str) -> Result<TriggerContent>;

    /// L2→L3 tier compression: reduces a trigger/content pair to
    /// comma-separated keyword lists (2-3 keywords each).
    fn extract_keywords_to_level3(&self, trigger: &str, content: &str) -> Result<TriggerContent>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A scripted provider for deterministic unit/integration tests.
    pub(crate) struct MockAnalysisProvider {
        pub(crate) turn_responses: Mutex<Vec<Result<TurnAnalysis>>>,
    }

    impl MockAnalysisProvider {
        pub(crate) fn new(responses: Vec<Result<TurnAnalysis>>) -> Self {
            Self {
                turn_responses: Mutex::new(responses),
            }
        }
    }

    impl AnalysisProvider for MockAnalysisProvider {
        fn analyze_turn(&self, _user_text: &str, _assistant_text: &str) -> Result<TurnAnalysis> {
            self.turn_responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Unavailable("exhausted".into())))
        }

        fn summarize_to_level2(&self, trigger: &str, content: &str) -> Result<TriggerContent> {
            Ok(TriggerContent {
                trigger: format!("summary: {trigger}"),
                content: format!("summary: {content}"),
            })
        }

        fn extract_keywords_to_level3(
            &self,
            trigger: &str,
            content: &str,
        ) -> Result<TriggerContent> {
            Ok(TriggerContent {
                trigger: trigger.split_whitespace().take(3).collect::<Vec<_>>().join(","),
                content: content.split_whitespace().take(3).collect::<Vec<_>>().join(","),
            })
        }
    }

    #[test]
    fn turn_analysis_deserializes_exact_contract() {
        let json = r#"{
            "emotional_intensity": 45,
            "emotional_valence": "positive",
            "emotional_arousal": 30,
            "emotional_tags": ["work", "deadline"],
            "category": "work",
            "keywords": ["release", "friday"],
            "trigger": "asked about the release date",
            "content": "confirmed friday ship"
        }"#;
        let parsed: TurnAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.emotional_intensity, 45);
        assert!(!parsed.protected);
    }

    #[test]
    fn missing_required_key_is_a_schema_error() {
        let json = r#"{"emotional_intensity": 45}"#;
        assert!(serde_json::from_str::<TurnAnalysis>(json).is_err());
    }
}
