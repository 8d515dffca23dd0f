//! Deterministic keyword urgency scorer
//!
//! Serves every call the breaker keeps away from the primary model. It is
//! pure, synchronous and never fails, so it sits outside the breaker.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::model::{ModelError, UrgencyModel};

/// Score for text with an urgency keyword
pub const URGENT_SCORE: f32 = 0.85;

/// Score for text without one
pub const BASELINE_SCORE: f32 = 0.25;

static URGENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:asap|as soon as possible|urgent|emergency|critical|broken|outage|down|not working|immediately|right now|P0|P1|severity 1)\b",
    )
    .expect("URGENCY_RE regex should compile")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordUrgencyScorer;

impl KeywordUrgencyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Whether `text` contains an urgency keyword
    pub fn is_urgent(&self, text: &str) -> bool {
        URGENCY_RE.is_match(text)
    }

    /// Urgency of `text`; blank text scores 0.
    pub fn score_text(&self, text: &str) -> f32 {
        if text.trim().is_empty() {
            0.0
        } else if self.is_urgent(text) {
            URGENT_SCORE
        } else {
            BASELINE_SCORE
        }
    }
}

#[async_trait]
impl UrgencyModel for KeywordUrgencyScorer {
    fn name(&self) -> String {
        "keyword_fallback".to_string()
    }

    async fn score(&self, text: &str) -> Result<f32, ModelError> {
        Ok(self.score_text(text))
    }
}
