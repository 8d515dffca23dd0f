//! Urgency model capability interface
//!
//! The primary (transformer) model and the deterministic fallback both
//! implement [`UrgencyModel`]; the breaker decides which one serves a call.

use async_trait::async_trait;

/// Error type for urgency model calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Model call timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("Model latency {latency_ms}ms exceeded {limit_ms}ms")]
    LatencyExceeded { latency_ms: u64, limit_ms: u64 },

    #[error("Model returned out-of-range score {0}")]
    InvalidScore(f32),

    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Scores ticket text for urgency in [0, 1].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrgencyModel: Send + Sync {
    /// Name used in logs and score outcomes
    fn name(&self) -> String;

    /// Urgency of `text` in [0, 1]
    async fn score(&self, text: &str) -> Result<f32, ModelError>;
}
