//! Urgency scoring with automatic failover
//!
//! [`ModelRouter::score`] never fails because of the model: slow or failing
//! primary calls open the circuit and are answered by the keyword fallback.
//! Only shared-state failures propagate.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::circuit_breaker::{Admission, BreakerStatus, CircuitBreaker, Transition};
use super::fallback::KeywordUrgencyScorer;
use super::model::{ModelError, UrgencyModel};
use crate::clock::SharedClock;
use crate::error::OrchestratorResult;
use crate::events::{OrchestratorEvent, SharedEventBus};

/// Result of one scoring call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub urgency_score: f32,
    pub used_fallback: bool,
    /// Which scorer produced the value
    pub served_by: String,
    /// Primary-model latency, when the primary was called
    pub latency_ms: Option<u64>,
}

/// Routes urgency scoring between the primary model and the fallback.
pub struct ModelRouter {
    primary: Arc<dyn UrgencyModel>,
    fallback: KeywordUrgencyScorer,
    breaker: CircuitBreaker,
    events: SharedEventBus,
    clock: SharedClock,
}

impl ModelRouter {
    pub fn new(
        primary: Arc<dyn UrgencyModel>,
        breaker: CircuitBreaker,
        events: SharedEventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            primary,
            fallback: KeywordUrgencyScorer::new(),
            breaker,
            events,
            clock,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Breaker status for health/metrics endpoints
    pub fn status(&self) -> OrchestratorResult<BreakerStatus> {
        Ok(self.breaker.status()?)
    }

    /// Urgency for `text`, from the primary model when the circuit allows it.
    pub async fn score(&self, text: &str) -> OrchestratorResult<ScoreOutcome> {
        let (admission, transition) = self.breaker.admit()?;
        self.announce(transition)?;

        if admission == Admission::Fallback {
            debug!(endpoint = %self.breaker.endpoint(), "Circuit not closed; using fallback");
            return Ok(self.fallback_outcome(text, None));
        }

        let limit = self.breaker.config().latency_threshold();
        let (verdict, latency) = self.call_primary(text, limit).await;
        let latency_ms = Some(latency.as_millis() as u64);

        match verdict {
            Ok(score) => {
                let transition = self.breaker.record_success(admission)?;
                self.announce(transition)?;
                Ok(ScoreOutcome {
                    urgency_score: score,
                    used_fallback: false,
                    served_by: self.primary.name(),
                    latency_ms,
                })
            }
            Err(e) => {
                warn!(
                    model = %self.primary.name(),
                    error = %e,
                    "Primary urgency model failed; failing over to fallback"
                );
                let transition = self.breaker.record_failure(admission)?;
                self.announce(transition)?;
                Ok(self.fallback_outcome(text, latency_ms))
            }
        }
    }

    /// Call the primary with a hard timeout at the latency bound.
    async fn call_primary(&self, text: &str, limit: Duration) -> (Result<f32, ModelError>, Duration) {
        let limit_ms = limit.as_millis() as u64;
        let started = Instant::now();
        let result = tokio::time::timeout(limit, self.primary.score(text)).await;
        let latency = started.elapsed();

        let verdict = match result {
            Err(_) => Err(ModelError::Timeout { limit_ms }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(score)) if !score.is_finite() || !(0.0..=1.0).contains(&score) => {
                Err(ModelError::InvalidScore(score))
            }
            Ok(Ok(_)) if latency > limit => Err(ModelError::LatencyExceeded {
                latency_ms: latency.as_millis() as u64,
                limit_ms,
            }),
            Ok(Ok(score)) => Ok(score),
        };
        (verdict, latency)
    }

    fn fallback_outcome(&self, text: &str, latency_ms: Option<u64>) -> ScoreOutcome {
        ScoreOutcome {
            urgency_score: self.fallback.score_text(text),
            used_fallback: true,
            served_by: "keyword_fallback".to_string(),
            latency_ms,
        }
    }

    fn announce(&self, transition: Option<Transition>) -> OrchestratorResult<()> {
        if let Some(t) = transition {
            self.events.publish(OrchestratorEvent::CircuitStateChanged {
                endpoint: self.breaker.endpoint().to_string(),
                from: t.from,
                to: t.to,
                timestamp: self.clock.now(),
            })?;
        }
        Ok(())
    }
}
