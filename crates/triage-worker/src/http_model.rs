//! HTTP client for the primary urgency model
//!
//! The inference server takes `{"text": "..."}` and answers
//! `{"urgency_score": 0.87}`. Latency policing is left to the router's
//! circuit breaker; the client timeout here only bounds hung connections.

use std::time::Duration;

use async_trait::async_trait;
use orchestrator::{ModelError, UrgencyModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming the inference endpoint
pub const URGENCY_MODEL_URL_ENV: &str = "URGENCY_MODEL_URL";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    urgency_score: f32,
}

/// Urgency model served over HTTP
#[derive(Debug, Clone)]
pub struct HttpUrgencyModel {
    url: String,
    http: reqwest::Client,
}

impl HttpUrgencyModel {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            http: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    /// Client for `URGENCY_MODEL_URL`, or `None` when it is unset or blank
    pub fn from_env() -> Result<Option<Self>, reqwest::Error> {
        match std::env::var(URGENCY_MODEL_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(Some(Self::new(url.trim())?)),
            _ => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UrgencyModel for HttpUrgencyModel {
    fn name(&self) -> String {
        format!("http:{}", self.url)
    }

    async fn score(&self, text: &str) -> Result<f32, ModelError> {
        let response = self
            .http
            .post(&self.url)
            .json(&ScoreRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        limit_ms: REQUEST_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    ModelError::Unavailable(format!("HTTP request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Unavailable(format!(
                "Model API error ({status}): {body}"
            )));
        }

        let parsed: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Unavailable(format!("Failed to parse response: {e}")))?;

        let score = parsed.urgency_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ModelError::InvalidScore(score));
        }
        debug!(score, "Primary model scored ticket");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    #[tokio::test]
    async fn test_scores_from_server() {
        let (url, request) = serve_once(200, r#"{"urgency_score": 0.87}"#).await;
        let model = HttpUrgencyModel::new(url).unwrap();

        let score = model.score("server down").await.unwrap();
        assert!((score - 0.87).abs() < 1e-6);

        let body: serde_json::Value = serde_json::from_str(&request.await.unwrap()).unwrap();
        assert_eq!(body["text"], "server down");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let (url, _request) = serve_once(503, "overloaded").await;
        let model = HttpUrgencyModel::new(url).unwrap();
        let err = model.score("x").await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_rejected() {
        let (url, _request) = serve_once(200, r#"{"urgency_score": 1.7}"#).await;
        let model = HttpUrgencyModel::new(url).unwrap();
        assert_eq!(
            model.score("x").await.unwrap_err(),
            ModelError::InvalidScore(1.7)
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let (url, _request) = serve_once(200, r#"{"score": 0.5}"#).await;
        let model = HttpUrgencyModel::new(url).unwrap();
        assert!(matches!(
            model.score("x").await.unwrap_err(),
            ModelError::Unavailable(_)
        ));
    }

    #[test]
    fn test_name_includes_url() {
        let model = HttpUrgencyModel::new("http://127.0.0.1:9/score").unwrap();
        assert_eq!(model.name(), "http:http://127.0.0.1:9/score");
        assert_eq!(model.url(), "http://127.0.0.1:9/score");
    }
}
