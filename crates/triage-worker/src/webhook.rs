//! Slack-compatible webhook alerts
//!
//! Posts a message per high-urgency ticket and one per Master Incident to
//! `WEBHOOK_URL`. Without a URL every alert is dropped, so the worker runs
//! the same with or without a chat integration.

use std::time::Duration;

use async_trait::async_trait;
use orchestrator::{AlertError, AlertSink, MasterIncident, Ticket};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Environment variable naming the webhook endpoint
pub const WEBHOOK_URL_ENV: &str = "WEBHOOK_URL";

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Message body for an individual high-urgency alert
pub fn high_urgency_payload(ticket: &Ticket) -> Value {
    json!({
        "text": format!(
            "High-urgency ticket (S={:.2}): {}",
            ticket.urgency_score, ticket.ticket_id
        ),
        "blocks": [{
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*Ticket:* `{}`\n*Subject:* {}\n*Category:* {}\n*Urgency score:* {:.2}",
                    ticket.ticket_id, ticket.subject, ticket.category, ticket.urgency_score
                ),
            },
        }],
    })
}

/// Message body for a flash-flood Master Incident
pub fn master_incident_payload(incident: &MasterIncident) -> Value {
    json!({
        "text": format!(
            "Master Incident (flash-flood): {} - {}",
            incident.incident_id, incident.summary
        ),
        "blocks": [{
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*Master Incident:* `{}`\n*Summary:* {}\n*Root ticket:* {}\n*Tickets:* {}",
                    incident.incident_id,
                    incident.summary,
                    incident.root_ticket_id,
                    incident.ticket_ids.len()
                ),
            },
        }],
    })
}

/// [`AlertSink`] posting JSON to a chat webhook
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    url: Option<String>,
    http: reqwest::Client,
}

impl WebhookAlertSink {
    pub fn new(url: Option<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.filter(|u| !u.trim().is_empty()),
            http: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()?,
        })
    }

    /// Sink for `WEBHOOK_URL`; disabled when it is unset
    pub fn from_env() -> Result<Self, reqwest::Error> {
        Self::new(std::env::var(WEBHOOK_URL_ENV).ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn post(&self, payload: Value) -> Result<(), AlertError> {
        let Some(url) = &self.url else {
            debug!("No webhook configured, dropping alert");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AlertError::Rejected(response.status().as_u16()));
        }
        info!(status = %response.status(), "Webhook notification sent");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn high_urgency(&self, ticket: &Ticket) -> Result<(), AlertError> {
        self.post(high_urgency_payload(ticket)).await
    }

    async fn master_incident(&self, incident: &MasterIncident) -> Result<(), AlertError> {
        self.post(master_incident_payload(incident)).await
    }
}
