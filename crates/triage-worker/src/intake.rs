//! Raw ticket intake
//!
//! Tickets arrive as JSON lines without category or embedding; [`Intake`]
//! adds both so the result can go straight into `Orchestrator::process`.

use chrono::{DateTime, Utc};
use orchestrator::{ClassifiedTicket, TicketCategory};
use serde::{Deserialize, Serialize};

use crate::classifier::CategoryClassifier;
use crate::embedder::HashingEmbedder;

/// Errors reading raw tickets
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Line {line}: invalid ticket JSON: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Line {line}: ticket_id must not be empty")]
    MissingId { line: usize },
}

/// A ticket as submitted by a customer-facing channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingTicket {
    pub ticket_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Overrides the classifier when the channel already knows the category
    #[serde(default)]
    pub category: Option<TicketCategory>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Parse one JSON line; `line` is 1-based and only used in errors
pub fn parse_line(line: usize, raw: &str) -> Result<IncomingTicket, IntakeError> {
    let ticket: IncomingTicket =
        serde_json::from_str(raw).map_err(|source| IntakeError::Parse { line, source })?;
    if ticket.ticket_id.trim().is_empty() {
        return Err(IntakeError::MissingId { line });
    }
    Ok(ticket)
}

/// Classifier plus embedder
#[derive(Debug, Clone, Default)]
pub struct Intake {
    classifier: CategoryClassifier,
    embedder: HashingEmbedder,
}

impl Intake {
    pub fn new(classifier: CategoryClassifier, embedder: HashingEmbedder) -> Self {
        Self {
            classifier,
            embedder,
        }
    }

    pub fn prepare(&self, incoming: IncomingTicket) -> ClassifiedTicket {
        let category = incoming
            .category
            .unwrap_or_else(|| self.classifier.classify(&incoming.subject, &incoming.body));
        let embedding = self.embedder.embed_ticket(&incoming.subject, &incoming.body);
        ClassifiedTicket {
            ticket_id: incoming.ticket_id,
            subject: incoming.subject,
            body: incoming.body,
            category,
            embedding,
            created_at: incoming.created_at.unwrap_or_else(Utc::now),
        }
    }
}
