//! Ticket records flowing through the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for tickets
pub type TicketId = String;

/// Support category assigned by the upstream classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketCategory {
    Billing,
    Technical,
    Legal,
}

impl TicketCategory {
    pub fn all() -> &'static [TicketCategory] {
        &[
            TicketCategory::Billing,
            TicketCategory::Technical,
            TicketCategory::Legal,
        ]
    }

    /// One-hot projection over the `[tech, billing, legal]` skill dimensions.
    pub fn skill_projection(&self) -> [f32; 3] {
        match self {
            TicketCategory::Technical => [1.0, 0.0, 0.0],
            TicketCategory::Billing => [0.0, 1.0, 0.0],
            TicketCategory::Legal => [0.0, 0.0, 1.0],
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketCategory::Billing => write!(f, "Billing"),
            TicketCategory::Technical => write!(f, "Technical"),
            TicketCategory::Legal => write!(f, "Legal"),
        }
    }
}

/// Ticket as handed over by the classifier/embedder, before urgency scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedTicket {
    pub ticket_id: TicketId,
    pub subject: String,
    pub body: String,
    pub category: TicketCategory,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl ClassifiedTicket {
    /// Text fed to the urgency model
    pub fn text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }

    pub fn with_urgency(self, urgency_score: f32) -> Ticket {
        Ticket {
            ticket_id: self.ticket_id,
            subject: self.subject,
            body: self.body,
            category: self.category,
            urgency_score: urgency_score.clamp(0.0, 1.0),
            embedding: self.embedding,
            created_at: self.created_at,
        }
    }
}

/// Fully classified ticket. Immutable apart from assignment linkage, which
/// lives in its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub subject: String,
    pub body: String,
    pub category: TicketCategory,
    /// Urgency in [0, 1]
    pub urgency_score: f32,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}
