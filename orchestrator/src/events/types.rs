//! Event types published by the orchestrator
//!
//! These events drive the activity feed and are persisted for replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::BreakerState;
use crate::ticket::TicketId;

/// Unique identifier for events
pub type EventId = String;

/// All orchestrator activity events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A flash flood was detected; one event for the whole cluster
    MasterIncidentCreated {
        incident_id: String,
        root_ticket_id: TicketId,
        ticket_ids: Vec<TicketId>,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// A ticket joined an existing open incident
    TicketLinkedToMasterIncident {
        ticket_id: TicketId,
        incident_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An incident was closed by an operator
    MasterIncidentResolved {
        incident_id: String,
        ticket_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A ticket was routed to an agent
    TicketAssignedToAgent {
        ticket_id: TicketId,
        agent_id: String,
        score: f32,
        timestamp: DateTime<Utc>,
    },

    /// A ticket was dequeued and its agent's load released
    TicketReleased {
        ticket_id: TicketId,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The urgency model breaker changed state
    CircuitStateChanged {
        endpoint: String,
        from: BreakerState,
        to: BreakerState,
        timestamp: DateTime<Utc>,
    },

    /// An individual high-urgency alert was raised
    HighUrgencyAlertRaised {
        ticket_id: TicketId,
        urgency_score: f32,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MasterIncidentCreated { timestamp, .. }
            | Self::TicketLinkedToMasterIncident { timestamp, .. }
            | Self::MasterIncidentResolved { timestamp, .. }
            | Self::TicketAssignedToAgent { timestamp, .. }
            | Self::TicketReleased { timestamp, .. }
            | Self::CircuitStateChanged { timestamp, .. }
            | Self::HighUrgencyAlertRaised { timestamp, .. } => *timestamp,
        }
    }

    /// Wire name of the event, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MasterIncidentCreated { .. } => "master_incident_created",
            Self::TicketLinkedToMasterIncident { .. } => "ticket_linked_to_master_incident",
            Self::MasterIncidentResolved { .. } => "master_incident_resolved",
            Self::TicketAssignedToAgent { .. } => "ticket_assigned_to_agent",
            Self::TicketReleased { .. } => "ticket_released",
            Self::CircuitStateChanged { .. } => "circuit_state_changed",
            Self::HighUrgencyAlertRaised { .. } => "high_urgency_alert_raised",
        }
    }

    /// Ticket the event is about, if it concerns a single ticket
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Self::MasterIncidentCreated { root_ticket_id, .. } => Some(root_ticket_id),
            Self::TicketLinkedToMasterIncident { ticket_id, .. }
            | Self::TicketAssignedToAgent { ticket_id, .. }
            | Self::TicketReleased { ticket_id, .. }
            | Self::HighUrgencyAlertRaised { ticket_id, .. } => Some(ticket_id),
            _ => None,
        }
    }

    pub fn incident_id(&self) -> Option<&str> {
        match self {
            Self::MasterIncidentCreated { incident_id, .. }
            | Self::TicketLinkedToMasterIncident { incident_id, .. }
            | Self::MasterIncidentResolved { incident_id, .. } => Some(incident_id),
            _ => None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::TicketAssignedToAgent { agent_id, .. } | Self::TicketReleased { agent_id, .. } => {
                Some(agent_id)
            }
            _ => None,
        }
    }

    /// Generate a new event ID
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tag_matches_event_type() {
        let event = OrchestratorEvent::TicketAssignedToAgent {
            ticket_id: "t-1".to_string(),
            agent_id: "tech-1".to_string(),
            score: 0.99,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());

        let back: OrchestratorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_accessors() {
        let event = OrchestratorEvent::TicketLinkedToMasterIncident {
            ticket_id: "t-9".to_string(),
            incident_id: "INC-000001".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.ticket_id(), Some("t-9"));
        assert_eq!(event.incident_id(), Some("INC-000001"));
        assert_eq!(event.agent_id(), None);
    }
}
