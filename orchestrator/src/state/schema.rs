//! Key layout for the shared state store
//!
//! Every record type gets its own prefix so listings are prefix scans.

/// Prefix for circuit breaker state (one record per model endpoint)
pub const BREAKER_PREFIX: &str = "cb:";

/// Prefix for dedup sliding-window entries
pub const WINDOW_PREFIX: &str = "dedup:window:";

/// Prefix for master incident records
pub const INCIDENT_PREFIX: &str = "incident:";

/// Durable counter used to mint incident ids
pub const INCIDENT_SEQ: &str = "incident_seq";

/// Index of incidents still open (`open_incident:{id}`)
pub const OPEN_INCIDENT_PREFIX: &str = "open_incident:";

/// Prefix for ticket -> incident membership
pub const TICKET_INCIDENT_PREFIX: &str = "ticket_incident:";

/// Prefix for agent records
pub const AGENT_PREFIX: &str = "agent:";

/// Prefix for active assignments (one per ticket)
pub const ASSIGNMENT_PREFIX: &str = "assignment:";

/// Prefix for queued tickets
pub const QUEUE_PREFIX: &str = "queue:";

/// Prefix for persisted events
pub const EVENT_PREFIX: &str = "evt:";

/// Key constructors
pub mod keys {
    use super::*;

    pub fn breaker(endpoint: &str) -> String {
        format!("{}{}", BREAKER_PREFIX, endpoint)
    }

    pub fn window_entry(ticket_id: &str) -> String {
        format!("{}{}", WINDOW_PREFIX, ticket_id)
    }

    pub fn incident(incident_id: &str) -> String {
        format!("{}{}", INCIDENT_PREFIX, incident_id)
    }

    pub fn open_incident(incident_id: &str) -> String {
        format!("{}{}", OPEN_INCIDENT_PREFIX, incident_id)
    }

    pub fn ticket_incident(ticket_id: &str) -> String {
        format!("{}{}", TICKET_INCIDENT_PREFIX, ticket_id)
    }

    pub fn agent(agent_id: &str) -> String {
        format!("{}{}", AGENT_PREFIX, agent_id)
    }

    pub fn assignment(ticket_id: &str) -> String {
        format!("{}{}", ASSIGNMENT_PREFIX, ticket_id)
    }

    pub fn queued(ticket_id: &str) -> String {
        format!("{}{}", QUEUE_PREFIX, ticket_id)
    }

    /// Create an event key (timestamp-based for ordering)
    pub fn event(timestamp_nanos: i64, event_id: &str) -> String {
        format!("{}{:020}:{}", EVENT_PREFIX, timestamp_nanos, event_id)
    }

    /// Parse event timestamp from key
    pub fn parse_event_timestamp(key: &str) -> Option<i64> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() >= 2 && parts[0] == "evt" {
            parts[1].parse().ok()
        } else {
            None
        }
    }
}
