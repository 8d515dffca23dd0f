//! Event bus for orchestrator activity
//!
//! Provides pub/sub messaging using Tokio broadcast channels with
//! optional persistence to the shared state store for replay.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::OrchestratorEvent;
use crate::state::{schema, SharedStateStore};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Failed to persist event: {0}")]
    PersistFailed(String),
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels and optional persistence
pub struct EventBus {
    /// Broadcast sender for publishing events
    sender: broadcast::Sender<OrchestratorEvent>,

    /// Optional state store for event persistence
    store: Option<SharedStateStore>,
}

impl EventBus {
    /// Create a new event bus without persistence
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            store: None,
        }
    }

    /// Create an event bus with persistence enabled
    pub fn with_persistence(store: SharedStateStore) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            store: Some(store),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Whether published events are written to the store
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: OrchestratorEvent) -> EventBusResult<()> {
        let event_type = event.event_type();

        if let Some(store) = &self.store {
            let event_id = OrchestratorEvent::new_id();
            let timestamp_nanos = event.timestamp().timestamp_nanos_opt().unwrap_or(0);
            let key = schema::keys::event(timestamp_nanos, &event_id);

            if let Err(e) = store.put(&key, &event) {
                warn!(event_type, "Failed to persist event: {}", e);
                return Err(EventBusError::PersistFailed(e.to_string()));
            }
            debug!(event_type, event_id, "Event persisted");
        }

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for history queries
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub ticket_id: Option<String>,
    pub incident_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(mut self, ticket_id: &str) -> Self {
        self.ticket_id = Some(ticket_id.to_string());
        self
    }

    pub fn incident(mut self, incident_id: &str) -> Self {
        self.incident_id = Some(incident_id.to_string());
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    ///
    /// An id filter rejects events that carry no such id at all.
    pub fn matches(&self, event: &OrchestratorEvent) -> bool {
        if let Some(ref tid) = self.ticket_id {
            if event.ticket_id() != Some(tid.as_str()) {
                return false;
            }
        }
        if let Some(ref iid) = self.incident_id {
            if event.incident_id() != Some(iid.as_str()) {
                return false;
            }
        }
        if let Some(ref aid) = self.agent_id {
            if event.agent_id() != Some(aid.as_str()) {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}
