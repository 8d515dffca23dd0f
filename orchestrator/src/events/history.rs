//! Event history queries over persisted events
//!
//! Backs the activity feed: the API layer reads recent events from here
//! rather than keeping its own in-memory log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::bus::EventFilter;
use super::types::OrchestratorEvent;
use crate::state::{schema, SharedStateStore, StoreError};

/// Error type for history operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Event history manager for replay and querying
pub struct EventHistory {
    store: SharedStateStore,
}

impl EventHistory {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    fn all_with_keys(&self) -> HistoryResult<Vec<(i64, OrchestratorEvent)>> {
        Ok(self
            .store
            .scan::<OrchestratorEvent>(schema::EVENT_PREFIX)?
            .into_iter()
            .filter_map(|(key, event)| {
                schema::keys::parse_event_timestamp(&key).map(|ts| (ts, event))
            })
            .collect())
    }

    /// All events in a time range, oldest first
    pub fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<OrchestratorEvent>> {
        let start_nanos = start.timestamp_nanos_opt().unwrap_or(0);
        let end_nanos = end.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let events: Vec<OrchestratorEvent> = self
            .all_with_keys()?
            .into_iter()
            .filter(|(ts, _)| *ts >= start_nanos && *ts <= end_nanos)
            .map(|(_, event)| event)
            .collect();

        debug!(count = events.len(), "Retrieved events from history");
        Ok(events)
    }

    /// The most recent `limit` events, newest last
    pub fn recent(&self, limit: usize) -> HistoryResult<Vec<OrchestratorEvent>> {
        self.query(&EventFilter::new(), limit)
    }

    /// The most recent `limit` events matching `filter`, newest last
    pub fn query(&self, filter: &EventFilter, limit: usize) -> HistoryResult<Vec<OrchestratorEvent>> {
        let matching: Vec<OrchestratorEvent> = self
            .all_with_keys()?
            .into_iter()
            .map(|(_, event)| event)
            .filter(|event| filter.matches(event))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }

    /// Delete events older than `cutoff`
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> HistoryResult<usize> {
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(0);
        let mut count = 0;
        for (key, version, _) in self
            .store
            .scan_versioned::<serde_json::Value>(schema::EVENT_PREFIX)?
        {
            match schema::keys::parse_event_timestamp(&key) {
                Some(ts) if ts < cutoff_nanos => {
                    if self.store.compare_and_delete(&key, version)? {
                        count += 1;
                    }
                }
                _ => {}
            }
        }
        info!(count, cutoff = %cutoff, "Pruned old events");
        Ok(count)
    }

    /// Aggregate statistics for a time range
    pub fn get_stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> HistoryResult<EventStats> {
        Ok(EventStats::from_events(&self.get_events(start, end)?))
    }
}

/// Aggregate statistics for events
#[derive(Debug, Default, Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: HashMap<String, usize>,
    pub incidents_created: usize,
    pub tickets_linked: usize,
    pub assignments: usize,
    pub circuit_transitions: usize,
}

impl EventStats {
    pub fn from_events(events: &[OrchestratorEvent]) -> Self {
        let mut stats = Self::default();
        for event in events {
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            match event {
                OrchestratorEvent::MasterIncidentCreated { .. } => stats.incidents_created += 1,
                OrchestratorEvent::TicketLinkedToMasterIncident { .. } => {
                    stats.tickets_linked += 1
                }
                OrchestratorEvent::TicketAssignedToAgent { .. } => stats.assignments += 1,
                OrchestratorEvent::CircuitStateChanged { .. } => stats.circuit_transitions += 1,
                _ => {}
            }
        }
        stats
    }
}
