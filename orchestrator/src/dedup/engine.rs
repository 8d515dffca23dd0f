//! Flash-flood detection and Master Incident folding
//!
//! Per ticket T, in order:
//!
//! 1. prune the window (best-effort) and take a live snapshot
//! 2. `M` = window entries (other than T) with cosine(T, e) > threshold
//! 3. first open incident, newest first, whose root matches T: link
//! 4. otherwise, if `|M| + 1 > min_count`: create an incident for M and T
//! 5. otherwise: normal
//! 6. T always enters the window
//!
//! Members of M predate detection and were alerted on individually at their
//! own arrival; suppression starts with the ticket that triggers creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::incident::{incident_summary, IncidentStatus, IncidentStore, MasterIncident};
use super::similarity::cosine_similarity;
use super::window::{SlidingWindow, WindowEntry};
use crate::clock::SharedClock;
use crate::config::DedupConfig;
use crate::error::OrchestratorResult;
use crate::events::{OrchestratorEvent, SharedEventBus};
use crate::state::SharedStateStore;
use crate::ticket::Ticket;

/// What the dedup pass decided for a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DedupDecision {
    Normal,
    Linked { incident_id: String },
    Created { incident_id: String },
}

impl DedupDecision {
    pub fn incident_id(&self) -> Option<&str> {
        match self {
            DedupDecision::Normal => None,
            DedupDecision::Linked { incident_id } | DedupDecision::Created { incident_id } => {
                Some(incident_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub decision: DedupDecision,
    pub suppress_individual_alert: bool,
}

impl DedupOutcome {
    pub fn normal() -> Self {
        Self {
            decision: DedupDecision::Normal,
            suppress_individual_alert: false,
        }
    }

    pub fn linked(incident_id: impl Into<String>) -> Self {
        Self {
            decision: DedupDecision::Linked {
                incident_id: incident_id.into(),
            },
            suppress_individual_alert: true,
        }
    }

    pub fn created(incident_id: impl Into<String>) -> Self {
        Self {
            decision: DedupDecision::Created {
                incident_id: incident_id.into(),
            },
            suppress_individual_alert: true,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self.decision, DedupDecision::Created { .. })
    }
}

/// Semantic deduplication engine
pub struct DedupEngine {
    config: DedupConfig,
    window: SlidingWindow,
    incidents: IncidentStore,
    events: SharedEventBus,
    clock: SharedClock,
}

impl DedupEngine {
    pub fn new(
        store: SharedStateStore,
        events: SharedEventBus,
        clock: SharedClock,
        config: DedupConfig,
    ) -> Self {
        Self {
            window: SlidingWindow::new(store.clone(), config.window()),
            incidents: IncidentStore::new(store),
            config,
            events,
            clock,
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Evaluate one ticket against the window and open incidents
    pub fn process(&self, ticket: &Ticket) -> OrchestratorResult<DedupOutcome> {
        let now = self.clock.now();

        if let Some(existing) = self.incidents.open_incident_for_ticket(&ticket.ticket_id)? {
            if existing.contains(&ticket.ticket_id) {
                debug!(
                    ticket_id = %ticket.ticket_id,
                    incident_id = %existing.incident_id,
                    "Ticket already belongs to an open incident"
                );
                return Ok(DedupOutcome::linked(existing.incident_id));
            }
        }

        self.window.evict_expired(now)?;
        let similar: Vec<WindowEntry> = self
            .window
            .snapshot(now)?
            .into_iter()
            .filter(|entry| entry.ticket_id != ticket.ticket_id)
            .filter(|entry| self.is_similar(&ticket.embedding, &entry.embedding))
            .collect();

        let outcome = if let Some(incident_id) = self.try_link(ticket, now)? {
            DedupOutcome::linked(incident_id)
        } else if similar.len() + 1 > self.config.min_count {
            self.create_incident(ticket, &similar, now)?
        } else {
            if !similar.is_empty() {
                debug!(
                    ticket_id = %ticket.ticket_id,
                    similar = similar.len(),
                    min_count = self.config.min_count,
                    "Similar tickets below flood size"
                );
            }
            DedupOutcome::normal()
        };

        self.window.insert(&WindowEntry {
            ticket_id: ticket.ticket_id.clone(),
            embedding: ticket.embedding.clone(),
            timestamp: now,
            category: ticket.category,
            urgency_score: ticket.urgency_score,
        })?;

        Ok(outcome)
    }

    fn is_similar(&self, a: &[f32], b: &[f32]) -> bool {
        cosine_similarity(a, b) > self.config.sim_threshold
    }

    /// Link to the newest open incident whose root matches, if any.
    fn try_link(&self, ticket: &Ticket, now: DateTime<Utc>) -> OrchestratorResult<Option<String>> {
        for incident in self.incidents.list_open()? {
            if !self.is_similar(&ticket.embedding, &incident.root_embedding) {
                continue;
            }
            if !self.admit(&ticket.ticket_id, &incident.incident_id)? {
                continue;
            }

            info!(
                ticket_id = %ticket.ticket_id,
                incident_id = %incident.incident_id,
                "Ticket linked to master incident"
            );
            self.events
                .publish(OrchestratorEvent::TicketLinkedToMasterIncident {
                    ticket_id: ticket.ticket_id.clone(),
                    incident_id: incident.incident_id.clone(),
                    timestamp: now,
                })?;
            return Ok(Some(incident.incident_id));
        }
        Ok(None)
    }

    /// Write the incident holding no tickets, then claim and append T and
    /// each member. Claims are only granted against a stored open incident,
    /// so a member can never be held by two incidents at once.
    fn create_incident(
        &self,
        ticket: &Ticket,
        similar: &[WindowEntry],
        now: DateTime<Utc>,
    ) -> OrchestratorResult<DedupOutcome> {
        let incident_id = self.incidents.next_id()?;
        self.incidents.insert(&MasterIncident {
            incident_id: incident_id.clone(),
            root_ticket_id: ticket.ticket_id.clone(),
            root_embedding: ticket.embedding.clone(),
            ticket_ids: Vec::with_capacity(similar.len() + 1),
            summary: incident_summary(&ticket.ticket_id, &ticket.subject),
            status: IncidentStatus::Open,
            created_at: now,
            resolved_at: None,
        })?;

        if !self.admit(&ticket.ticket_id, &incident_id)? {
            warn!(
                ticket_id = %ticket.ticket_id,
                incident_id = %incident_id,
                "Flood detected but ticket is held by another open incident"
            );
            self.incidents.discard_if_empty(&incident_id)?;
            return Ok(match self.incidents.open_incident_for_ticket(&ticket.ticket_id)? {
                Some(holder) => DedupOutcome::linked(holder.incident_id),
                None => DedupOutcome::normal(),
            });
        }
        for entry in similar {
            if !self.admit(&entry.ticket_id, &incident_id)? {
                debug!(
                    ticket_id = %entry.ticket_id,
                    incident_id = %incident_id,
                    "Member left out of new incident"
                );
            }
        }

        let Some(incident) = self.incidents.get(&incident_id)? else {
            return Ok(DedupOutcome::normal());
        };
        info!(
            incident_id = %incident.incident_id,
            root_ticket_id = %incident.root_ticket_id,
            members = incident.ticket_ids.len(),
            "Flash flood detected; master incident created"
        );
        self.events.publish(OrchestratorEvent::MasterIncidentCreated {
            incident_id: incident.incident_id,
            root_ticket_id: incident.root_ticket_id,
            ticket_ids: incident.ticket_ids,
            summary: incident.summary,
            timestamp: now,
        })?;

        Ok(DedupOutcome::created(incident_id))
    }

    /// Claim a ticket for an incident and append it; undo the claim if the
    /// incident closed in between.
    fn admit(&self, ticket_id: &str, incident_id: &str) -> OrchestratorResult<bool> {
        if !self.incidents.claim_ticket(ticket_id, incident_id)? {
            return Ok(false);
        }
        if !self.incidents.append_ticket(incident_id, ticket_id)? {
            self.incidents.release_claim(ticket_id, incident_id)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Close an incident. False if the id is unknown.
    ///
    /// Resolving twice is harmless; only the first call emits an event.
    pub fn resolve_incident(&self, incident_id: &str) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        match self.incidents.resolve(incident_id, now)? {
            None => Ok(false),
            Some((incident, true)) => {
                info!(incident_id, tickets = incident.ticket_ids.len(), "Master incident resolved");
                self.events.publish(OrchestratorEvent::MasterIncidentResolved {
                    incident_id: incident.incident_id,
                    ticket_count: incident.ticket_ids.len(),
                    timestamp: now,
                })?;
                Ok(true)
            }
            Some((_, false)) => Ok(true),
        }
    }

    pub fn get_incident(&self, incident_id: &str) -> OrchestratorResult<Option<MasterIncident>> {
        Ok(self.incidents.get(incident_id)?)
    }

    /// Incidents newest first
    pub fn list_incidents(
        &self,
        status: Option<IncidentStatus>,
        limit: usize,
    ) -> OrchestratorResult<Vec<MasterIncident>> {
        Ok(self.incidents.list(status, limit)?)
    }

    pub fn incident_for_ticket(
        &self,
        ticket_id: &str,
    ) -> OrchestratorResult<Option<MasterIncident>> {
        Ok(self.incidents.incident_for_ticket(ticket_id)?)
    }

    /// Live window entries, oldest first
    pub fn window_snapshot(&self) -> OrchestratorResult<Vec<WindowEntry>> {
        Ok(self.window.snapshot(self.clock.now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::state::StateStore;
    use crate::ticket::TicketCategory;
    use chrono::Duration;
    use std::sync::Arc;

    struct Harness {
        engine: DedupEngine,
        clock: Arc<ManualClock>,
        bus: SharedEventBus,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let bus = EventBus::new().shared();
        let engine = DedupEngine::new(
            StateStore::in_memory().shared(),
            bus.clone(),
            clock.clone(),
            DedupConfig::default(),
        );
        Harness { engine, clock, bus }
    }

    fn ticket(id: &str, embedding: Vec<f32>) -> Ticket {
        Ticket {
            ticket_id: id.to_string(),
            subject: "Login broken".to_string(),
            body: "cannot sign in".to_string(),
            category: TicketCategory::Technical,
            urgency_score: 0.9,
            embedding,
            created_at: Utc::now(),
        }
    }

    fn login(i: usize) -> Ticket {
        ticket(&format!("t-{i:02}"), vec![1.0, 0.01 * i as f32, 0.0])
    }

    fn feed(h: &Harness, range: std::ops::Range<usize>) -> Vec<DedupOutcome> {
        range
            .map(|i| {
                h.clock.advance(Duration::seconds(1));
                h.engine.process(&login(i)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_ten_similar_tickets_stay_normal() {
        let h = harness();
        let outcomes = feed(&h, 0..10);
        assert!(outcomes.iter().all(|o| *o == DedupOutcome::normal()));
        assert!(h.engine.list_incidents(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_eleventh_creates_then_twelfth_links() {
        let h = harness();
        let mut rx = h.bus.subscribe();

        let outcomes = feed(&h, 0..11);
        assert_eq!(outcomes[10], DedupOutcome::created("INC-000001"));
        assert!(outcomes[..10].iter().all(|o| !o.suppress_individual_alert));

        let incident = h.engine.get_incident("INC-000001").unwrap().unwrap();
        assert_eq!(incident.ticket_ids.len(), 11);
        assert_eq!(incident.root_ticket_id, "t-10");
        assert_eq!(incident.ticket_ids.first().map(String::as_str), Some("t-10"));
        for i in 0..11 {
            let holder = h.engine.incident_for_ticket(&format!("t-{i:02}")).unwrap().unwrap();
            assert_eq!(holder.incident_id, "INC-000001");
        }

        let twelfth = feed(&h, 11..12);
        assert_eq!(twelfth[0], DedupOutcome::linked("INC-000001"));
        let incident = h.engine.get_incident("INC-000001").unwrap().unwrap();
        assert_eq!(incident.ticket_ids.len(), 12);

        let mut created = 0;
        let mut linked = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                OrchestratorEvent::MasterIncidentCreated { .. } => created += 1,
                OrchestratorEvent::TicketLinkedToMasterIncident { .. } => linked += 1,
                _ => {}
            }
        }
        assert_eq!((created, linked), (1, 1));
    }

    #[test]
    fn test_expired_entries_do_not_count() {
        let h = harness();
        feed(&h, 0..10);
        h.clock.advance(Duration::seconds(301));
        let outcome = feed(&h, 10..11);
        assert_eq!(outcome[0], DedupOutcome::normal());
    }

    #[test]
    fn test_reprocessing_a_member_is_idempotent() {
        let h = harness();
        feed(&h, 0..11);
        let mut rx = h.bus.subscribe();

        let again = h.engine.process(&login(3)).unwrap();
        assert_eq!(again, DedupOutcome::linked("INC-000001"));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            h.engine.get_incident("INC-000001").unwrap().unwrap().ticket_ids.len(),
            11
        );
    }

    #[test]
    fn test_resolved_incident_is_not_matched() {
        let h = harness();
        feed(&h, 0..11);
        assert!(h.engine.resolve_incident("INC-000001").unwrap());
        assert!(h.engine.resolve_incident("INC-000001").unwrap());
        assert!(!h.engine.resolve_incident("INC-404").unwrap());

        // The window still holds the flood, so the next one starts a new incident.
        let next = feed(&h, 11..12);
        assert_eq!(next[0], DedupOutcome::created("INC-000002"));
        let incident = h.engine.get_incident("INC-000002").unwrap().unwrap();
        assert_eq!(incident.ticket_ids.len(), 12);
    }

    #[test]
    fn test_dissimilar_ticket_is_normal() {
        let h = harness();
        feed(&h, 0..11);
        let other = h.engine.process(&ticket("billing", vec![0.0, 0.0, 1.0])).unwrap();
        assert_eq!(other, DedupOutcome::normal());
    }

    #[test]
    fn test_zero_embedding_still_enters_window() {
        let h = harness();
        let outcome = h.engine.process(&ticket("blank", vec![0.0; 3])).unwrap();
        assert_eq!(outcome, DedupOutcome::normal());
        let snapshot = h.engine.window_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].ticket_id, "blank");
    }
}
