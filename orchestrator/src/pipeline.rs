//! The orchestration pipeline
//!
//! ```text
//! ClassifiedTicket
//!   -> ModelRouter::score        (primary or fallback)
//!   -> DedupEngine::process      (normal / linked / created)
//!   -> alert decision            (not suppressed and urgency > threshold)
//!   -> TicketQueue::push
//!   -> AssignmentOptimizer::assign
//! ```
//!
//! Each ticket is an independent unit of work; all shared mutation goes
//! through the store's atomic primitives, so any number of `Orchestrator`
//! instances may run against the same store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::{Agent, AgentStatus, Assignment, AssignmentOptimizer};
use crate::clock::{SharedClock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::dedup::{DedupDecision, DedupEngine, DedupOutcome, IncidentStatus, MasterIncident};
use crate::error::OrchestratorResult;
use crate::events::{
    EventBus, EventFilter, EventHistory, EventStats, OrchestratorEvent, SharedEventBus,
};
use crate::queue::TicketQueue;
use crate::router::{BreakerStatus, CircuitBreaker, ModelRouter, UrgencyModel};
use crate::state::SharedStateStore;
use crate::ticket::{ClassifiedTicket, Ticket};

/// Error type for alert delivery
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    #[error("Alert endpoint returned status {0}")]
    Rejected(u16),
}

/// Outbound alerting collaborator (webhooks, pagers, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Individual alert for a high-urgency ticket
    async fn high_urgency(&self, ticket: &Ticket) -> Result<(), AlertError>;

    /// One alert for a whole flash flood
    async fn master_incident(&self, incident: &MasterIncident) -> Result<(), AlertError>;
}

/// Sink that drops every alert
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn high_urgency(&self, _ticket: &Ticket) -> Result<(), AlertError> {
        Ok(())
    }

    async fn master_incident(&self, _incident: &MasterIncident) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Result of running one ticket through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub ticket: Ticket,
    pub used_fallback: bool,
    pub dedup: DedupOutcome,
    /// Whether an individual high-urgency alert was raised
    pub alerted: bool,
    pub assigned_agent: Option<String>,
}

/// A ticket taken off the queue for handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DequeuedTicket {
    pub ticket: Ticket,
    /// The assignment that was cleared, if the ticket had one
    pub released: Option<Assignment>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    store: SharedStateStore,
    model: Arc<dyn UrgencyModel>,
    config: OrchestratorConfig,
    clock: SharedClock,
    events: Option<SharedEventBus>,
    alerts: Arc<dyn AlertSink>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Use an existing bus. By default a bus persisting into the store is created.
    pub fn events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn build(self) -> Orchestrator {
        let events = self
            .events
            .unwrap_or_else(|| EventBus::with_persistence(self.store.clone()).shared());
        let breaker = CircuitBreaker::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.breaker.clone(),
        );

        Orchestrator {
            router: ModelRouter::new(self.model, breaker, events.clone(), self.clock.clone()),
            dedup: DedupEngine::new(
                self.store.clone(),
                events.clone(),
                self.clock.clone(),
                self.config.dedup.clone(),
            ),
            optimizer: AssignmentOptimizer::new(
                self.store.clone(),
                events.clone(),
                self.clock.clone(),
                self.config.routing.clone(),
            ),
            queue: TicketQueue::new(self.store.clone()),
            history: EventHistory::new(self.store.clone()),
            config: self.config,
            events,
            alerts: self.alerts,
            clock: self.clock,
        }
    }
}

/// Ties the model router, dedup engine and assignment optimizer together.
pub struct Orchestrator {
    config: OrchestratorConfig,
    router: ModelRouter,
    dedup: DedupEngine,
    optimizer: AssignmentOptimizer,
    queue: TicketQueue,
    history: EventHistory,
    events: SharedEventBus,
    alerts: Arc<dyn AlertSink>,
    clock: SharedClock,
}

impl Orchestrator {
    pub fn builder(store: SharedStateStore, model: Arc<dyn UrgencyModel>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            model,
            config: OrchestratorConfig::default(),
            clock: Arc::new(SystemClock),
            events: None,
            alerts: Arc::new(NoopAlertSink),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    pub fn optimizer(&self) -> &AssignmentOptimizer {
        &self.optimizer
    }

    pub fn queue(&self) -> &TicketQueue {
        &self.queue
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Run one classified ticket through the pipeline.
    pub async fn process(&self, incoming: ClassifiedTicket) -> OrchestratorResult<ProcessOutcome> {
        let score = self.router.score(&incoming.text()).await?;
        let ticket = incoming.with_urgency(score.urgency_score);
        debug!(
            ticket_id = %ticket.ticket_id,
            urgency = ticket.urgency_score,
            used_fallback = score.used_fallback,
            "Ticket scored"
        );

        let dedup = self.dedup.process(&ticket)?;
        if let DedupDecision::Created { incident_id } = &dedup.decision {
            if let Some(incident) = self.dedup.get_incident(incident_id)? {
                self.deliver_incident(&incident).await;
            }
        }

        let alerted = !dedup.suppress_individual_alert
            && ticket.urgency_score > self.config.alerts.high_urgency_threshold;
        if alerted {
            self.events
                .publish(OrchestratorEvent::HighUrgencyAlertRaised {
                    ticket_id: ticket.ticket_id.clone(),
                    urgency_score: ticket.urgency_score,
                    timestamp: self.clock.now(),
                })?;
            self.deliver_high_urgency(&ticket).await;
        }

        self.queue.push(&ticket)?;
        let assignment = self.optimizer.assign(&ticket)?;

        info!(
            ticket_id = %ticket.ticket_id,
            category = %ticket.category,
            urgency = ticket.urgency_score,
            incident_id = dedup.decision.incident_id().unwrap_or("-"),
            agent_id = assignment.as_ref().map_or("-", |a| a.agent_id.as_str()),
            alerted,
            "Ticket processed"
        );

        Ok(ProcessOutcome {
            ticket,
            used_fallback: score.used_fallback,
            dedup,
            alerted,
            assigned_agent: assignment.map(|a| a.agent_id),
        })
    }

    async fn deliver_incident(&self, incident: &MasterIncident) {
        if let Err(e) = self.alerts.master_incident(incident).await {
            warn!(incident_id = %incident.incident_id, error = %e, "Master incident alert failed");
        }
    }

    async fn deliver_high_urgency(&self, ticket: &Ticket) {
        if let Err(e) = self.alerts.high_urgency(ticket).await {
            warn!(ticket_id = %ticket.ticket_id, error = %e, "High-urgency alert failed");
        }
    }

    /// Pop the most urgent ticket and release its agent slot.
    pub fn dequeue(&self) -> OrchestratorResult<Option<DequeuedTicket>> {
        let Some(ticket) = self.queue.pop_max()? else {
            return Ok(None);
        };
        let released = self.optimizer.release(&ticket.ticket_id)?;
        Ok(Some(DequeuedTicket { ticket, released }))
    }

    // =========================================================================
    // Queries and admin actions for the API layer
    // =========================================================================

    pub fn breaker_status(&self) -> OrchestratorResult<BreakerStatus> {
        self.router.status()
    }

    pub fn resolve_incident(&self, incident_id: &str) -> OrchestratorResult<bool> {
        self.dedup.resolve_incident(incident_id)
    }

    pub fn get_incident(&self, incident_id: &str) -> OrchestratorResult<Option<MasterIncident>> {
        self.dedup.get_incident(incident_id)
    }

    pub fn list_incidents(
        &self,
        status: Option<IncidentStatus>,
        limit: usize,
    ) -> OrchestratorResult<Vec<MasterIncident>> {
        self.dedup.list_incidents(status, limit)
    }

    pub fn register_agent(&self, agent: Agent) -> OrchestratorResult<Agent> {
        Ok(self.optimizer.registry().register_agent(agent)?)
    }

    /// Register the agents not known yet
    pub fn seed_agents(&self, roster: Vec<Agent>) -> OrchestratorResult<usize> {
        Ok(self.optimizer.registry().seed_agents(roster)?)
    }

    pub fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> OrchestratorResult<Agent> {
        Ok(self.optimizer.registry().set_agent_status(agent_id, status)?)
    }

    pub fn get_agent(&self, agent_id: &str) -> OrchestratorResult<Option<Agent>> {
        Ok(self.optimizer.registry().get_agent(agent_id)?)
    }

    pub fn list_agents(&self, online_only: bool) -> OrchestratorResult<Vec<Agent>> {
        Ok(self.optimizer.registry().list_agents(online_only)?)
    }

    pub fn assignment_for_ticket(&self, ticket_id: &str) -> OrchestratorResult<Option<Assignment>> {
        self.optimizer.assignment_for_ticket(ticket_id)
    }

    pub fn list_assignments(&self, limit: usize) -> OrchestratorResult<Vec<Assignment>> {
        self.optimizer.list_assignments(limit)
    }

    /// Most recent persisted events, newest last. Empty when the bus does
    /// not persist.
    pub fn recent_events(&self, limit: usize) -> OrchestratorResult<Vec<OrchestratorEvent>> {
        self.query_events(&EventFilter::new(), limit)
    }

    /// Most recent persisted events matching `filter`, newest last
    pub fn query_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> OrchestratorResult<Vec<OrchestratorEvent>> {
        if !self.events.is_persistent() {
            return Ok(Vec::new());
        }
        Ok(self.history.query(filter, limit)?)
    }

    /// Counts of persisted events from the last `since`
    pub fn event_stats(&self, since: chrono::Duration) -> OrchestratorResult<EventStats> {
        let now = self.clock.now();
        Ok(self.history.get_stats(now - since, now)?)
    }

    /// Delete persisted events older than the configured retention
    pub fn prune_events(&self) -> OrchestratorResult<usize> {
        if !self.events.is_persistent() {
            return Ok(0);
        }
        let cutoff = self.clock.now() - self.config.events.retention();
        Ok(self.history.prune_before(cutoff)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::default_roster;
    use crate::router::model::MockUrgencyModel;
    use crate::state::StateStore;
    use crate::ticket::TicketCategory;
    use chrono::Utc;

    fn model(score: f32) -> Arc<MockUrgencyModel> {
        let mut mock = MockUrgencyModel::new();
        mock.expect_name().return_const("mock".to_string());
        mock.expect_score().returning(move |_| Ok(score));
        Arc::new(mock)
    }

    fn classified(id: &str, embedding: Vec<f32>) -> ClassifiedTicket {
        ClassifiedTicket {
            ticket_id: id.to_string(),
            subject: "Login broken".to_string(),
            body: "cannot sign in".to_string(),
            category: TicketCategory::Technical,
            embedding,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_high_urgency_alerts_and_assigns() {
        let mut sink = MockAlertSink::new();
        sink.expect_high_urgency().times(1).returning(|_| Ok(()));
        sink.expect_master_incident().never();

        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.95))
            .alerts(Arc::new(sink))
            .build();
        orch.seed_agents(default_roster()).unwrap();

        let outcome = orch.process(classified("t-1", vec![1.0, 0.0])).await.unwrap();
        assert!(outcome.alerted);
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.assigned_agent.as_deref(), Some("tech-1"));
        assert_eq!(orch.queue().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_processing() {
        let mut sink = MockAlertSink::new();
        sink.expect_high_urgency()
            .returning(|_| Err(AlertError::Delivery("connection reset".to_string())));

        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.99))
            .alerts(Arc::new(sink))
            .build();
        let outcome = orch.process(classified("t-1", vec![1.0])).await.unwrap();
        assert!(outcome.alerted);
        assert_eq!(outcome.assigned_agent, None);
    }

    #[tokio::test]
    async fn test_low_urgency_is_not_alerted() {
        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.3)).build();
        let outcome = orch.process(classified("t-1", vec![1.0])).await.unwrap();
        assert!(!outcome.alerted);
    }

    #[tokio::test]
    async fn test_dequeue_releases_assignment() {
        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.5)).build();
        orch.seed_agents(default_roster()).unwrap();
        orch.process(classified("t-1", vec![1.0])).await.unwrap();
        assert_eq!(orch.get_agent("tech-1").unwrap().unwrap().current_load, 1);

        let dequeued = orch.dequeue().unwrap().unwrap();
        assert_eq!(dequeued.ticket.ticket_id, "t-1");
        assert_eq!(dequeued.released.unwrap().agent_id, "tech-1");
        assert_eq!(orch.get_agent("tech-1").unwrap().unwrap().current_load, 0);
        assert!(orch.assignment_for_ticket("t-1").unwrap().is_none());
        assert!(orch.dequeue().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_retention_and_queries() {
        let clock = Arc::new(crate::clock::ManualClock::default());
        let mut config = OrchestratorConfig::default();
        config.events.retention_seconds = 3600;
        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.5))
            .config(config)
            .clock(clock.clone())
            .build();
        orch.seed_agents(default_roster()).unwrap();

        orch.process(classified("old", vec![1.0, 0.0])).await.unwrap();
        clock.advance(chrono::Duration::hours(2));
        orch.process(classified("new", vec![0.0, 1.0])).await.unwrap();

        let stats = orch.event_stats(chrono::Duration::minutes(5)).unwrap();
        assert_eq!(stats.assignments, 1);

        let old_only = orch
            .query_events(&EventFilter::new().ticket("old"), 10)
            .unwrap();
        assert!(!old_only.is_empty());
        assert!(old_only.iter().all(|e| e.ticket_id() == Some("old")));

        assert_eq!(orch.prune_events().unwrap(), old_only.len());
        assert!(orch
            .query_events(&EventFilter::new().ticket("old"), 10)
            .unwrap()
            .is_empty());
        assert!(!orch
            .query_events(&EventFilter::new().ticket("new"), 10)
            .unwrap()
            .is_empty());
        assert_eq!(orch.prune_events().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_are_persisted_by_default() {
        let orch = Orchestrator::builder(StateStore::in_memory().shared(), model(0.5)).build();
        orch.seed_agents(default_roster()).unwrap();
        orch.process(classified("t-1", vec![1.0])).await.unwrap();

        let events = orch.recent_events(10).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type() == "ticket_assigned_to_agent"));
    }
}
