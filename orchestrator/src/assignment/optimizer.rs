//! Capacity-aware skill-based assignment
//!
//! ```text
//! score(agent) = cosine(one_hot(category), agent.skills)
//!              - load_penalty_factor * current_load / max_concurrent_tickets
//! ```
//!
//! Highest score wins; exact ties go to the smallest `agent_id`.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use super::agent::{Agent, Assignment};
use super::registry::AgentRegistry;
use crate::clock::SharedClock;
use crate::config::RoutingConfig;
use crate::dedup::cosine_similarity;
use crate::error::OrchestratorResult;
use crate::events::{OrchestratorEvent, SharedEventBus};
use crate::state::{schema, SharedStateStore};
use crate::ticket::{Ticket, TicketCategory};

/// Match score of `agent` for a ticket of `category`
pub fn score_agent(category: TicketCategory, agent: &Agent, load_penalty_factor: f32) -> f32 {
    let skill = cosine_similarity(&category.skill_projection(), &agent.skill_vector.as_array());
    skill - load_penalty_factor * agent.load_ratio()
}

/// Eligible agents with their scores, best first
pub fn rank_candidates(
    category: TicketCategory,
    agents: Vec<Agent>,
    load_penalty_factor: f32,
) -> Vec<(Agent, f32)> {
    let mut ranked: Vec<(Agent, f32)> = agents
        .into_iter()
        .filter(Agent::is_eligible)
        .map(|agent| {
            let score = score_agent(category, &agent, load_penalty_factor);
            (agent, score)
        })
        .collect();
    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    ranked
}

pub struct AssignmentOptimizer {
    registry: AgentRegistry,
    store: SharedStateStore,
    events: SharedEventBus,
    clock: SharedClock,
    config: RoutingConfig,
}

impl AssignmentOptimizer {
    pub fn new(
        store: SharedStateStore,
        events: SharedEventBus,
        clock: SharedClock,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry: AgentRegistry::new(store.clone()),
            store,
            events,
            clock,
            config,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Assign a ticket to the best eligible agent.
    ///
    /// `None` means nobody is eligible; the ticket stays unassigned. A ticket
    /// that already has an assignment gets it back unchanged.
    pub fn assign(&self, ticket: &Ticket) -> OrchestratorResult<Option<Assignment>> {
        if let Some(existing) = self.assignment_for_ticket(&ticket.ticket_id)? {
            debug!(
                ticket_id = %ticket.ticket_id,
                agent_id = %existing.agent_id,
                "Ticket already assigned"
            );
            return Ok(Some(existing));
        }

        let candidates = rank_candidates(
            ticket.category,
            self.registry.list_agents(true)?,
            self.config.load_penalty_factor,
        );
        if candidates.is_empty() {
            info!(ticket_id = %ticket.ticket_id, "No eligible agent; ticket left unassigned");
            return Ok(None);
        }

        for (agent, score) in candidates {
            // Filled up or went offline since the listing
            if self.registry.try_increment_load(&agent.agent_id)?.is_none() {
                debug!(agent_id = %agent.agent_id, "Candidate no longer eligible");
                continue;
            }

            let assignment = Assignment {
                ticket_id: ticket.ticket_id.clone(),
                agent_id: agent.agent_id.clone(),
                assigned_at: self.clock.now(),
                score,
            };
            let key = schema::keys::assignment(&ticket.ticket_id);
            if !self.store.insert_if_absent(&key, &assignment)? {
                // Another worker assigned this ticket first
                self.registry.decrement_load(&agent.agent_id)?;
                debug!(ticket_id = %ticket.ticket_id, "Lost assignment race; slot returned");
                return self.assignment_for_ticket(&ticket.ticket_id);
            }

            info!(
                ticket_id = %assignment.ticket_id,
                agent_id = %assignment.agent_id,
                score = assignment.score,
                "Ticket assigned"
            );
            self.events.publish(OrchestratorEvent::TicketAssignedToAgent {
                ticket_id: assignment.ticket_id.clone(),
                agent_id: assignment.agent_id.clone(),
                score: assignment.score,
                timestamp: assignment.assigned_at,
            })?;
            return Ok(Some(assignment));
        }

        warn!(ticket_id = %ticket.ticket_id, "All candidates filled up concurrently");
        Ok(None)
    }

    /// Clear a ticket's assignment and give the slot back.
    ///
    /// The delete is a compare-and-delete, so of two concurrent releases
    /// only one decrements the load.
    pub fn release(&self, ticket_id: &str) -> OrchestratorResult<Option<Assignment>> {
        let key = schema::keys::assignment(ticket_id);
        let Some((version, assignment)) = self.store.get_versioned::<Assignment>(&key)? else {
            debug!(ticket_id, "No assignment to release");
            return Ok(None);
        };
        if !self.store.compare_and_delete(&key, version)? {
            debug!(ticket_id, "Assignment released concurrently");
            return Ok(None);
        }

        self.registry.decrement_load(&assignment.agent_id)?;
        info!(ticket_id, agent_id = %assignment.agent_id, "Assignment released");
        self.events.publish(OrchestratorEvent::TicketReleased {
            ticket_id: assignment.ticket_id.clone(),
            agent_id: assignment.agent_id.clone(),
            timestamp: self.clock.now(),
        })?;
        Ok(Some(assignment))
    }

    pub fn assignment_for_ticket(&self, ticket_id: &str) -> OrchestratorResult<Option<Assignment>> {
        Ok(self.store.get(&schema::keys::assignment(ticket_id))?)
    }

    pub fn assignments_for_agent(&self, agent_id: &str) -> OrchestratorResult<Vec<Assignment>> {
        Ok(self
            .all_assignments()?
            .into_iter()
            .filter(|a| a.agent_id == agent_id)
            .collect())
    }

    /// Active assignments, newest first
    pub fn list_assignments(&self, limit: usize) -> OrchestratorResult<Vec<Assignment>> {
        let mut all = self.all_assignments()?;
        all.sort_by(|a, b| {
            b.assigned_at
                .cmp(&a.assigned_at)
                .then_with(|| a.ticket_id.cmp(&b.ticket_id))
        });
        all.truncate(limit);
        Ok(all)
    }

    fn all_assignments(&self) -> OrchestratorResult<Vec<Assignment>> {
        Ok(self
            .store
            .scan::<Assignment>(schema::ASSIGNMENT_PREFIX)?
            .into_iter()
            .map(|(_, a)| a)
            .collect())
    }
}
