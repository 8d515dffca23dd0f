//! Agent registry over the shared store
//!
//! Profiles live under `agent:{id}`. `current_load` sits on the same record
//! and is only ever changed through the CAS helpers here, so the capacity
//! check and the increment happen in one atomic step.

use tracing::{debug, info};

use super::agent::{Agent, AgentStatus, AssignmentError, AssignmentResult};
use crate::state::{schema, SharedStateStore};

pub struct AgentRegistry {
    store: SharedStateStore,
}

impl AgentRegistry {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    /// Upsert a profile, keeping the stored `current_load`.
    ///
    /// Rejected if the new capacity is below the load the agent carries.
    pub fn register_agent(&self, agent: Agent) -> AssignmentResult<Agent> {
        agent.validate()?;
        let key = schema::keys::agent(&agent.agent_id);

        let mut rejected_load = None;
        let stored = self.store.update::<Agent, _>(&key, |current| {
            rejected_load = None;
            let mut next = agent.clone();
            if let Some(existing) = current {
                if existing.current_load > next.max_concurrent_tickets {
                    rejected_load = Some(existing.current_load);
                    return None;
                }
                next.current_load = existing.current_load;
            }
            Some(next)
        })?;

        match (stored, rejected_load) {
            (Some(stored), _) => {
                info!(
                    agent_id = %stored.agent_id,
                    tech = stored.skill_vector.tech,
                    billing = stored.skill_vector.billing,
                    legal = stored.skill_vector.legal,
                    max = stored.max_concurrent_tickets,
                    "Agent registered"
                );
                Ok(stored)
            }
            (None, Some(load)) => Err(AssignmentError::CapacityBelowLoad {
                agent_id: agent.agent_id,
                load,
                max: agent.max_concurrent_tickets,
            }),
            (None, None) => Err(AssignmentError::InvalidAgent(agent.agent_id)),
        }
    }

    /// Register the agents that are not known yet; existing ones are left
    /// untouched. Returns how many were added.
    pub fn seed_agents(&self, roster: Vec<Agent>) -> AssignmentResult<usize> {
        let mut seeded = 0;
        for agent in roster {
            agent.validate()?;
            if self
                .store
                .insert_if_absent(&schema::keys::agent(&agent.agent_id), &agent)?
            {
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!(seeded, "Seeded agents (existing agents left unchanged)");
        }
        Ok(seeded)
    }

    pub fn get_agent(&self, agent_id: &str) -> AssignmentResult<Option<Agent>> {
        Ok(self.store.get(&schema::keys::agent(agent_id))?)
    }

    /// All agents ordered by id
    pub fn list_agents(&self, online_only: bool) -> AssignmentResult<Vec<Agent>> {
        Ok(self
            .store
            .scan::<Agent>(schema::AGENT_PREFIX)?
            .into_iter()
            .map(|(_, agent)| agent)
            .filter(|agent| !online_only || agent.is_online())
            .collect())
    }

    pub fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> AssignmentResult<Agent> {
        let updated = self
            .store
            .update::<Agent, _>(&schema::keys::agent(agent_id), |current| {
                let mut next = current?.clone();
                next.status = status;
                Some(next)
            })?;
        match updated {
            Some(agent) => {
                info!(agent_id, status = %status, "Agent status changed");
                Ok(agent)
            }
            None => Err(AssignmentError::UnknownAgent(agent_id.to_string())),
        }
    }

    /// Take one slot if the agent is online and below capacity.
    ///
    /// Returns the agent after the increment, or `None` if it is full,
    /// offline or unknown.
    pub fn try_increment_load(&self, agent_id: &str) -> AssignmentResult<Option<Agent>> {
        Ok(self
            .store
            .update::<Agent, _>(&schema::keys::agent(agent_id), |current| {
                let agent = current?;
                if !agent.is_eligible() {
                    return None;
                }
                let mut next = agent.clone();
                next.current_load += 1;
                Some(next)
            })?)
    }

    /// Give one slot back. Saturates at zero.
    pub fn decrement_load(&self, agent_id: &str) -> AssignmentResult<()> {
        let updated = self
            .store
            .update::<Agent, _>(&schema::keys::agent(agent_id), |current| {
                let agent = current?;
                if agent.current_load == 0 {
                    return None;
                }
                let mut next = agent.clone();
                next.current_load -= 1;
                Some(next)
            })?;
        if updated.is_none() {
            debug!(agent_id, "Load already zero or agent unknown; nothing to release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::agent::{default_roster, SkillVector};
    use crate::state::StateStore;
    use std::sync::Arc;
    use std::thread;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(StateStore::in_memory().shared())
    }

    #[test]
    fn test_register_preserves_load() {
        let reg = registry();
        reg.register_agent(Agent::new("a", "A", SkillVector::new(1.0, 0.0, 0.0), 5))
            .unwrap();
        reg.try_increment_load("a").unwrap().unwrap();
        reg.try_increment_load("a").unwrap().unwrap();

        let updated = reg
            .register_agent(Agent::new("a", "Renamed", SkillVector::new(0.5, 0.5, 0.0), 4))
            .unwrap();
        assert_eq!(updated.current_load, 2);
        assert_eq!(updated.display_name, "Renamed");

        let err = reg
            .register_agent(Agent::new("a", "A", SkillVector::new(1.0, 0.0, 0.0), 1))
            .unwrap_err();
        assert!(matches!(
            err,
            AssignmentError::CapacityBelowLoad { load: 2, max: 1, .. }
        ));
    }

    #[test]
    fn test_seed_only_adds_missing() {
        let reg = registry();
        assert_eq!(reg.seed_agents(default_roster()).unwrap(), 4);
        reg.try_increment_load("tech-1").unwrap();
        assert_eq!(reg.seed_agents(default_roster()).unwrap(), 0);
        assert_eq!(reg.get_agent("tech-1").unwrap().unwrap().current_load, 1);
    }

    #[test]
    fn test_status_and_listing() {
        let reg = registry();
        reg.seed_agents(default_roster()).unwrap();
        reg.set_agent_status("legal-1", AgentStatus::Offline).unwrap();

        let online: Vec<String> = reg
            .list_agents(true)
            .unwrap()
            .into_iter()
            .map(|a| a.agent_id)
            .collect();
        assert_eq!(online, vec!["billing-1", "generalist-1", "tech-1"]);
        assert_eq!(reg.list_agents(false).unwrap().len(), 4);
        assert!(matches!(
            reg.set_agent_status("nobody", AgentStatus::Online),
            Err(AssignmentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_load_is_bounded_under_contention() {
        let reg = Arc::new(registry());
        reg.register_agent(Agent::new("a", "A", SkillVector::new(1.0, 0.0, 0.0), 7))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| reg.try_increment_load("a").unwrap().is_some())
                        .count()
                })
            })
            .collect();
        let taken: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(taken, 7);
        assert_eq!(reg.get_agent("a").unwrap().unwrap().current_load, 7);
    }

    #[test]
    fn test_decrement_saturates() {
        let reg = registry();
        reg.register_agent(Agent::new("a", "A", SkillVector::new(1.0, 0.0, 0.0), 2))
            .unwrap();
        reg.decrement_load("a").unwrap();
        assert_eq!(reg.get_agent("a").unwrap().unwrap().current_load, 0);
    }
}
