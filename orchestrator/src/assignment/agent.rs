//! Agent profiles, skill vectors and assignment records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::StoreError;
use crate::ticket::TicketId;

/// Error type for agent registry and assignment operations
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("Invalid agent profile: {0}")]
    InvalidAgent(String),

    #[error("Agent {agent_id} has {load} active tickets; cannot lower capacity to {max}")]
    CapacityBelowLoad { agent_id: String, load: u32, max: u32 },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for registry operations
pub type AssignmentResult<T> = Result<T, AssignmentError>;

/// Weight per support category, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillVector {
    pub tech: f32,
    pub billing: f32,
    pub legal: f32,
}

impl SkillVector {
    pub fn new(tech: f32, billing: f32, legal: f32) -> Self {
        Self {
            tech,
            billing,
            legal,
        }
    }

    /// `[tech, billing, legal]`, the same order as
    /// [`TicketCategory::skill_projection`](crate::ticket::TicketCategory::skill_projection).
    pub fn as_array(&self) -> [f32; 3] {
        [self.tech, self.billing, self.legal]
    }

    fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("tech", self.tech),
            ("billing", self.billing),
            ("legal", self.legal),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(format!("skill weight {name}={w} outside [0, 1]"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Online => write!(f, "online"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A human support agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: String,
    pub skill_vector: SkillVector,
    pub max_concurrent_tickets: u32,
    /// Only the optimizer (assign) and the queue consumer (release) change this
    #[serde(default)]
    pub current_load: u32,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        display_name: impl Into<String>,
        skill_vector: SkillVector,
        max_concurrent_tickets: u32,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            display_name: display_name.into(),
            skill_vector,
            max_concurrent_tickets,
            current_load: 0,
            status: AgentStatus::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }

    /// Online with at least one free slot
    pub fn is_eligible(&self) -> bool {
        self.is_online() && self.current_load < self.max_concurrent_tickets
    }

    /// `current_load / max_concurrent_tickets`
    pub fn load_ratio(&self) -> f32 {
        if self.max_concurrent_tickets == 0 {
            return 1.0;
        }
        self.current_load as f32 / self.max_concurrent_tickets as f32
    }

    pub fn validate(&self) -> AssignmentResult<()> {
        if self.agent_id.trim().is_empty() {
            return Err(AssignmentError::InvalidAgent("empty agent_id".to_string()));
        }
        if self.max_concurrent_tickets == 0 {
            return Err(AssignmentError::InvalidAgent(format!(
                "{}: max_concurrent_tickets must be at least 1",
                self.agent_id
            )));
        }
        if self.current_load > self.max_concurrent_tickets {
            return Err(AssignmentError::CapacityBelowLoad {
                agent_id: self.agent_id.clone(),
                load: self.current_load,
                max: self.max_concurrent_tickets,
            });
        }
        self.skill_vector
            .validate()
            .map_err(|e| AssignmentError::InvalidAgent(format!("{}: {e}", self.agent_id)))
    }
}

/// Active routing of one ticket to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub ticket_id: TicketId,
    pub agent_id: String,
    pub assigned_at: DateTime<Utc>,
    /// Match score at assignment time
    pub score: f32,
}

/// Starter roster: one specialist per category plus a generalist
pub fn default_roster() -> Vec<Agent> {
    vec![
        Agent::new("tech-1", "Tech Support", SkillVector::new(0.9, 0.05, 0.05), 10),
        Agent::new(
            "billing-1",
            "Billing Support",
            SkillVector::new(0.05, 0.9, 0.05),
            10,
        ),
        Agent::new(
            "legal-1",
            "Legal & Compliance",
            SkillVector::new(0.05, 0.05, 0.9),
            8,
        ),
        Agent::new(
            "generalist-1",
            "General Support",
            SkillVector::new(0.34, 0.33, 0.33),
            10,
        ),
    ]
}
