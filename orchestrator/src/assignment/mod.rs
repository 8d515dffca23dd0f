//! Skill-based assignment
//!
//! Keeps the agent roster with capacities and routes each ticket to the
//! best-matching agent that still has a free slot.

pub mod agent;
pub mod optimizer;
pub mod registry;

pub use agent::{
    default_roster, Agent, AgentStatus, Assignment, AssignmentError, AssignmentResult,
    SkillVector,
};
pub use optimizer::{rank_candidates, score_agent, AssignmentOptimizer};
pub use registry::AgentRegistry;
