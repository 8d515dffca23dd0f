//! Autonomous Orchestrator Library
//!
//! Routing core for support tickets:
//! - Urgency scoring through a circuit breaker with a deterministic fallback
//! - Semantic deduplication folding flash floods into Master Incidents
//! - Capacity-aware skill-based assignment to human agents
//!
//! # Components
//!
//! ## Model Router (`router`)
//! - `ModelRouter::score`: primary urgency model while the circuit is closed,
//!   keyword fallback while open, limited probes while half-open
//!
//! ## Deduplication (`dedup`)
//! - `DedupEngine::process`: normal / linked / created per ticket
//! - `DedupEngine::resolve_incident`: close a Master Incident
//!
//! ## Assignment (`assignment`)
//! - `AssignmentOptimizer::assign`: best online agent with a free slot
//! - `AssignmentOptimizer::release`: give the slot back on dequeue
//!
//! ## Shared state (`state`)
//! All of the above keep their state in one versioned key/value store with
//! compare-and-swap, in memory or in RocksDB (`heavy-state` feature), so any
//! number of workers can share it.
//!
//! # Usage
//!
//! ```ignore
//! use orchestrator::{Orchestrator, StateStore};
//!
//! let store = StateStore::in_memory().shared();
//! let orchestrator = Orchestrator::builder(store, model).build();
//! orchestrator.seed_agents(orchestrator::assignment::default_roster())?;
//! let outcome = orchestrator.process(classified_ticket).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod assignment;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod queue;
pub mod router;
pub mod state;
pub mod ticket;

// Re-export pipeline types
pub use pipeline::{
    AlertError, AlertSink, DequeuedTicket, NoopAlertSink, Orchestrator, OrchestratorBuilder,
    ProcessOutcome,
};

// Re-export error types
pub use error::{OrchestratorError, OrchestratorResult};

// Re-export configuration
pub use config::{
    AlertConfig, BreakerConfig, ConfigError, DedupConfig, EventConfig, OrchestratorConfig,
    RoutingConfig,
};

// Re-export ticket types
pub use ticket::{ClassifiedTicket, Ticket, TicketCategory, TicketId};

// Re-export key state types
pub use state::{KvBackend, SharedStateStore, StateStore, StoreError, StoreResult};

// Re-export key event types
pub use events::{
    EventBus, EventFilter, EventHistory, EventStats, OrchestratorEvent, SharedEventBus,
};

// Re-export model router types
pub use router::{
    BreakerState, BreakerStatus, CircuitBreaker, KeywordUrgencyScorer, ModelError, ModelRouter,
    ScoreOutcome, UrgencyModel,
};

// Re-export dedup types
pub use dedup::{
    cosine_similarity, DedupDecision, DedupEngine, DedupOutcome, IncidentStatus, MasterIncident,
    WindowEntry,
};

// Re-export assignment types
pub use assignment::{
    Agent, AgentStatus, Assignment, AssignmentError, AssignmentOptimizer, SkillVector,
};

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use queue::TicketQueue;
