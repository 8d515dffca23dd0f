//! Model Router Module
//!
//! Scores ticket urgency through a circuit breaker:
//!
//! ```text
//! State      | Primary model            | Fallback
//! -----------|--------------------------|---------------------------
//! closed     | every call               | on error / latency breach
//! open       | never                    | every call until cooldown
//! half_open  | up to N probe calls      | calls beyond the budget
//! ```
//!
//! Breaker state lives in the shared store so every worker sees the same
//! circuit.

pub mod circuit_breaker;
pub mod fallback;
pub mod model;
pub mod model_router;

pub use circuit_breaker::{
    Admission, BreakerState, BreakerStatus, CircuitBreaker, CircuitBreakerState, Transition,
};
pub use fallback::KeywordUrgencyScorer;
pub use model::{ModelError, UrgencyModel};
pub use model_router::{ModelRouter, ScoreOutcome};
