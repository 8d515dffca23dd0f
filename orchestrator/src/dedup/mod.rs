//! Semantic deduplication
//!
//! Detects flash floods of near-identical tickets inside a sliding window
//! and folds them into a single Master Incident, so one webhook goes out
//! for the whole cluster instead of one per ticket.

pub mod engine;
pub mod incident;
pub mod similarity;
pub mod window;

pub use engine::{DedupDecision, DedupEngine, DedupOutcome};
pub use incident::{IncidentStatus, IncidentStore, MasterIncident};
pub use similarity::cosine_similarity;
pub use window::{SlidingWindow, WindowEntry};
