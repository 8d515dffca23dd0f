//! Activity events for the orchestrator
//!
//! 1. **Event Types** (`types.rs`): incident, assignment, breaker and alert
//!    events consumed by the API/activity layer.
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    optional persistence to the shared state store.
//! 3. **Event History** (`history.rs`): recent-activity and time-range
//!    queries over persisted events.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │ State store  │
//!                      │  (persist)   │
//!                      └──────────────┘
//! ```

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, EventFilter, SharedEventBus};
pub use history::{EventHistory, EventStats, HistoryError, HistoryResult};
pub use types::{EventId, OrchestratorEvent};
