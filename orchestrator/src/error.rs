//! Crate-level error type for orchestrator operations

use crate::assignment::AssignmentError;
use crate::events::{EventBusError, HistoryError};
use crate::state::StoreError;

/// Errors that escape the orchestration core.
///
/// Model failures never appear here; they are absorbed by the fallback.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event bus error: {0}")]
    Events(#[from] EventBusError),

    #[error("Event history error: {0}")]
    History(#[from] HistoryError),

    #[error("Assignment error: {0}")]
    Assignment(#[from] AssignmentError),
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
