use std::time::Duration;

use crate::mission_state::MissionState;

/// Contract-level failures surfaced to the immediate caller.
///
/// Fetch failures are not represented here; they travel as
/// [`FetchErrorKind`](crate::work::FetchErrorKind) inside an
/// [`ExecutionResult`](crate::work::ExecutionResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Traversal strategy has no pending targets")]
    EmptyStrategy,

    #[error("Dispatch engine is stopped and no longer accepts submissions")]
    EngineStopped,

    #[error("Backlog is full: {limit} submissions already pending")]
    Backpressure { limit: usize },

    #[error("In-flight work did not drain within {0:?}")]
    DrainTimeout(Duration),

    #[error("Invalid mission transition: {from} -> {to}")]
    InvalidTransition { from: MissionState, to: MissionState },
}
