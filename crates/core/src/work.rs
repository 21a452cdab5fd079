//! Records exchanged between missions, the dispatch engine, and executors.

use serde::{Deserialize, Serialize};

use crate::types::{MissionId, SlotId, Target, WorkItemId};

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One unit of submitted work: fetch `target` on behalf of `mission_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique for the lifetime of the engine run.
    pub id: WorkItemId,
    pub target: Target,
    /// Owning mission. Routing key only; the engine never owns the mission.
    pub mission_id: MissionId,
    /// Logical submission order across all missions.
    pub submitted_at: u64,
}

// ---------------------------------------------------------------------------
// Fetch outcome
// ---------------------------------------------------------------------------

/// Opaque fetched content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub body: String,
}

impl Payload {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Why a fetch failed. Data, not a control-flow fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    #[error("fetch timed out")]
    Timeout,

    #[error("executor unavailable")]
    ExecutorUnavailable,

    #[error("target unreachable")]
    TargetUnreachable,

    #[error("malformed target")]
    MalformedTarget,

    /// Accepted but dropped from the backlog by shutdown before assignment.
    #[error("discarded by shutdown")]
    Discarded,
}

impl FetchErrorKind {
    /// Whether a mission-level retry policy may resubmit the target.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ExecutorUnavailable | Self::TargetUnreachable
        )
    }
}

/// Result of running one fetch on an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success { payload: Payload },
    Failed { error_kind: FetchErrorKind },
}

impl From<Result<Payload, FetchErrorKind>> for FetchOutcome {
    fn from(result: Result<Payload, FetchErrorKind>) -> Self {
        match result {
            Ok(payload) => Self::Success { payload },
            Err(error_kind) => Self::Failed { error_kind },
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Outcome of one [`WorkItem`], pushed exactly once to its owning mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub item_id: WorkItemId,
    pub mission_id: MissionId,
    pub target: Target,
    /// Executor slot that ran the fetch; `None` if the item never left the backlog.
    pub slot_id: Option<SlotId>,
    pub outcome: FetchOutcome,
}

impl ExecutionResult {
    /// Build the result for `item` from a fetch outcome.
    pub fn for_item(item: WorkItem, slot_id: Option<SlotId>, outcome: FetchOutcome) -> Self {
        Self {
            item_id: item.id,
            mission_id: item.mission_id,
            target: item.target,
            slot_id,
            outcome,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self.outcome {
            FetchOutcome::Success { .. } => ExecutionStatus::Success,
            FetchOutcome::Failed { .. } => ExecutionStatus::Failed,
        }
    }

    /// Present iff the fetch succeeded.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            FetchOutcome::Success { payload } => Some(payload),
            FetchOutcome::Failed { .. } => None,
        }
    }

    /// Present iff the fetch failed.
    pub fn error_kind(&self) -> Option<FetchErrorKind> {
        match self.outcome {
            FetchOutcome::Success { .. } => None,
            FetchOutcome::Failed { error_kind } => Some(error_kind),
        }
    }
}
