//! Core types for the crawlgrid dispatch system.
//!
//! This crate has zero internal dependencies and performs no I/O. It holds
//! the identifiers and records exchanged between missions and the dispatch
//! engine, the traversal strategies missions plug in, the mission state
//! machine, and the [`Logger`](logging::Logger) interface injected into
//! every component.

pub mod error;
pub mod logging;
pub mod mission_state;
pub mod strategy;
pub mod types;
pub mod work;

pub use error::CoreError;
pub use logging::{LogLevel, Logger, NullLogger, TracingLogger};
pub use mission_state::MissionState;
pub use strategy::{BreadthFirst, DepthFirst, PriorityOrder, StrategyKind, TraversalStrategy};
pub use types::{MissionId, SlotId, Target, Timestamp, WorkItemId};
pub use work::{ExecutionResult, ExecutionStatus, FetchErrorKind, FetchOutcome, Payload, WorkItem};
