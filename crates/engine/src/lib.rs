//! Task dispatch engine and the missions that drive it.
//!
//! - [`DispatchEngine`] owns the executor pool and the pending-submission
//!   backlog, matches work to idle executors, and routes every result back
//!   to its mission. [`EngineHandle`] is the cloneable submission/stop API.
//! - [`Mission`] owns a traversal strategy and a visited-set, and reacts to
//!   pushed results by submitting newly discovered targets.
//! - [`Orchestrator`] is the registration API the composition root uses.

pub mod config;
pub mod dispatcher;
pub mod mission;
pub mod orchestrator;
pub mod pool;
pub mod router;

pub use config::{EngineConfig, FailurePolicy, MissionConfig};
pub use dispatcher::{DispatchEngine, EngineHandle};
pub use mission::{Extraction, Extractor, Mission, MissionPlan, MissionReport, Submitter};
pub use orchestrator::Orchestrator;
pub use pool::{ExecutorPool, SlotState};
pub use router::{Inbox, ResultRouter};
