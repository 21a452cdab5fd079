//! Composition-root pieces of the `crawlgrid-worker` binary, kept in a
//! library so they can be tested.

pub mod config;
pub mod extract;
pub mod missions;

pub use config::WorkerConfig;
pub use extract::LinkExtractor;
pub use missions::{load_missions, MissionSpec};
