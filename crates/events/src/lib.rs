//! crawlgrid event bus and progress reporting.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`GridEvent`]: dispatch and mission lifecycle events.
//! - [`ProgressTally`]: background consumer that counts what happened.

pub mod bus;
pub mod progress;

pub use bus::{EventBus, GridEvent, GridEventKind};
pub use progress::{ProgressSnapshot, ProgressTally};
