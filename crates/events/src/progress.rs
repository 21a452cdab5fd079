//! Progress tally over the event stream.
//!
//! [`ProgressTally`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and counts dispatches, resolutions, and mission
//! completions. It runs as a background task and returns its totals when
//! the bus is dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::bus::{GridEvent, GridEventKind};

/// Totals observed on the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub missions_completed: u64,
    /// Events missed because the tally fell behind the channel.
    pub lagged: u64,
}

impl ProgressSnapshot {
    pub fn record(&mut self, event: &GridEvent) {
        match &event.kind {
            GridEventKind::ItemDispatched { .. } => self.dispatched += 1,
            GridEventKind::ItemResolved { error_kind: None, .. } => self.succeeded += 1,
            GridEventKind::ItemResolved { error_kind: Some(_), .. } => self.failed += 1,
            GridEventKind::MissionCompleted { .. } => self.missions_completed += 1,
            GridEventKind::MissionTransition { .. } => {}
        }
    }
}

/// Background service that tallies grid events.
pub struct ProgressTally;

impl ProgressTally {
    /// Run the tally loop until the channel is closed (i.e. the
    /// [`EventBus`](crate::bus::EventBus) is dropped).
    pub async fn run(mut receiver: broadcast::Receiver<GridEvent>) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot::default();
        loop {
            match receiver.recv().await {
                Ok(event) => snapshot.record(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Progress tally lagged, some events were not counted");
                    snapshot.lagged += n;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, progress tally finishing");
                    break;
                }
            }
        }
        snapshot
    }
}
