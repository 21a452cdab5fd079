//! Per-mission result inboxes.
//!
//! The engine routes each [`ExecutionResult`] to its mission through an
//! unbounded channel. It holds only the sending half, so a mission that
//! goes away simply stops receiving; the engine never owns its lifecycle.

use std::collections::HashMap;

use crawlgrid_core::{ExecutionResult, MissionId};
use tokio::sync::{mpsc, RwLock};

/// Receiving half handed to a mission.
pub type Inbox = mpsc::UnboundedReceiver<ExecutionResult>;

type ResultSender = mpsc::UnboundedSender<ExecutionResult>;

/// Maps mission ids to their inboxes.
///
/// Thread-safe via interior `RwLock`; shared via `Arc` between the
/// dispatch loop and in-flight fetch tasks.
#[derive(Default)]
pub struct ResultRouter {
    inboxes: RwLock<HashMap<MissionId, ResultSender>>,
}

impl ResultRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mission_id`, replacing any previous inbox for it.
    pub async fn attach(&self, mission_id: MissionId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().await.insert(mission_id, tx);
        rx
    }

    pub async fn detach(&self, mission_id: MissionId) {
        self.inboxes.write().await.remove(&mission_id);
    }

    /// Push `result` to its mission's inbox.
    ///
    /// Returns `false` if the mission is unknown or its inbox was dropped.
    pub async fn deliver(&self, result: ExecutionResult) -> bool {
        let inboxes = self.inboxes.read().await;
        match inboxes.get(&result.mission_id) {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    pub async fn mission_count(&self) -> usize {
        self.inboxes.read().await.len()
    }
}
