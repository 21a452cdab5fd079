//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`GridEvent`]s. It is
//! shared via `Arc<EventBus>` between the engine, the missions, and the
//! composition root.

use chrono::Utc;
use crawlgrid_core::{FetchErrorKind, MissionId, MissionState, SlotId, Target, Timestamp, WorkItemId};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// GridEvent
// ---------------------------------------------------------------------------

/// Something that happened in the dispatch system.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridEventKind {
    /// A work item was assigned to an executor slot.
    ItemDispatched {
        item_id: WorkItemId,
        mission_id: MissionId,
        slot_id: SlotId,
        target: Target,
    },

    /// A work item resolved. `error_kind` is `None` on success.
    ItemResolved {
        item_id: WorkItemId,
        mission_id: MissionId,
        slot_id: Option<SlotId>,
        error_kind: Option<FetchErrorKind>,
    },

    /// A mission moved between lifecycle states.
    MissionTransition {
        mission_id: MissionId,
        from: MissionState,
        to: MissionState,
    },

    /// A mission reached a terminal state.
    MissionCompleted {
        mission_id: MissionId,
        state: MissionState,
        fetched: u64,
        failed: u64,
    },
}

/// A timestamped [`GridEventKind`].
#[derive(Debug, Clone, Serialize)]
pub struct GridEvent {
    #[serde(flatten)]
    pub kind: GridEventKind,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl GridEvent {
    pub fn new(kind: GridEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

impl From<GridEventKind> for GridEvent {
    fn from(kind: GridEventKind) -> Self {
        Self::new(kind)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`GridEvent`].
///
/// # Usage
///
/// ```rust
/// use crawlgrid_core::MissionState;
/// use crawlgrid_events::bus::{EventBus, GridEventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(GridEventKind::MissionTransition {
///     mission_id: 1,
///     from: MissionState::Idle,
///     to: MissionState::Seeding,
/// });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<GridEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: impl Into<GridEvent>) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event.into());
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(mission_id: MissionId) -> GridEventKind {
        GridEventKind::MissionTransition {
            mission_id,
            from: MissionState::Running,
            to: MissionState::Draining,
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(transition(4));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, transition(4));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(transition(1));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.kind, e2.kind);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers; this must not panic.
        bus.publish(transition(9));
    }

    #[test]
    fn event_serializes_flat_with_type_tag() {
        let event = GridEvent::new(GridEventKind::ItemResolved {
            item_id: uuid::Uuid::nil(),
            mission_id: 2,
            slot_id: Some(0),
            error_kind: Some(FetchErrorKind::Timeout),
        });

        let json = serde_json::to_value(&event).expect("serialization should succeed");
        assert_eq!(json["type"], "item_resolved");
        assert_eq!(json["mission_id"], 2);
        assert_eq!(json["error_kind"], "timeout");
        assert!(json["timestamp"].is_string());
    }
}
