//! Fixed pool of executor slots.
//!
//! [`ExecutorPool`] is owned and mutated exclusively by the dispatch loop.
//! Each slot runs at most one work item at a time: `assign` moves a slot
//! from `Idle` to `Busy`, `release` moves it back.

use std::sync::Arc;

use crawlgrid_core::{SlotId, WorkItemId};
use crawlgrid_executor::RemoteExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    /// Running the given work item.
    Busy(WorkItemId),
}

/// Internal bookkeeping for a single executor.
struct Slot {
    executor: Arc<dyn RemoteExecutor>,
    state: SlotState,
}

pub struct ExecutorPool {
    slots: Vec<Slot>,
}

impl ExecutorPool {
    /// Slot ids follow the order of `executors` (`0..N`).
    pub fn new(executors: Vec<Arc<dyn RemoteExecutor>>) -> Self {
        let slots = executors
            .into_iter()
            .map(|executor| Slot {
                executor,
                state: SlotState::Idle,
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, slot_id: SlotId) -> Option<SlotState> {
        self.slots.get(slot_id).map(|slot| slot.state)
    }

    /// Lowest idle slot id, so assignment order is reproducible.
    pub fn first_idle(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.state == SlotState::Idle)
    }

    pub fn idle_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Idle)
            .count()
    }

    pub fn busy_count(&self) -> usize {
        self.len() - self.idle_count()
    }

    /// Mark `slot_id` busy with `item_id` and hand back its executor.
    ///
    /// Returns `None` if the slot does not exist or is already busy.
    pub fn assign(
        &mut self,
        slot_id: SlotId,
        item_id: WorkItemId,
    ) -> Option<Arc<dyn RemoteExecutor>> {
        let slot = self.slots.get_mut(slot_id)?;
        if slot.state != SlotState::Idle {
            return None;
        }
        slot.state = SlotState::Busy(item_id);
        Some(Arc::clone(&slot.executor))
    }

    /// Mark `slot_id` idle, returning the item it was running.
    pub fn release(&mut self, slot_id: SlotId) -> Option<WorkItemId> {
        let slot = self.slots.get_mut(slot_id)?;
        match std::mem::replace(&mut slot.state, SlotState::Idle) {
            SlotState::Busy(item_id) => Some(item_id),
            SlotState::Idle => None,
        }
    }
}
