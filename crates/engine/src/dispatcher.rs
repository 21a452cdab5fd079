//! Task dispatch engine.
//!
//! [`DispatchEngine`] is a single long-lived Tokio task that owns the
//! executor pool and the pending-submission backlog. Missions talk to it
//! only through [`EngineHandle`], which sends commands over a channel, so
//! no state is shared between the loop and its callers beyond a few
//! atomics.
//!
//! Each assigned fetch runs in its own task and reports back on a
//! completion channel; the loop then frees the slot, publishes a
//! `ItemResolved` event, and routes the result to the owning mission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawlgrid_core::{
    CoreError, ExecutionResult, FetchErrorKind, FetchOutcome, Logger, MissionId, SlotId, Target,
    WorkItem, WorkItemId,
};
use crawlgrid_events::{EventBus, GridEventKind};
use crawlgrid_executor::RemoteExecutor;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::pool::ExecutorPool;
use crate::router::{Inbox, ResultRouter};

const COMPONENT: &str = "dispatcher";

enum EngineCommand {
    Submit(WorkItem),
    Stop {
        drain: bool,
        ack: oneshot::Sender<()>,
    },
}

/// A fetch that finished on `slot_id`.
struct Completion {
    slot_id: SlotId,
    item: WorkItem,
    outcome: FetchOutcome,
}

/// State visible to both the loop and every handle.
struct Shared {
    stopping: AtomicBool,
    sequence: AtomicU64,
    /// Accepted submissions not yet assigned or discarded.
    pending: AtomicUsize,
    max_backlog: Option<usize>,
    stopped: CancellationToken,
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Cloneable submission and shutdown API for a [`DispatchEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    shared: Arc<Shared>,
    router: Arc<ResultRouter>,
    drain_timeout: Duration,
}

impl EngineHandle {
    /// Enqueue `target` for `mission_id`. Never blocks.
    ///
    /// The item is accepted once this returns `Ok`; its result will be
    /// delivered to the mission's inbox exactly once, even if shutdown
    /// discards it before it reaches an executor.
    pub fn submit(&self, mission_id: MissionId, target: Target) -> Result<WorkItemId, CoreError> {
        if self.shared.stopping.load(Ordering::Acquire) {
            return Err(CoreError::EngineStopped);
        }

        match self.shared.max_backlog {
            Some(limit) => {
                self.shared
                    .pending
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < limit).then_some(n + 1)
                    })
                    .map_err(|_| CoreError::Backpressure { limit })?;
            }
            None => {
                self.shared.pending.fetch_add(1, Ordering::AcqRel);
            }
        }

        let item = WorkItem {
            id: Uuid::now_v7(),
            target,
            mission_id,
            submitted_at: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let item_id = item.id;

        if self.commands.send(EngineCommand::Submit(item)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::EngineStopped);
        }
        Ok(item_id)
    }

    /// Begin shutdown. Further submissions fail with `EngineStopped` and
    /// queued-but-unassigned items resolve as `Discarded`.
    ///
    /// With `drain = true`, waits until every in-flight fetch has resolved,
    /// failing with `DrainTimeout` after the configured deadline. With
    /// `drain = false`, returns immediately; in-flight results that still
    /// arrive are delivered.
    pub async fn stop(&self, drain: bool) -> Result<(), CoreError> {
        self.shared.stopping.store(true, Ordering::Release);

        let (ack, drained) = oneshot::channel();
        if self
            .commands
            .send(EngineCommand::Stop { drain, ack })
            .is_err()
        {
            // The loop has already exited.
            return Ok(());
        }
        if !drain {
            return Ok(());
        }

        match tokio::time::timeout(self.drain_timeout, drained).await {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::DrainTimeout(self.drain_timeout)),
        }
    }

    /// Register `mission_id` and return the inbox its results arrive on.
    pub async fn attach(&self, mission_id: MissionId) -> Inbox {
        self.router.attach(mission_id).await
    }

    pub async fn detach(&self, mission_id: MissionId) {
        self.router.detach(mission_id).await;
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Submissions accepted but not yet assigned to an executor.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Resolves once the dispatch loop has exited.
    pub async fn stopped(&self) {
        self.shared.stopped.cancelled().await;
    }
}

// ---------------------------------------------------------------------------
// DispatchEngine
// ---------------------------------------------------------------------------

/// The dispatch loop and everything it exclusively owns.
pub struct DispatchEngine {
    pool: ExecutorPool,
    backlog: VecDeque<WorkItem>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    commands_open: bool,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    shared: Arc<Shared>,
    router: Arc<ResultRouter>,
    fetch_timeout: Duration,
    logger: Arc<dyn Logger>,
    events: Arc<EventBus>,
    /// No further assignments; set when a stop is processed.
    halted: bool,
    drain_waiters: Vec<oneshot::Sender<()>>,
    finished: bool,
}

impl DispatchEngine {
    /// Build an engine over a fixed set of executors. Slot ids follow the
    /// order of `executors`.
    pub fn new(
        executors: Vec<Arc<dyn RemoteExecutor>>,
        config: EngineConfig,
        logger: Arc<dyn Logger>,
        events: Arc<EventBus>,
    ) -> (Self, EngineHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            stopping: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            max_backlog: config.max_backlog,
            stopped: CancellationToken::new(),
        });
        let router = Arc::new(ResultRouter::new());

        let handle = EngineHandle {
            commands: commands_tx,
            shared: Arc::clone(&shared),
            router: Arc::clone(&router),
            drain_timeout: config.drain_timeout,
        };

        let engine = Self {
            pool: ExecutorPool::new(executors),
            backlog: VecDeque::new(),
            commands,
            commands_open: true,
            completions_tx,
            completions,
            shared,
            router,
            fetch_timeout: config.fetch_timeout,
            logger,
            events,
            halted: false,
            drain_waiters: Vec::new(),
            finished: false,
        };
        (engine, handle)
    }

    /// Run the dispatch loop until stopped.
    ///
    /// Dropping every [`EngineHandle`] counts as a draining stop.
    pub async fn run(mut self) {
        self.logger.info(
            COMPONENT,
            &format!("Dispatch engine started with {} executor(s)", self.pool.len()),
        );

        while !self.finished {
            tokio::select! {
                biased;

                Some(done) = self.completions.recv() => self.complete(done).await,

                command = self.commands.recv(), if self.commands_open => match command {
                    Some(EngineCommand::Submit(item)) => self.enqueue(item).await,
                    Some(EngineCommand::Stop { drain, ack }) => {
                        self.begin_stop(drain, Some(ack)).await;
                    }
                    None => {
                        self.commands_open = false;
                        self.begin_stop(true, None).await;
                    }
                },

                else => break,
            }

            self.assign_idle_slots();
        }

        // Anything that slipped into the channel after the stop was
        // processed still resolves exactly once.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Submit(item) => self.discard(item).await,
                EngineCommand::Stop { ack, .. } => {
                    let _ = ack.send(());
                }
            }
        }
        // Fetches finishing from here on deliver through the router.
        self.completions.close();
        while let Ok(done) = self.completions.try_recv() {
            self.complete(done).await;
        }

        self.shared.stopped.cancel();
        self.logger.info(
            COMPONENT,
            &format!(
                "Dispatch engine stopped ({} fetch(es) abandoned)",
                self.pool.busy_count()
            ),
        );
    }

    async fn enqueue(&mut self, item: WorkItem) {
        if self.halted {
            self.discard(item).await;
        } else {
            self.backlog.push_back(item);
        }
    }

    /// Oldest pending submission goes to the lowest idle slot.
    fn assign_idle_slots(&mut self) {
        if self.halted || self.shared.stopping.load(Ordering::Acquire) {
            return;
        }

        while let Some(slot_id) = self.pool.first_idle() {
            let Some(item) = self.backlog.pop_front() else {
                break;
            };
            let Some(executor) = self.pool.assign(slot_id, item.id) else {
                self.backlog.push_front(item);
                break;
            };
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);

            self.logger.debug(
                COMPONENT,
                &format!(
                    "Assigned {} (mission {}) to slot {slot_id}",
                    item.target, item.mission_id
                ),
            );
            self.events.publish(GridEventKind::ItemDispatched {
                item_id: item.id,
                mission_id: item.mission_id,
                slot_id,
                target: item.target.clone(),
            });

            self.spawn_fetch(slot_id, executor, item);
        }
    }

    fn spawn_fetch(&self, slot_id: SlotId, executor: Arc<dyn RemoteExecutor>, item: WorkItem) {
        let completions = self.completions_tx.clone();
        let router = Arc::clone(&self.router);
        let events = Arc::clone(&self.events);
        let fetch_timeout = self.fetch_timeout;

        tokio::spawn(async move {
            let outcome = run_fetch(executor, item.target.clone(), fetch_timeout).await;
            let completion = Completion {
                slot_id,
                item,
                outcome,
            };

            // After an abandoning stop the loop is gone; deliver directly.
            if let Err(mpsc::error::SendError(done)) = completions.send(completion) {
                let result = ExecutionResult::for_item(done.item, Some(done.slot_id), done.outcome);
                events.publish(resolved_event(&result));
                router.deliver(result).await;
            }
        });
    }

    async fn complete(&mut self, done: Completion) {
        self.pool.release(done.slot_id);

        let result = ExecutionResult::for_item(done.item, Some(done.slot_id), done.outcome);
        if let Some(kind) = result.error_kind() {
            self.logger.warn(
                COMPONENT,
                &format!(
                    "Fetch of {} on slot {} failed: {kind}",
                    result.target, done.slot_id
                ),
            );
        }
        self.resolve(result).await;

        if self.halted {
            self.check_drained();
        }
    }

    /// Resolve an item that never reached an executor.
    async fn discard(&mut self, item: WorkItem) {
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
        let result = ExecutionResult::for_item(
            item,
            None,
            FetchOutcome::Failed {
                error_kind: FetchErrorKind::Discarded,
            },
        );
        self.resolve(result).await;
    }

    async fn resolve(&self, result: ExecutionResult) {
        self.events.publish(resolved_event(&result));

        let mission_id = result.mission_id;
        if !self.router.deliver(result).await {
            self.logger.debug(
                COMPONENT,
                &format!("Dropped result for detached mission {mission_id}"),
            );
        }
    }

    async fn begin_stop(&mut self, drain: bool, ack: Option<oneshot::Sender<()>>) {
        self.shared.stopping.store(true, Ordering::Release);
        if !self.halted {
            self.halted = true;
            self.logger.info(
                COMPONENT,
                &format!(
                    "Stopping (drain = {drain}): {} in flight, {} queued item(s) discarded",
                    self.pool.busy_count(),
                    self.backlog.len()
                ),
            );
        }

        while let Some(item) = self.backlog.pop_front() {
            self.discard(item).await;
        }

        if drain {
            self.drain_waiters.extend(ack);
            self.check_drained();
        } else {
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
            self.finished = true;
        }
    }

    fn check_drained(&mut self) {
        if self.pool.busy_count() > 0 {
            return;
        }
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
        self.finished = true;
    }
}

/// Run one fetch in its own task so a panicking executor cannot take the
/// loop down, bounded by `limit`.
async fn run_fetch(
    executor: Arc<dyn RemoteExecutor>,
    target: Target,
    limit: Duration,
) -> FetchOutcome {
    let mut handle = tokio::spawn(async move { executor.execute(&target).await });

    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result.into(),
        Ok(Err(_)) => FetchOutcome::Failed {
            error_kind: FetchErrorKind::ExecutorUnavailable,
        },
        Err(_) => {
            handle.abort();
            // Wait for the aborted fetch to be dropped before the slot frees up.
            let _ = handle.await;
            FetchOutcome::Failed {
                error_kind: FetchErrorKind::Timeout,
            }
        }
    }
}

fn resolved_event(result: &ExecutionResult) -> GridEventKind {
    GridEventKind::ItemResolved {
        item_id: result.item_id,
        mission_id: result.mission_id,
        slot_id: result.slot_id,
        error_kind: result.error_kind(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use crawlgrid_core::{NullLogger, Payload};

    use super::*;

    struct Echo;

    #[async_trait]
    impl RemoteExecutor for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, target: &Target) -> Result<Payload, FetchErrorKind> {
            Ok(Payload::new(target.clone()))
        }
    }

    fn engine(executors: usize, config: EngineConfig) -> (DispatchEngine, EngineHandle) {
        let executors = (0..executors)
            .map(|_| Arc::new(Echo) as Arc<dyn RemoteExecutor>)
            .collect();
        DispatchEngine::new(
            executors,
            config,
            Arc::new(NullLogger),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn submitted_item_is_fetched_and_routed() {
        let (engine, handle) = engine(1, EngineConfig::default());
        let mut inbox = handle.attach(1).await;
        let task = tokio::spawn(engine.run());

        let item_id = handle.submit(1, "a".into()).unwrap();
        let result = inbox.recv().await.expect("result delivered");

        assert_eq!(result.item_id, item_id);
        assert_eq!(result.slot_id, Some(0));
        assert_eq!(result.payload().map(|p| p.body.as_str()), Some("a"));

        handle.stop(true).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_stop_is_refused() {
        let (engine, handle) = engine(1, EngineConfig::default());
        let task = tokio::spawn(engine.run());

        handle.stop(true).await.unwrap();
        assert!(handle.is_stopping());
        assert_matches!(handle.submit(1, "a".into()), Err(CoreError::EngineStopped));

        task.await.unwrap();
    }

    #[tokio::test]
    async fn bounded_backlog_refuses_overflow() {
        let config = EngineConfig {
            max_backlog: Some(2),
            ..EngineConfig::default()
        };
        // Loop not running, so nothing leaves the backlog.
        let (_engine, handle) = engine(1, config);

        handle.submit(1, "a".into()).unwrap();
        handle.submit(1, "b".into()).unwrap();
        assert_matches!(
            handle.submit(1, "c".into()),
            Err(CoreError::Backpressure { limit: 2 })
        );
        assert_eq!(handle.pending(), 2);
    }

    #[tokio::test]
    async fn unassigned_items_resolve_as_discarded_on_stop() {
        // No executors: every submission stays in the backlog.
        let (engine, handle) = engine(0, EngineConfig::default());
        let mut inbox = handle.attach(4).await;
        let task = tokio::spawn(engine.run());

        handle.submit(4, "a".into()).unwrap();
        handle.submit(4, "b".into()).unwrap();
        handle.stop(true).await.unwrap();
        task.await.unwrap();

        for expected in ["a", "b"] {
            let result = inbox.recv().await.expect("discarded result delivered");
            assert_eq!(result.target, expected);
            assert_eq!(result.slot_id, None);
            assert_eq!(result.error_kind(), Some(FetchErrorKind::Discarded));
        }
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_loop() {
        let (engine, handle) = engine(1, EngineConfig::default());
        let task = tokio::spawn(engine.run());

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn abandoning_stop_returns_without_waiting() {
        let (engine, handle) = engine(1, EngineConfig::default());
        let task = tokio::spawn(engine.run());

        handle.stop(false).await.unwrap();
        handle.stopped().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn item_ids_are_unique_and_sequenced() {
        let (_engine, handle) = engine(1, EngineConfig::default());
        let a = handle.submit(1, "a".into()).unwrap();
        let b = handle.submit(2, "a".into()).unwrap();
        assert_ne!(a, b);
        assert_eq!(handle.pending(), 2);
    }
}
