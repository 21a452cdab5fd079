//! Missions: independent traversals driven by pushed results.
//!
//! A [`Mission`] exclusively owns its traversal strategy, its visited-set,
//! and its in-flight count. It never touches engine state: it submits
//! through a [`Submitter`] and consumes results from its own inbox, one at
//! a time, inside [`Mission::run`]. That task is the only place the
//! mission's state is mutated, so `on_result` is never re-entered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crawlgrid_core::{
    CoreError, ExecutionResult, FetchErrorKind, FetchOutcome, Logger, MissionId, MissionState,
    Payload, Target, TraversalStrategy, WorkItemId,
};
use crawlgrid_events::{EventBus, GridEventKind};
use crawlgrid_store::{Entity, Store};
use serde::Serialize;

use crate::config::{FailurePolicy, MissionConfig};
use crate::dispatcher::EngineHandle;
use crate::router::Inbox;

const COMPONENT: &str = "mission";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Where a mission sends its work. Must not block.
pub trait Submitter: Send + Sync {
    fn submit(&self, mission_id: MissionId, target: Target) -> Result<WorkItemId, CoreError>;
}

impl Submitter for EngineHandle {
    fn submit(&self, mission_id: MissionId, target: Target) -> Result<WorkItemId, CoreError> {
        EngineHandle::submit(self, mission_id, target)
    }
}

/// What a mission learned from one fetched payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub discovered: Vec<Target>,
    pub entities: Vec<Entity>,
}

impl Extraction {
    pub fn new(discovered: Vec<Target>, entities: Vec<Entity>) -> Self {
        Self {
            discovered,
            entities,
        }
    }
}

/// Mission-specific parsing of a fetched payload.
pub trait Extractor: Send + Sync {
    fn extract(&self, target: &Target, payload: &Payload) -> Extraction;
}

// ---------------------------------------------------------------------------
// MissionPlan / MissionReport
// ---------------------------------------------------------------------------

/// Everything needed to build a [`Mission`], supplied before registration.
pub struct MissionPlan {
    pub name: String,
    pub seeds: Vec<Target>,
    pub strategy: Box<dyn TraversalStrategy>,
    pub extractor: Arc<dyn Extractor>,
    pub store: Arc<dyn Store>,
    pub config: MissionConfig,
}

impl MissionPlan {
    pub fn new(
        name: impl Into<String>,
        seeds: Vec<Target>,
        strategy: Box<dyn TraversalStrategy>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            name: name.into(),
            seeds,
            strategy,
            extractor,
            store,
            config: MissionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MissionConfig) -> Self {
        self.config = config;
        self
    }
}

/// Final (or current) tallies for one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionReport {
    pub mission_id: MissionId,
    pub name: String,
    pub state: MissionState,
    pub visited: usize,
    pub submitted: u64,
    pub fetched: u64,
    pub failed: u64,
    pub retried: u64,
    pub entities_saved: u64,
    pub store_errors: u64,
}

impl MissionReport {
    /// Report for a mission whose task died before it could report.
    pub fn lost(mission_id: MissionId, name: impl Into<String>) -> Self {
        Self {
            mission_id,
            name: name.into(),
            state: MissionState::Stopped,
            visited: 0,
            submitted: 0,
            fetched: 0,
            failed: 0,
            retried: 0,
            entities_saved: 0,
            store_errors: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Mission
// ---------------------------------------------------------------------------

pub struct Mission {
    id: MissionId,
    name: String,
    state: MissionState,
    seeds: Vec<Target>,
    strategy: Box<dyn TraversalStrategy>,
    /// Every target ever handed to the strategy.
    visited: HashSet<Target>,
    in_flight: usize,
    /// Target refused by a full backlog, submitted ahead of the strategy.
    deferred: Option<Target>,
    /// Attempts per target, tracked only once a target has failed.
    attempts: HashMap<Target, u32>,
    /// The engine refused work; submit nothing more.
    halted: bool,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn Store>,
    config: MissionConfig,
    submitter: Arc<dyn Submitter>,
    logger: Arc<dyn Logger>,
    events: Arc<EventBus>,
    submitted: u64,
    fetched: u64,
    failed: u64,
    retried: u64,
    entities_saved: u64,
    store_errors: u64,
}

impl Mission {
    pub fn new(
        id: MissionId,
        plan: MissionPlan,
        submitter: Arc<dyn Submitter>,
        logger: Arc<dyn Logger>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            id,
            name: plan.name,
            state: MissionState::Idle,
            seeds: plan.seeds,
            strategy: plan.strategy,
            visited: HashSet::new(),
            in_flight: 0,
            deferred: None,
            attempts: HashMap::new(),
            halted: false,
            extractor: plan.extractor,
            store: plan.store,
            config: plan.config,
            submitter,
            logger,
            events,
            submitted: 0,
            fetched: 0,
            failed: 0,
            retried: 0,
            entities_saved: 0,
            store_errors: 0,
        }
    }

    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_visited(&self, target: &str) -> bool {
        self.visited.contains(target)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn report(&self) -> MissionReport {
        MissionReport {
            mission_id: self.id,
            name: self.name.clone(),
            state: self.state,
            visited: self.visited.len(),
            submitted: self.submitted,
            fetched: self.fetched,
            failed: self.failed,
            retried: self.retried,
            entities_saved: self.entities_saved,
            store_errors: self.store_errors,
        }
    }

    /// Seed the strategy and submit the first batch.
    ///
    /// Duplicate seeds are visited once. A mission with no seeds finishes
    /// immediately.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(MissionState::Seeding)?;

        let visited = &mut self.visited;
        let seeds: Vec<Target> = std::mem::take(&mut self.seeds)
            .into_iter()
            .filter(|target| visited.insert(target.clone()))
            .collect();
        self.logger.debug(
            COMPONENT,
            &format!("Mission '{}' seeded with {} target(s)", self.name, seeds.len()),
        );
        self.strategy.add_initial(seeds);

        self.transition(MissionState::Running)?;
        self.pump()?;
        self.settle()
    }

    /// Handle one pushed result. Called once per submitted item.
    pub async fn on_result(&mut self, result: ExecutionResult) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let ExecutionResult {
            target, outcome, ..
        } = result;
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome {
            FetchOutcome::Success { payload } => self.absorb(&target, &payload).await,
            FetchOutcome::Failed { error_kind } => self.record_failure(target, error_kind),
        }

        self.pump()?;
        self.settle()
    }

    /// Drive the mission to a terminal state, consuming results from
    /// `inbox`. Starts the mission first if it is still `Idle`.
    pub async fn run(mut self, mut inbox: Inbox) -> MissionReport {
        if self.state == MissionState::Idle {
            if let Err(e) = self.start() {
                self.abort(&e);
            }
        }

        while !self.state.is_terminal() {
            let step = if self.in_flight == 0 {
                // Nothing is coming back; the last submission was refused.
                tokio::time::sleep(self.config.backpressure_backoff).await;
                self.pump().and_then(|()| self.settle())
            } else {
                match inbox.recv().await {
                    Some(result) => self.on_result(result).await,
                    None => {
                        self.logger.warn(
                            COMPONENT,
                            &format!(
                                "Mission '{}' inbox closed with {} item(s) in flight",
                                self.name, self.in_flight
                            ),
                        );
                        self.halted = true;
                        self.in_flight = 0;
                        self.settle()
                    }
                }
            };

            if let Err(e) = step {
                self.abort(&e);
            }
        }

        self.report()
    }

    async fn absorb(&mut self, target: &Target, payload: &Payload) {
        self.fetched += 1;
        let Extraction {
            discovered,
            entities,
        } = self.extractor.extract(target, payload);

        let visited = &mut self.visited;
        let fresh: Vec<Target> = discovered
            .into_iter()
            .filter(|found| visited.insert(found.clone()))
            .collect();
        if !fresh.is_empty() {
            self.logger.debug(
                COMPONENT,
                &format!(
                    "Mission '{}' discovered {} new target(s) from {target}",
                    self.name,
                    fresh.len()
                ),
            );
            self.strategy.add_new(fresh);
        }

        for entity in entities {
            self.persist(entity.with_mission(self.id)).await;
        }
    }

    async fn persist(&mut self, entity: Entity) {
        match tokio::time::timeout(self.config.store_timeout, self.store.save(&entity)).await {
            Ok(Ok(())) => self.entities_saved += 1,
            Ok(Err(e)) => {
                self.store_errors += 1;
                self.logger.warn(
                    COMPONENT,
                    &format!("Mission '{}' failed to save entity from {}: {e}", self.name, entity.source),
                );
            }
            Err(_) => {
                self.store_errors += 1;
                self.logger.warn(
                    COMPONENT,
                    &format!(
                        "Mission '{}' gave up saving entity from {} after {:?}",
                        self.name, entity.source, self.config.store_timeout
                    ),
                );
            }
        }
    }

    /// The target stays visited either way; a retry re-adds it directly.
    fn record_failure(&mut self, target: Target, kind: FetchErrorKind) {
        self.failed += 1;
        self.logger.warn(
            COMPONENT,
            &format!("Mission '{}' fetch of {target} failed: {kind}", self.name),
        );

        if kind == FetchErrorKind::Discarded {
            // Only shutdown discards work.
            self.halted = true;
        }

        let FailurePolicy::Retry { max_attempts } = self.config.failure_policy else {
            return;
        };
        if self.halted || !kind.is_retryable() {
            return;
        }

        let attempts = self.attempts.entry(target.clone()).or_insert(1);
        if *attempts < max_attempts {
            *attempts += 1;
            self.retried += 1;
            self.logger.info(
                COMPONENT,
                &format!(
                    "Mission '{}' retrying {target} (attempt {} of {max_attempts})",
                    self.name, *attempts
                ),
            );
            self.strategy.add_new(vec![target]);
        }
    }

    fn has_capacity(&self) -> bool {
        self.config
            .max_in_flight
            .map_or(true, |cap| self.in_flight < cap)
    }

    fn has_pending(&self) -> bool {
        self.deferred.is_some() || self.strategy.has_next()
    }

    /// Submit while under the in-flight cap and targets remain.
    fn pump(&mut self) -> Result<(), CoreError> {
        while !self.halted && self.has_capacity() {
            let target = match self.deferred.take() {
                Some(target) => target,
                None if self.strategy.has_next() => self.strategy.next()?,
                None => break,
            };
            match self.submitter.submit(self.id, target.clone()) {
                Ok(_) => {
                    self.in_flight += 1;
                    self.submitted += 1;
                }
                Err(CoreError::Backpressure { limit }) => {
                    self.logger.debug(
                        COMPONENT,
                        &format!(
                            "Mission '{}' backing off: engine backlog full ({limit})",
                            self.name
                        ),
                    );
                    self.deferred = Some(target);
                    break;
                }
                Err(CoreError::EngineStopped) => {
                    self.logger.info(
                        COMPONENT,
                        &format!(
                            "Mission '{}' halted: engine is stopping ({} target(s) left unsubmitted)",
                            self.name,
                            self.strategy.len() + 1
                        ),
                    );
                    self.halted = true;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Move to whichever state the counters imply.
    fn settle(&mut self) -> Result<(), CoreError> {
        let pending = self.has_pending();
        let next = match (self.in_flight, pending, self.halted) {
            (0, _, true) => MissionState::Stopped,
            (0, false, false) => MissionState::Done,
            (_, true, false) => MissionState::Running,
            _ => MissionState::Draining,
        };

        if next != self.state {
            self.transition(next)?;
        }
        Ok(())
    }

    fn transition(&mut self, to: MissionState) -> Result<(), CoreError> {
        self.state.validate_transition(to)?;
        self.enter(to);
        Ok(())
    }

    /// Force the mission into `Stopped` after a contract violation. It
    /// submits nothing further but still accepts pushed results.
    pub fn abort(&mut self, error: &CoreError) {
        self.logger.error(
            COMPONENT,
            &format!("Mission '{}' aborted: {error}", self.name),
        );
        self.halted = true;
        if !self.state.is_terminal() {
            self.enter(MissionState::Stopped);
        }
    }

    fn enter(&mut self, to: MissionState) {
        let from = std::mem::replace(&mut self.state, to);
        self.logger.info(
            COMPONENT,
            &format!("Mission '{}' {from} -> {to}", self.name),
        );
        self.events.publish(GridEventKind::MissionTransition {
            mission_id: self.id,
            from,
            to,
        });

        if to.is_terminal() {
            self.logger.info(
                COMPONENT,
                &format!(
                    "Mission '{}' finished as {to}: {} fetched, {} failed, {} visited",
                    self.name,
                    self.fetched,
                    self.failed,
                    self.visited.len()
                ),
            );
            self.events.publish(GridEventKind::MissionCompleted {
                mission_id: self.id,
                state: to,
                fetched: self.fetched,
                failed: self.failed,
            });
        }
    }
}
