//! Mission registration and the start-all lifecycle.

use std::sync::Arc;

use crawlgrid_core::{Logger, MissionId, MissionState};
use crawlgrid_events::EventBus;
use crawlgrid_executor::RemoteExecutor;
use futures::future::join_all;

use crate::config::EngineConfig;
use crate::dispatcher::{DispatchEngine, EngineHandle};
use crate::mission::{Mission, MissionPlan, MissionReport};

const COMPONENT: &str = "orchestrator";

/// Wires missions to one dispatch engine and runs them to completion.
///
/// Register every mission, then call [`start_all`](Self::start_all). Use
/// [`handle`](Self::handle) beforehand to keep a way to stop the engine
/// from outside (e.g. on a shutdown signal).
pub struct Orchestrator {
    engine: DispatchEngine,
    handle: EngineHandle,
    missions: Vec<MissionPlan>,
    logger: Arc<dyn Logger>,
    events: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        executors: Vec<Arc<dyn RemoteExecutor>>,
        config: EngineConfig,
        logger: Arc<dyn Logger>,
        events: Arc<EventBus>,
    ) -> Self {
        let (engine, handle) =
            DispatchEngine::new(executors, config, Arc::clone(&logger), Arc::clone(&events));
        Self {
            engine,
            handle,
            missions: Vec::new(),
            logger,
            events,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Queue a mission for [`start_all`](Self::start_all). Ids are assigned
    /// in registration order, starting at 1.
    pub fn register_mission(&mut self, plan: MissionPlan) -> MissionId {
        let id = (self.missions.len() + 1) as MissionId;
        self.logger.debug(
            COMPONENT,
            &format!("Registered mission {id} '{}'", plan.name),
        );
        self.missions.push(plan);
        id
    }

    pub fn mission_count(&self) -> usize {
        self.missions.len()
    }

    /// Start every registered mission, run the engine, and return once
    /// every mission is terminal and the engine has shut down.
    ///
    /// Reports come back in registration order.
    pub async fn start_all(self) -> Vec<MissionReport> {
        let Self {
            engine,
            handle,
            missions,
            logger,
            events,
        } = self;

        logger.info(
            COMPONENT,
            &format!("Starting {} mission(s)", missions.len()),
        );

        let submitter = Arc::new(handle.clone());
        let mut names = Vec::with_capacity(missions.len());
        let mut tasks = Vec::with_capacity(missions.len());
        for (index, plan) in missions.into_iter().enumerate() {
            let id = (index + 1) as MissionId;
            names.push((id, plan.name.clone()));
            let inbox = handle.attach(id).await;
            let mut mission = Mission::new(
                id,
                plan,
                submitter.clone(),
                Arc::clone(&logger),
                Arc::clone(&events),
            );
            // Seed before the loop runs so first submissions keep
            // registration order in the engine backlog.
            if let Err(e) = mission.start() {
                mission.abort(&e);
            }
            tasks.push(tokio::spawn(mission.run(inbox)));
        }

        let engine_task = tokio::spawn(engine.run());

        let mut reports = Vec::with_capacity(tasks.len());
        for ((id, name), outcome) in names.into_iter().zip(join_all(tasks).await) {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    logger.error(
                        COMPONENT,
                        &format!("Mission {id} '{name}' task panicked: {e}"),
                    );
                    reports.push(MissionReport::lost(id, name));
                }
            }
        }

        if let Err(e) = handle.stop(true).await {
            logger.warn(COMPONENT, &format!("{e}; abandoning in-flight work"));
            // Cannot fail: a non-draining stop never waits.
            let _ = handle.stop(false).await;
        }
        drop(handle);
        drop(submitter);
        if let Err(e) = engine_task.await {
            logger.error(COMPONENT, &format!("Dispatch engine task panicked: {e}"));
        }

        logger.info(
            COMPONENT,
            &format!(
                "All missions finished: {} done, {} stopped",
                reports.iter().filter(|r| r.state == MissionState::Done).count(),
                reports.iter().filter(|r| r.state == MissionState::Stopped).count(),
            ),
        );
        reports
    }
}
