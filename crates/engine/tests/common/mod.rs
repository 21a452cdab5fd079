//! Shared fixtures for engine integration tests.
//!
//! Pages form a fixed graph: fetching a target returns its children as a
//! newline-separated body, and [`GraphExtractor`] turns that body back into
//! discovered targets plus one `page` entity.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crawlgrid_core::{FetchErrorKind, NullLogger, Payload, StrategyKind, Target};
use crawlgrid_engine::{
    DispatchEngine, EngineConfig, EngineHandle, Extraction, Extractor, MissionConfig, MissionPlan,
};
use crawlgrid_events::EventBus;
use crawlgrid_executor::RemoteExecutor;
use crawlgrid_store::{Entity, MemoryStore, Store};
use serde_json::json;

pub type Graph = HashMap<Target, Vec<Target>>;

pub fn graph(edges: &[(&str, &[&str])]) -> Arc<Graph> {
    Arc::new(
        edges
            .iter()
            .map(|(parent, children)| {
                (
                    parent.to_string(),
                    children.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect(),
    )
}

pub fn targets(names: &[&str]) -> Vec<Target> {
    names.iter().map(|n| n.to_string()).collect()
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Executor whose latency and failures are scripted per target.
///
/// Records every target it was asked to fetch and the highest number of
/// fetches it ever ran at once.
pub struct ScriptedExecutor {
    graph: Arc<Graph>,
    delay: Duration,
    slow: HashMap<Target, Duration>,
    failures: HashMap<Target, FetchErrorKind>,
    panics: HashSet<Target>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fetched: Mutex<Vec<Target>>,
}

impl ScriptedExecutor {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            delay: Duration::ZERO,
            slow: HashMap::new(),
            failures: HashMap::new(),
            panics: HashSet::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn slow(mut self, target: &str, delay: Duration) -> Self {
        self.slow.insert(target.to_string(), delay);
        self
    }

    pub fn failing(mut self, target: &str, kind: FetchErrorKind) -> Self {
        self.failures.insert(target.to_string(), kind);
        self
    }

    pub fn panicking(mut self, target: &str) -> Self {
        self.panics.insert(target.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<Target> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Counts a running fetch until dropped, including when the fetch is aborted.
struct Running<'a>(&'a AtomicUsize);

impl<'a> Running<'a> {
    fn enter(active: &'a AtomicUsize, max_active: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, target: &Target) -> Result<Payload, FetchErrorKind> {
        let _running = Running::enter(&self.active, &self.max_active);
        self.fetched.lock().unwrap().push(target.clone());

        if self.panics.contains(target) {
            panic!("scripted executor crashed on {target}");
        }

        let delay = self.slow.get(target).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(kind) = self.failures.get(target) {
            return Err(*kind);
        }
        let body = self
            .graph
            .get(target)
            .map(|children| children.join("\n"))
            .unwrap_or_default();
        Ok(Payload::new(body))
    }
}

pub fn pool(executors: &[Arc<ScriptedExecutor>]) -> Vec<Arc<dyn RemoteExecutor>> {
    executors
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn RemoteExecutor>)
        .collect()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Reads children from the body; one `page` entity per fetched target.
///
/// Also tracks how many extractions ever overlapped, to catch concurrent
/// result delivery to one mission.
#[derive(Default)]
pub struct GraphExtractor {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    hold: Option<Duration>,
}

impl GraphExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block inside every extraction to widen any overlap window.
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold: Some(hold),
            ..Self::default()
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for GraphExtractor {
    fn extract(&self, target: &Target, payload: &Payload) -> Extraction {
        let _running = Running::enter(&self.active, &self.max_active);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = self.hold {
            std::thread::sleep(hold);
        }

        Extraction::new(
            payload
                .body
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            vec![Entity::new("page", target.clone(), json!({ "target": target }))],
        )
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn plan(
    name: &str,
    seeds: &[&str],
    strategy: StrategyKind,
    extractor: Arc<GraphExtractor>,
    store: Arc<MemoryStore>,
) -> MissionPlan {
    MissionPlan::new(
        name,
        targets(seeds),
        strategy.build(),
        extractor,
        store as Arc<dyn Store>,
    )
    .with_config(MissionConfig {
        backpressure_backoff: Duration::from_millis(5),
        ..MissionConfig::default()
    })
}

pub fn engine(
    executors: &[Arc<ScriptedExecutor>],
    config: EngineConfig,
) -> (DispatchEngine, EngineHandle) {
    DispatchEngine::new(
        pool(executors),
        config,
        Arc::new(NullLogger),
        Arc::new(EventBus::default()),
    )
}

/// Wait for a result, failing the test instead of hanging.
pub async fn next_result(
    inbox: &mut crawlgrid_engine::Inbox,
) -> crawlgrid_core::ExecutionResult {
    tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("result should arrive within 5s")
        .expect("inbox should stay open")
}
