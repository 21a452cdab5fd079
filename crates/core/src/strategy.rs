//! Traversal strategies: pure ordering policies over pending targets.
//!
//! A strategy never deduplicates. The owning mission guarantees that each
//! target is handed over once (retry policies aside), so every target added
//! is returned by [`TraversalStrategy::next`] exactly once.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Target;

/// Capability set every traversal order provides.
pub trait TraversalStrategy: Send {
    /// Seed the strategy. Called once, before the first submission round.
    fn add_initial(&mut self, targets: Vec<Target>);

    /// Append newly discovered targets.
    fn add_new(&mut self, targets: Vec<Target>);

    fn has_next(&self) -> bool;

    /// Remove and return one target in this strategy's order.
    fn next(&mut self) -> Result<Target, CoreError>;

    /// Number of targets still pending.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Breadth-first
// ---------------------------------------------------------------------------

/// FIFO: targets come out in insertion order.
#[derive(Debug, Default)]
pub struct BreadthFirst {
    queue: VecDeque<Target>,
}

impl BreadthFirst {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraversalStrategy for BreadthFirst {
    fn add_initial(&mut self, targets: Vec<Target>) {
        self.queue.extend(targets);
    }

    fn add_new(&mut self, targets: Vec<Target>) {
        self.queue.extend(targets);
    }

    fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    fn next(&mut self) -> Result<Target, CoreError> {
        self.queue.pop_front().ok_or(CoreError::EmptyStrategy)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

// ---------------------------------------------------------------------------
// Depth-first
// ---------------------------------------------------------------------------

/// LIFO: the most recently added target comes out first. A batch is pushed
/// in sequence order, so its last element is returned first.
#[derive(Debug, Default)]
pub struct DepthFirst {
    stack: Vec<Target>,
}

impl DepthFirst {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraversalStrategy for DepthFirst {
    fn add_initial(&mut self, targets: Vec<Target>) {
        self.stack.extend(targets);
    }

    fn add_new(&mut self, targets: Vec<Target>) {
        self.stack.extend(targets);
    }

    fn has_next(&self) -> bool {
        !self.stack.is_empty()
    }

    fn next(&mut self) -> Result<Target, CoreError> {
        self.stack.pop().ok_or(CoreError::EmptyStrategy)
    }

    fn len(&self) -> usize {
        self.stack.len()
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

type ScoreFn = Box<dyn Fn(&Target) -> i64 + Send>;

/// Lowest score first; equal scores come out in insertion order.
pub struct PriorityOrder {
    heap: BinaryHeap<Reverse<(i64, u64, Target)>>,
    score: ScoreFn,
    sequence: u64,
}

impl PriorityOrder {
    pub fn new(score: impl Fn(&Target) -> i64 + Send + 'static) -> Self {
        Self {
            heap: BinaryHeap::new(),
            score: Box::new(score),
            sequence: 0,
        }
    }

    /// Prefers targets closer to the site root.
    pub fn shallowest_first() -> Self {
        Self::new(|target| path_depth(target) as i64)
    }

    fn push_all(&mut self, targets: Vec<Target>) {
        for target in targets {
            let score = (self.score)(&target);
            self.heap.push(Reverse((score, self.sequence, target)));
            self.sequence += 1;
        }
    }
}

impl fmt::Debug for PriorityOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityOrder")
            .field("pending", &self.heap.len())
            .finish_non_exhaustive()
    }
}

impl TraversalStrategy for PriorityOrder {
    fn add_initial(&mut self, targets: Vec<Target>) {
        self.push_all(targets);
    }

    fn add_new(&mut self, targets: Vec<Target>) {
        self.push_all(targets);
    }

    fn has_next(&self) -> bool {
        !self.heap.is_empty()
    }

    fn next(&mut self) -> Result<Target, CoreError> {
        self.heap
            .pop()
            .map(|Reverse((_, _, target))| target)
            .ok_or(CoreError::EmptyStrategy)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Number of non-empty path segments in a URL-like target.
///
/// `https://host/a/b?q=1` has depth 2. Targets without a scheme are
/// treated as bare paths.
pub fn path_depth(target: &str) -> usize {
    let rest = match target.split_once("://") {
        Some((_, after_scheme)) => after_scheme
            .split_once('/')
            .map(|(_, path)| path)
            .unwrap_or(""),
        None => target,
    };
    let path = rest.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).count()
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Strategy selector, chosen at mission-construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    BreadthFirst,
    DepthFirst,
    ShallowestFirst,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn TraversalStrategy> {
        match self {
            Self::BreadthFirst => Box::new(BreadthFirst::new()),
            Self::DepthFirst => Box::new(DepthFirst::new()),
            Self::ShallowestFirst => Box::new(PriorityOrder::shallowest_first()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
