use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use crawlgrid_engine::EngineConfig;
use crawlgrid_executor::{HttpExecutor, RemoteExecutor};

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// JSON array of mission specs.
    pub missions_file: PathBuf,
    /// Browser-grid session URLs, one executor each. Empty means direct fetch.
    pub executor_endpoints: Vec<String>,
    /// Number of direct-fetch executors when no endpoints are configured.
    pub executor_count: usize,
    pub fetch_timeout: Duration,
    pub drain_timeout: Duration,
    pub max_backlog: Option<usize>,
    /// JSON-lines file extracted entities are appended to.
    pub output_path: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var               | Default          |
    /// |-----------------------|------------------|
    /// | `MISSIONS_FILE`       | required         |
    /// | `EXECUTOR_ENDPOINTS`  | empty (direct)   |
    /// | `EXECUTOR_COUNT`      | `2`              |
    /// | `FETCH_TIMEOUT_SECS`  | `30`             |
    /// | `DRAIN_TIMEOUT_SECS`  | `60`             |
    /// | `MAX_BACKLOG`         | unbounded        |
    /// | `OUTPUT_PATH`         | `entities.jsonl` |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let missions_file = lookup("MISSIONS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .context("MISSIONS_FILE environment variable is required")?;

        let executor_endpoints: Vec<String> = lookup("EXECUTOR_ENDPOINTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let executor_count: usize = parse_or(&lookup, "EXECUTOR_COUNT", 2)?;
        if executor_endpoints.is_empty() && executor_count == 0 {
            bail!("EXECUTOR_COUNT must be at least 1 when EXECUTOR_ENDPOINTS is empty");
        }

        let fetch_timeout = Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", 30)?);
        let drain_timeout = Duration::from_secs(parse_or(&lookup, "DRAIN_TIMEOUT_SECS", 60)?);

        let max_backlog = match lookup("MAX_BACKLOG").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(parse("MAX_BACKLOG", &raw)?),
            None => None,
        };

        let output_path = lookup("OUTPUT_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("entities.jsonl"));

        Ok(Self {
            missions_file,
            executor_endpoints,
            executor_count,
            fetch_timeout,
            drain_timeout,
            max_backlog,
            output_path,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fetch_timeout: self.fetch_timeout,
            drain_timeout: self.drain_timeout,
            max_backlog: self.max_backlog,
        }
    }

    /// One grid executor per endpoint, or `executor_count` direct ones.
    ///
    /// The HTTP client timeout matches the engine's fetch timeout so a
    /// stuck request is cut off on both sides.
    pub fn build_executors(&self) -> anyhow::Result<Vec<Arc<dyn RemoteExecutor>>> {
        let mut executors: Vec<Arc<dyn RemoteExecutor>> = Vec::new();

        if self.executor_endpoints.is_empty() {
            for i in 0..self.executor_count {
                let executor = HttpExecutor::direct(format!("direct-{i}"), self.fetch_timeout)
                    .context("Failed to build direct HTTP executor")?;
                executors.push(Arc::new(executor));
            }
        } else {
            for (i, endpoint) in self.executor_endpoints.iter().enumerate() {
                let executor = HttpExecutor::grid(format!("grid-{i}"), endpoint, self.fetch_timeout)
                    .with_context(|| format!("Failed to build grid executor for {endpoint}"))?;
                executors.push(Arc::new(executor));
            }
        }

        Ok(executors)
    }
}

fn parse<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{name} must be a valid number, got {raw:?}: {e}"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse(name, &raw),
        None => Ok(default),
    }
}
