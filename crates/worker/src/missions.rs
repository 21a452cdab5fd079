//! Mission definitions read from the missions file.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use crawlgrid_core::{StrategyKind, Target};
use crawlgrid_engine::{FailurePolicy, MissionConfig, MissionPlan};
use crawlgrid_store::Store;
use serde::Deserialize;

use crate::extract::LinkExtractor;

/// One entry of the missions file.
///
/// ```json
/// { "name": "garden", "seeds": ["https://shop.test/garden"],
///   "strategy": "depth_first", "max_in_flight": 4, "max_retries": 1,
///   "same_host": true }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissionSpec {
    pub name: String,
    pub seeds: Vec<Target>,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// Extra attempts for transient failures. Unset means no retry.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Only follow links on the seeds' hosts.
    #[serde(default)]
    pub same_host: bool,
}

impl MissionSpec {
    pub fn mission_config(&self) -> MissionConfig {
        let mut config = MissionConfig::default();
        if let Some(cap) = self.max_in_flight {
            config = config.with_max_in_flight(cap);
        }
        if let Some(retries) = self.max_retries.filter(|r| *r > 0) {
            config = config.with_failure_policy(FailurePolicy::Retry {
                max_attempts: retries.saturating_add(1),
            });
        }
        config
    }

    pub fn into_plan(self, store: Arc<dyn Store>) -> MissionPlan {
        let extractor = if self.same_host {
            LinkExtractor::same_host(&self.seeds)
        } else {
            LinkExtractor::new()
        };
        let config = self.mission_config();

        MissionPlan::new(
            self.name,
            self.seeds,
            self.strategy.build(),
            Arc::new(extractor),
            store,
        )
        .with_config(config)
    }
}

/// Parse and validate a JSON array of [`MissionSpec`]s.
pub fn parse_missions(json: &str) -> anyhow::Result<Vec<MissionSpec>> {
    let specs: Vec<MissionSpec> =
        serde_json::from_str(json).context("Missions file is not a valid mission list")?;

    let mut names = HashSet::new();
    for spec in &specs {
        if spec.name.trim().is_empty() {
            bail!("Mission names must not be empty");
        }
        if !names.insert(spec.name.as_str()) {
            bail!("Duplicate mission name '{}'", spec.name);
        }
        if spec.seeds.is_empty() {
            tracing::warn!(mission = %spec.name, "Mission has no seeds and will finish immediately");
        }
    }

    Ok(specs)
}

pub fn load_missions(path: &Path) -> anyhow::Result<Vec<MissionSpec>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read missions file {}", path.display()))?;
    parse_missions(&json).with_context(|| format!("Invalid missions file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn minimal_spec_uses_defaults() {
        let specs = parse_missions(r#"[{"name": "a", "seeds": ["https://a.test/"]}]"#).unwrap();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].strategy, StrategyKind::BreadthFirst);
        assert!(!specs[0].same_host);

        let config = specs[0].mission_config();
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.failure_policy, FailurePolicy::Drop);
    }

    #[test]
    fn retries_become_total_attempts() {
        let specs = parse_missions(
            r#"[{"name": "a", "seeds": [], "strategy": "shallowest_first",
                 "max_in_flight": 3, "max_retries": 2}]"#,
        )
        .unwrap();

        let config = specs[0].mission_config();
        assert_eq!(config.max_in_flight, Some(3));
        assert_eq!(config.failure_policy, FailurePolicy::Retry { max_attempts: 3 });
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse_missions(
            r#"[{"name": "a", "seeds": []}, {"name": "a", "seeds": []}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate mission name 'a'"));
    }

    #[test]
    fn unknown_fields_and_strategies_are_rejected() {
        assert_matches!(
            parse_missions(r#"[{"name": "a", "seeds": [], "speed": 9}]"#),
            Err(_)
        );
        assert_matches!(
            parse_missions(r#"[{"name": "a", "seeds": [], "strategy": "random"}]"#),
            Err(_)
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "a", "seeds": ["https://a.test/"], "same_host": true}}]"#)
            .unwrap();

        let specs = load_missions(file.path()).unwrap();
        assert_eq!(specs[0].name, "a");
        assert!(specs[0].same_host);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_missions(Path::new("/nonexistent/missions.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/missions.json"));
    }
}
