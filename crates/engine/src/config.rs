use std::time::Duration;

use serde::Deserialize;

/// Default upper bound on a single fetch.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a draining stop.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a single store write.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause before a mission retries a refused submission.
const DEFAULT_BACKPRESSURE_BACKOFF: Duration = Duration::from_millis(100);

/// Dispatch engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A fetch still running after this long resolves as `Timeout`.
    pub fetch_timeout: Duration,
    /// How long `stop(drain = true)` waits before failing with `DrainTimeout`.
    pub drain_timeout: Duration,
    /// `Some(n)` bounds the backlog; `submit` fails with `Backpressure`
    /// once `n` submissions are pending. `None` is unbounded.
    pub max_backlog: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_backlog: None,
        }
    }
}

/// What a mission does with a failed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report and move on. The target stays visited.
    #[default]
    Drop,
    /// Re-add transient failures to the strategy until the target has been
    /// attempted `max_attempts` times in total.
    Retry { max_attempts: u32 },
}

/// Per-mission tuning.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Cap on this mission's in-flight submissions; `None` submits every
    /// available target immediately.
    pub max_in_flight: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub store_timeout: Duration,
    pub backpressure_backoff: Duration,
}

impl MissionConfig {
    pub fn with_max_in_flight(mut self, cap: usize) -> Self {
        self.max_in_flight = Some(cap.max(1));
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            failure_policy: FailurePolicy::Drop,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            backpressure_backoff: DEFAULT_BACKPRESSURE_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded_and_never_retry() {
        let engine = EngineConfig::default();
        assert_eq!(engine.max_backlog, None);
        assert_eq!(engine.fetch_timeout, Duration::from_secs(30));

        let mission = MissionConfig::default();
        assert_eq!(mission.max_in_flight, None);
        assert_eq!(mission.failure_policy, FailurePolicy::Drop);
    }

    #[test]
    fn zero_in_flight_cap_is_raised_to_one() {
        let mission = MissionConfig::default().with_max_in_flight(0);
        assert_eq!(mission.max_in_flight, Some(1));
    }

    #[test]
    fn failure_policy_deserializes_tagged() {
        let policy: FailurePolicy =
            serde_json::from_str(r#"{"policy": "retry", "max_attempts": 3}"#).unwrap();
        assert_eq!(policy, FailurePolicy::Retry { max_attempts: 3 });

        let policy: FailurePolicy = serde_json::from_str(r#"{"policy": "drop"}"#).unwrap();
        assert_eq!(policy, FailurePolicy::Drop);
    }
}
