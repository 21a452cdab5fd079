//! Mission lifecycle state machine.
//!
//! `Idle -> Seeding -> Running <-> Draining -> Done`, with `Stopped` as the
//! second terminal state for missions cut short by engine shutdown.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    /// Constructed, nothing submitted.
    Idle,
    /// Seeds are being handed to the traversal strategy.
    Seeding,
    /// Targets remain to be submitted.
    Running,
    /// Nothing left to submit; waiting for in-flight results.
    Draining,
    /// No pending targets and nothing in flight.
    Done,
    /// The engine refused further work before the mission finished.
    Stopped,
}

impl MissionState {
    /// Returns the set of states reachable from `self`.
    ///
    /// `Draining -> Running` happens when a late result discovers new
    /// targets (or a retry re-adds one).
    pub fn valid_transitions(self) -> &'static [MissionState] {
        use MissionState::*;
        match self {
            Idle => &[Seeding],
            Seeding => &[Running, Stopped],
            Running => &[Draining, Done, Stopped],
            Draining => &[Running, Done, Stopped],
            Done | Stopped => &[],
        }
    }

    pub fn can_transition(self, to: MissionState) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: MissionState) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self, to })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Stopped)
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Seeding => "Seeding",
            Self::Running => "Running",
            Self::Draining => "Draining",
            Self::Done => "Done",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::MissionState::*;
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn idle_to_seeding() {
        assert!(Idle.can_transition(Seeding));
    }

    #[test]
    fn seeding_to_running() {
        assert!(Seeding.can_transition(Running));
    }

    #[test]
    fn running_to_draining_and_back() {
        assert!(Running.can_transition(Draining));
        assert!(Draining.can_transition(Running));
    }

    #[test]
    fn running_and_draining_reach_done() {
        assert!(Running.can_transition(Done));
        assert!(Draining.can_transition(Done));
    }

    #[test]
    fn every_active_state_can_be_stopped() {
        for state in [Seeding, Running, Draining] {
            assert!(state.can_transition(Stopped), "{state} -> Stopped");
        }
    }

    // -----------------------------------------------------------------------
    // Terminal states
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(Done.valid_transitions().is_empty());
        assert!(Stopped.valid_transitions().is_empty());
        assert!(Done.is_terminal());
        assert!(Stopped.is_terminal());
        assert!(!Draining.is_terminal());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn idle_cannot_skip_seeding() {
        assert!(!Idle.can_transition(Running));
    }

    #[test]
    fn seeding_twice_is_rejected() {
        assert!(!Running.can_transition(Seeding));
    }

    #[test]
    fn validate_transition_reports_both_ends() {
        assert_matches!(
            Done.validate_transition(Running),
            Err(CoreError::InvalidTransition { from: Done, to: Running })
        );
        assert!(Seeding.validate_transition(Running).is_ok());
    }

    #[test]
    fn error_message_names_states() {
        let err = Idle.validate_transition(Done).unwrap_err();
        assert_eq!(err.to_string(), "Invalid mission transition: Idle -> Done");
    }
}
