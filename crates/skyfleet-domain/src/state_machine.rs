//! Mission lifecycle state machine.
//!
//! ```text
//! PENDING_APPROVAL ──► APPROVED ──► IN_PROGRESS ──┬──► COMPLETED
//!                                                 ├──► ABORTED
//!                                                 ├──► FAILED
//!                                                 └──► ARCHIVED
//! ```
//!
//! Pure decision logic: nothing here mutates a mission or touches a store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Mission, MissionState};

const FROM_PENDING: &[MissionState] = &[MissionState::Approved];
const FROM_APPROVED: &[MissionState] = &[MissionState::InProgress];
const FROM_IN_PROGRESS: &[MissionState] = &[
    MissionState::Completed,
    MissionState::Aborted,
    MissionState::Failed,
    MissionState::Archived,
];
const TERMINAL: &[MissionState] = &[];

/// Transition guard failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error(
        "Invalid transition for mission {mission_id}: {from} -> {to} (allowed: {})",
        format_states(.allowed)
    )]
    InvalidTransition {
        mission_id: Uuid,
        from: MissionState,
        to: MissionState,
        allowed: Vec<MissionState>,
    },

    #[error("Mission {mission_id} is {actual}, expected {expected}")]
    InvalidState {
        mission_id: Uuid,
        actual: MissionState,
        expected: MissionState,
    },

    #[error("Mission {mission_id} is scheduled for {scheduled_start}, not before")]
    ScheduledInFuture {
        mission_id: Uuid,
        scheduled_start: DateTime<Utc>,
    },
}

fn format_states(states: &[MissionState]) -> String {
    if states.is_empty() {
        return "none".to_string();
    }
    states
        .iter()
        .map(MissionState::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mission lifecycle rules
#[derive(Debug, Clone, Copy, Default)]
pub struct MissionStateMachine;

impl MissionStateMachine {
    /// States reachable in one step from `from`
    #[must_use]
    pub const fn allowed_targets(from: MissionState) -> &'static [MissionState] {
        match from {
            MissionState::PendingApproval => FROM_PENDING,
            MissionState::Approved => FROM_APPROVED,
            MissionState::InProgress => FROM_IN_PROGRESS,
            MissionState::Completed
            | MissionState::Aborted
            | MissionState::Failed
            | MissionState::Archived => TERMINAL,
        }
    }

    #[must_use]
    pub fn can_transition(from: MissionState, to: MissionState) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    #[must_use]
    pub fn can_approve(mission: &Mission) -> bool {
        mission.state == MissionState::PendingApproval
    }

    /// Approved and not scheduled strictly after `now`
    #[must_use]
    pub fn can_execute(mission: &Mission, now: DateTime<Utc>) -> bool {
        Self::check_execute(mission, now).is_ok()
    }

    /// # Errors
    ///
    /// [`TransitionError::InvalidState`] unless the mission awaits approval.
    pub fn check_approve(mission: &Mission) -> Result<(), TransitionError> {
        if Self::can_approve(mission) {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                mission_id: mission.mission_id,
                actual: mission.state,
                expected: MissionState::PendingApproval,
            })
        }
    }

    /// Execution guard.
    ///
    /// The schedule is checked first so that a not-yet-due mission is always
    /// reported as such, whatever its state.
    ///
    /// # Errors
    ///
    /// [`TransitionError::ScheduledInFuture`] or
    /// [`TransitionError::InvalidState`].
    pub fn check_execute(mission: &Mission, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if let Some(scheduled_start) = mission.scheduled_start.filter(|_| !mission.is_due(now)) {
            return Err(TransitionError::ScheduledInFuture {
                mission_id: mission.mission_id,
                scheduled_start,
            });
        }
        if mission.state != MissionState::Approved {
            return Err(TransitionError::InvalidState {
                mission_id: mission.mission_id,
                actual: mission.state,
                expected: MissionState::Approved,
            });
        }
        Ok(())
    }

    /// Validate a transition and return the target state.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidTransition`] naming source, target and the
    /// allowed set.
    pub fn transition(mission: &Mission, target: MissionState) -> Result<MissionState, TransitionError> {
        if Self::can_transition(mission.state, target) {
            Ok(target)
        } else {
            Err(TransitionError::InvalidTransition {
                mission_id: mission.mission_id,
                from: mission.state,
                to: target,
                allowed: Self::allowed_targets(mission.state).to_vec(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewMission;
    use chrono::Duration;

    fn mission_in(state: MissionState) -> Mission {
        let mut mission = Mission::manual(NewMission::default(), "ops", Utc::now());
        mission.state = state;
        mission
    }

    fn expected_adjacency(from: MissionState, to: MissionState) -> bool {
        use MissionState::{
            Aborted, Approved, Archived, Completed, Failed, InProgress, PendingApproval,
        };
        matches!(
            (from, to),
            (PendingApproval, Approved)
                | (Approved, InProgress)
                | (InProgress, Completed | Aborted | Failed | Archived)
        )
    }

    #[test]
    fn test_adjacency_matrix() {
        for from in MissionState::ALL {
            for to in MissionState::ALL {
                let expected = expected_adjacency(from, to);
                assert_eq!(
                    MissionStateMachine::can_transition(from, to),
                    expected,
                    "{from} -> {to}"
                );

                let result = MissionStateMachine::transition(&mission_in(from), to);
                if expected {
                    assert_eq!(result, Ok(to));
                } else {
                    match result {
                        Err(TransitionError::InvalidTransition {
                            from: f,
                            to: t,
                            allowed,
                            ..
                        }) => {
                            assert_eq!(f, from);
                            assert_eq!(t, to);
                            assert_eq!(allowed, MissionStateMachine::allowed_targets(from));
                        }
                        other => panic!("{from} -> {to}: unexpected {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in MissionState::ALL.into_iter().filter(MissionState::is_terminal) {
            assert!(MissionStateMachine::allowed_targets(state).is_empty());
        }
    }

    #[test]
    fn test_can_approve() {
        for state in MissionState::ALL {
            assert_eq!(
                MissionStateMachine::can_approve(&mission_in(state)),
                state == MissionState::PendingApproval
            );
        }
    }

    #[test]
    fn test_can_execute_requires_approved() {
        let now = Utc::now();
        for state in MissionState::ALL {
            assert_eq!(
                MissionStateMachine::can_execute(&mission_in(state), now),
                state == MissionState::Approved
            );
        }
    }

    #[test]
    fn test_future_schedule_rejected_in_every_state() {
        let now = Utc::now();
        for state in MissionState::ALL {
            let mut mission = mission_in(state);
            mission.scheduled_start = Some(now + Duration::minutes(10));
            assert!(matches!(
                MissionStateMachine::check_execute(&mission, now),
                Err(TransitionError::ScheduledInFuture { .. })
            ));
        }
    }

    #[test]
    fn test_schedule_exactly_now_is_due() {
        let now = Utc::now();
        let mut mission = mission_in(MissionState::Approved);
        mission.scheduled_start = Some(now);
        assert!(MissionStateMachine::can_execute(&mission, now));

        mission.scheduled_start = Some(now - Duration::hours(1));
        assert!(MissionStateMachine::can_execute(&mission, now));
    }

    #[test]
    fn test_invalid_transition_message_names_allowed_set() {
        let mission = mission_in(MissionState::InProgress);
        let err = MissionStateMachine::transition(&mission, MissionState::Approved).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("IN_PROGRESS -> APPROVED"));
        assert!(message.contains("COMPLETED, ABORTED, FAILED, ARCHIVED"));

        let done = mission_in(MissionState::Completed);
        let err = MissionStateMachine::transition(&done, MissionState::Archived).unwrap_err();
        assert!(err.to_string().contains("allowed: none"));
    }
}
