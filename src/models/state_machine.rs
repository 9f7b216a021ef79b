// Diff region status state machine with validation

use super::{Behavior, DiffStatus};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("Invalid diff transition from {from:?} to {to:?}")]
    InvalidTransition { from: DiffStatus, to: DiffStatus },

    #[error("Diff already in terminal state: {0:?}")]
    AlreadyTerminal(DiffStatus),
}

/// Validates if a diff region can transition from one status to another.
/// Pending is the only state that may change; accepted and rejected are final.
pub fn can_transition(from: DiffStatus, to: DiffStatus) -> bool {
    matches!(
        (from, to),
        (DiffStatus::Pending, DiffStatus::Accepted) | (DiffStatus::Pending, DiffStatus::Rejected)
    )
}

/// Validates and performs the transition implied by an accept/reject behavior
pub fn transition_state(
    current: DiffStatus,
    behavior: Behavior,
) -> Result<DiffStatus, StateTransitionError> {
    if is_terminal_state(current) {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    let target = behavior.terminal_status();
    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a status is a terminal state
pub fn is_terminal_state(status: DiffStatus) -> bool {
    matches!(status, DiffStatus::Accepted | DiffStatus::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_accepted() {
        assert!(can_transition(DiffStatus::Pending, DiffStatus::Accepted));
        let result = transition_state(DiffStatus::Pending, Behavior::Accept);
        assert_eq!(result, Ok(DiffStatus::Accepted));
    }

    #[test]
    fn test_pending_to_rejected() {
        assert!(can_transition(DiffStatus::Pending, DiffStatus::Rejected));
        let result = transition_state(DiffStatus::Pending, Behavior::Reject);
        assert_eq!(result, Ok(DiffStatus::Rejected));
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!can_transition(DiffStatus::Accepted, DiffStatus::Rejected));
        assert!(!can_transition(DiffStatus::Rejected, DiffStatus::Accepted));
        assert!(!can_transition(DiffStatus::Accepted, DiffStatus::Pending));

        let result = transition_state(DiffStatus::Accepted, Behavior::Reject);
        assert_eq!(
            result,
            Err(StateTransitionError::AlreadyTerminal(DiffStatus::Accepted))
        );
    }

    #[test]
    fn test_pending_is_not_a_target() {
        assert!(!can_transition(DiffStatus::Pending, DiffStatus::Pending));
    }

    #[test]
    fn test_is_terminal_state() {
        assert!(!is_terminal_state(DiffStatus::Pending));
        assert!(is_terminal_state(DiffStatus::Accepted));
        assert!(is_terminal_state(DiffStatus::Rejected));
    }
}
