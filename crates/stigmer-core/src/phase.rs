//! Execution phase machine: `PENDING → RUNNING → {COMPLETED, FAILED,
//! CANCELLED}`, no backward transitions.

use stigmer_api::v1::ExecutionPhase;

/// True when the phase is terminal.
#[must_use]
pub fn is_terminal(phase: ExecutionPhase) -> bool {
    matches!(
        phase,
        ExecutionPhase::Completed | ExecutionPhase::Failed | ExecutionPhase::Cancelled
    )
}

/// True when `from → to` is a legal transition.
///
/// Re-asserting the current phase is allowed so status writes are
/// idempotent under retries.
#[must_use]
pub fn can_transition(from: ExecutionPhase, to: ExecutionPhase) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        // An execution that never got a phase may take any first step.
        (ExecutionPhase::Unspecified, _) => true,
        (ExecutionPhase::Pending, ExecutionPhase::Running) => true,
        (
            ExecutionPhase::Pending | ExecutionPhase::Running,
            ExecutionPhase::Completed | ExecutionPhase::Failed | ExecutionPhase::Cancelled,
        ) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(can_transition(ExecutionPhase::Pending, ExecutionPhase::Running));
        assert!(can_transition(ExecutionPhase::Running, ExecutionPhase::Completed));
        assert!(can_transition(ExecutionPhase::Running, ExecutionPhase::Failed));
        assert!(can_transition(ExecutionPhase::Pending, ExecutionPhase::Cancelled));
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(!can_transition(ExecutionPhase::Running, ExecutionPhase::Pending));
        assert!(!can_transition(ExecutionPhase::Completed, ExecutionPhase::Running));
        assert!(!can_transition(ExecutionPhase::Failed, ExecutionPhase::Completed));
        assert!(!can_transition(ExecutionPhase::Cancelled, ExecutionPhase::Pending));
    }

    #[test]
    fn reassertion_is_idempotent() {
        assert!(can_transition(ExecutionPhase::Running, ExecutionPhase::Running));
        assert!(can_transition(ExecutionPhase::Completed, ExecutionPhase::Completed));
    }

    #[test]
    fn terminal_phases() {
        assert!(is_terminal(ExecutionPhase::Completed));
        assert!(is_terminal(ExecutionPhase::Failed));
        assert!(is_terminal(ExecutionPhase::Cancelled));
        assert!(!is_terminal(ExecutionPhase::Pending));
        assert!(!is_terminal(ExecutionPhase::Running));
    }
}
