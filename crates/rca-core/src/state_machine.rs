//! Task and agent transition tables

use crate::error::StateMachineError;
use crate::types::{AgentState, TaskStatus};

/// Validates a task status transition.
///
/// Illegal transitions are returned as errors; the orchestrator turns them
/// into an `[internal]` failure of that task only.
///
/// # Errors
/// `IllegalTaskTransition` when `to` is not in [`allowed_transitions`]`(from)`
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTaskTransition { from, to })
    }
}

/// Statuses reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> Vec<TaskStatus> {
    use TaskStatus::*;
    match from {
        Queued => vec![Planning, Failed, Interrupted],
        Planning => vec![Executing, Failed, Interrupted],
        Executing => vec![Completed, Failed, Interrupted],
        Completed | Failed | Interrupted => vec![],
    }
}

/// Validates an agent state transition.
///
/// # Errors
/// `IllegalAgentTransition` when `to` is not in [`allowed_agent_transitions`]`(from)`
pub fn validate_agent_transition(from: AgentState, to: AgentState) -> Result<(), StateMachineError> {
    if allowed_agent_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalAgentTransition { from, to })
    }
}

/// Agent states reachable in one step from `from`
#[must_use]
pub fn allowed_agent_transitions(from: AgentState) -> Vec<AgentState> {
    use AgentState::*;
    match from {
        Waiting => vec![Working, Failed],
        Working => vec![Working, Done, Failed],
        Done | Failed => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        validate_transition(TaskStatus::Queued, TaskStatus::Planning).unwrap();
        validate_transition(TaskStatus::Planning, TaskStatus::Executing).unwrap();
        validate_transition(TaskStatus::Executing, TaskStatus::Completed).unwrap();
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Interrupted,
        ] {
            assert!(allowed_transitions(status).is_empty());
            assert!(validate_transition(status, TaskStatus::Executing).is_err());
        }
    }

    #[test]
    fn no_resume_from_interrupted() {
        let err = validate_transition(TaskStatus::Interrupted, TaskStatus::Executing).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::IllegalTaskTransition {
                from: TaskStatus::Interrupted,
                to: TaskStatus::Executing,
            }
        );
    }

    #[test]
    fn skipping_planning_is_illegal() {
        assert!(validate_transition(TaskStatus::Queued, TaskStatus::Executing).is_err());
        assert!(validate_transition(TaskStatus::Queued, TaskStatus::Completed).is_err());
    }

    #[test]
    fn agents_cannot_finish_without_working() {
        assert!(validate_agent_transition(AgentState::Waiting, AgentState::Done).is_err());
        assert!(validate_agent_transition(AgentState::Done, AgentState::Working).is_err());
        validate_agent_transition(AgentState::Working, AgentState::Working).unwrap();
    }
}
