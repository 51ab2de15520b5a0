//! Error types for RCA Core
//!
//! Provides error handling for:
//! - Task lookup and lifecycle violations
//! - Phase failures, classified by [`ErrorCode`]
//! - The external text-generation seam
//! - Plan validation and configuration loading
//!
//! Cancellation is a task status, not a failure. [`PhaseError::Cancelled`]
//! only unwinds the pipeline and never becomes an `error_message`.

use crate::types::{AgentState, TaskId, TaskStatus};
use rca_retrieval::RetrievalError;
use std::fmt;
use std::time::Duration;

/// Main RCA error type
#[derive(Debug, thiserror::Error)]
pub enum RcaError {
    /// No task with this id
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Task already reached a terminal status and is immutable
    #[error("task {id} is already {status}")]
    TaskTerminal {
        /// Task id
        id: TaskId,
        /// Terminal status
        status: TaskStatus,
    },

    /// Agent id outside the closed set
    #[error("unknown agent id: {0:?}")]
    UnknownAgent(String),

    /// Progress value outside [0, 1] or not a number
    #[error("invalid progress value {0}")]
    InvalidProgress(f64),

    /// Illegal status change
    #[error("state machine violation: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Plan rejected
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RcaError {
    /// True for lifecycle violations that mark the task `failed` with `[internal]`
    #[inline]
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownAgent(_) | Self::InvalidProgress(_) | Self::StateMachine(_)
        )
    }
}

/// Illegal transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Task status change not in the transition table
    #[error("illegal task transition {from} -> {to}")]
    IllegalTaskTransition {
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },

    /// Agent status change not in the transition table
    #[error("illegal agent transition {from} -> {to}")]
    IllegalAgentTransition {
        /// Current state
        from: AgentState,
        /// Requested state
        to: AgentState,
    },
}

/// Plan validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Plan has no steps
    #[error("plan has no steps")]
    Empty,

    /// Two steps share an id
    #[error("duplicate step id {0:?}")]
    DuplicateStep(String),

    /// Dependency names a step that does not exist
    #[error("step {step:?} depends on unknown step {dependency:?}")]
    UnknownDependency {
        /// Dependent step
        step: String,
        /// Missing dependency
        dependency: String,
    },

    /// Dependencies form a cycle
    #[error("plan dependencies contain a cycle through {0:?}")]
    Cycle(String),

    /// Step id not in the plan
    #[error("no step {0:?} in plan")]
    UnknownStep(String),

    /// Step started before its dependencies completed
    #[error("step {step:?} is blocked by {blocked_by:?}")]
    Blocked {
        /// Step that was started
        step: String,
        /// First incomplete dependency
        blocked_by: String,
    },
}

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or type error
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Errors from the external text-generation service
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// Service could not be reached
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its deadline
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Service answered with something unusable
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Transport-level failures are worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Failure classification carried into `error_message`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Dependency unreachable
    Transport,
    /// Dependency too slow
    Timeout,
    /// Generation service returned an unusable answer
    Generation,
    /// Lifecycle invariant broken or pipeline panicked
    Internal,
    /// Retrieval rejected the request
    Retrieval,
}

impl ErrorCode {
    /// Code as rendered in `[code] message`
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Transport => "transport",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Generation => "generation",
            ErrorCode::Internal => "internal",
            ErrorCode::Retrieval => "retrieval",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a phase stopped
#[derive(Debug, Clone, thiserror::Error)]
pub enum PhaseError {
    /// Phase failed; the task becomes `failed`
    #[error("[{code}] {message}")]
    Failed {
        /// Classification
        code: ErrorCode,
        /// Human-readable detail
        message: String,
    },

    /// Task was interrupted while the phase ran
    #[error("phase cancelled")]
    Cancelled,
}

impl PhaseError {
    /// Failure with an explicit code
    #[must_use]
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    /// Lifecycle invariant failure
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::failed(ErrorCode::Internal, message)
    }

    /// Failure code, `None` for cancellation
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Failed { code, .. } => Some(*code),
            Self::Cancelled => None,
        }
    }

    /// Check if the phase was cancelled rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<GenerationError> for PhaseError {
    fn from(err: GenerationError) -> Self {
        let code = match err {
            GenerationError::Unavailable(_) => ErrorCode::Transport,
            GenerationError::Timeout(_) => ErrorCode::Timeout,
            GenerationError::InvalidResponse(_) => ErrorCode::Generation,
        };
        Self::failed(code, err.to_string())
    }
}

impl From<RetrievalError> for PhaseError {
    fn from(err: RetrievalError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::failed(ErrorCode::Retrieval, err.to_string())
        }
    }
}

impl From<RcaError> for PhaseError {
    fn from(err: RcaError) -> Self {
        match err {
            RcaError::TaskTerminal { .. } => Self::Cancelled,
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<PlanError> for PhaseError {
    fn from(err: PlanError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Audit chain failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Hash chain broken at `sequence`
    #[error("audit chain broken at event {sequence}")]
    IntegrityViolation {
        /// First bad event
        sequence: u64,
    },
}
