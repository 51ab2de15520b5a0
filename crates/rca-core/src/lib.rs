//! RCA Core - incident root-cause analysis orchestrator
//!
//! Turns a free-text incident description into ranked hypotheses and
//! remediation steps:
//! - Tracks each request as a task with a checked status lifecycle
//! - Runs Planning, Knowledge, Reasoning, Execution as a sequential pipeline
//! - Reports monotone, weighted progress while the pipeline runs
//! - Honours interruption at any point; interrupted tasks stay interrupted
//! - Records every decision in a hash-chained audit log
//!
//! # Example
//!
//! ```rust,ignore
//! use rca_core::prelude::*;
//!
//! # async fn example(backends: Backends) -> Result<(), RcaError> {
//! let orchestrator = Orchestrator::new(RcaConfig::new(), backends)?;
//! let id = orchestrator.create_task("u1", "service-b CPU usage critical");
//!
//! let snapshot = orchestrator
//!     .wait_for_terminal(id, std::time::Duration::from_millis(100))
//!     .await?;
//! println!("{} at {:.0}%", snapshot.status, snapshot.overall_progress * 100.0);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod analysis;
pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
mod phases;
pub mod plan;
pub mod progress;
pub mod state_machine;
pub mod store;
pub mod types;

pub use analysis::{
    rank_hypotheses, rank_solutions, AnalysisRequest, Hypothesis, Solution, TemplateGenerator,
    TextGenerator,
};
pub use audit::{AuditEvent, AuditKind, AuditLog};
pub use config::RcaConfig;
pub use error::{
    AuditError, ConfigError, ErrorCode, GenerationError, PhaseError, PlanError, RcaError,
    StateMachineError,
};
pub use logging::LogFormat;
pub use orchestrator::{Backends, Orchestrator};
pub use plan::{PlanStep, PlanningSession, SessionStatus, StepStatus};
pub use store::TaskStore;
pub use types::{
    weight_for_id, Agent, AgentState, AgentStatus, FinalResult, IntermediateConclusion, Phase,
    Task, TaskId, TaskSnapshot, TaskStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with RCA Core
    pub use crate::{
        Agent, AgentState, Backends, FinalResult, Orchestrator, RcaConfig, RcaError, TaskId,
        TaskSnapshot, TaskStatus, TemplateGenerator, TextGenerator,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
