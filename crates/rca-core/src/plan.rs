//! Versioned planning sessions
//!
//! A session is immutable once appended to a task. Status changes and
//! revisions produce a new session with the next version number.
//!
//! Steps form a DAG over their `dependencies`; sessions are validated on
//! construction (unique ids, known dependencies, no cycles).

use crate::error::PlanError;
use crate::types::Agent;
use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use ulid::Ulid;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Plan drafted, not started
    Planning,
    /// Steps running
    Executing,
    /// All steps finished
    Completed,
}

/// Step lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started
    Pending,
    /// Running
    Executing,
    /// Finished
    Completed,
    /// Failed
    Failed,
}

/// One unit of planned work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Id, unique within the plan
    pub step_id: String,
    /// Human-readable name
    pub name: String,
    /// Agent responsible
    pub assigned_agent: Agent,
    /// Steps that must complete first
    pub dependencies: BTreeSet<String>,
    /// Lifecycle state
    pub status: StepStatus,
}

impl PlanStep {
    /// Pending step with no dependencies
    #[must_use]
    pub fn new(step_id: impl Into<String>, name: impl Into<String>, agent: Agent) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            assigned_agent: agent,
            dependencies: BTreeSet::new(),
            status: StepStatus::Pending,
        }
    }

    /// Add a dependency
    #[inline]
    #[must_use]
    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.insert(step_id.into());
        self
    }
}

/// One version of a task's plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSession {
    /// Unique id of this version
    pub session_id: Ulid,
    /// Monotonic per task, starting at 1
    pub version: u32,
    /// What the plan is for
    pub description: String,
    /// Lifecycle
    pub status: SessionStatus,
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
    /// When this version was created
    pub created_at: DateTime<Utc>,
}

impl PlanningSession {
    /// Validate `steps` and build version `version`
    ///
    /// Steps are stored in dependency order.
    ///
    /// # Errors
    /// See [`validate_steps`]
    pub fn new(
        version: u32,
        description: impl Into<String>,
        status: SessionStatus,
        steps: Vec<PlanStep>,
    ) -> Result<Self, PlanError> {
        let order = validate_steps(&steps)?;
        let mut steps = steps;
        steps.sort_by_key(|s| order.iter().position(|id| *id == s.step_id));
        Ok(Self {
            session_id: Ulid::new(),
            version,
            description: description.into(),
            status,
            steps,
            created_at: Utc::now(),
        })
    }

    /// Next version with `status`, applying `update` to a copy of the steps
    ///
    /// # Errors
    /// Propagates validation errors for the revised steps
    pub fn next_version(
        &self,
        status: SessionStatus,
        update: impl FnOnce(&mut Vec<PlanStep>),
    ) -> Result<Self, PlanError> {
        let mut steps = self.steps.clone();
        update(&mut steps);
        Self::new(self.version + 1, self.description.clone(), status, steps)
    }

    /// Step by id
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Check that every dependency of `step_id` completed
    ///
    /// # Errors
    /// `UnknownStep` or `Blocked` naming the first incomplete dependency
    pub fn ensure_startable(&self, step_id: &str) -> Result<(), PlanError> {
        let step = self
            .step(step_id)
            .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;
        for dep in &step.dependencies {
            let done = self
                .step(dep)
                .is_some_and(|d| d.status == StepStatus::Completed);
            if !done {
                return Err(PlanError::Blocked {
                    step: step_id.to_string(),
                    blocked_by: dep.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Set the status of every step assigned to `agent`
pub fn set_agent_steps(steps: &mut [PlanStep], agent: Agent, status: StepStatus) {
    for step in steps.iter_mut().filter(|s| s.assigned_agent == agent) {
        step.status = status;
    }
}

/// Validate step ids and dependencies, returning a topological order
///
/// # Errors
/// - `Empty` for no steps
/// - `DuplicateStep` for a repeated id
/// - `UnknownDependency` for a dependency outside the plan
/// - `Cycle` when dependencies loop
pub fn validate_steps(steps: &[PlanStep]) -> Result<Vec<String>, PlanError> {
    if steps.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut ids = HashSet::new();
    for step in steps {
        if !ids.insert(step.step_id.as_str()) {
            return Err(PlanError::DuplicateStep(step.step_id.clone()));
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for step in steps {
        graph.add_node(step.step_id.as_str());
        for dep in &step.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(PlanError::UnknownDependency {
                    step: step.step_id.clone(),
                    dependency: dep.clone(),
                });
            }
            graph.add_edge(dep.as_str(), step.step_id.as_str(), ());
        }
    }

    toposort(&graph, None)
        .map(|order| order.into_iter().map(String::from).collect())
        .map_err(|cycle| PlanError::Cycle(cycle.node_id().to_string()))
}

/// Default three-step plan for an incident description
#[must_use]
pub fn default_steps() -> Vec<PlanStep> {
    vec![
        PlanStep::new("gather-evidence", "Gather evidence and topology", Agent::Knowledge),
        PlanStep::new("analyze-root-cause", "Rank root-cause hypotheses", Agent::Reasoning)
            .after("gather-evidence"),
        PlanStep::new("recommend-remediation", "Recommend remediation", Agent::Executor)
            .after("analyze-root-cause"),
    ]
}
