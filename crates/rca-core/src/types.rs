//! Core types for RCA tasks
//!
//! A [`Task`] owns its agents, plan versions, conclusions, and final result.
//! All mutation goes through methods that check the state machine, so a value
//! of this type never holds an impossible status combination.

use crate::analysis::{Hypothesis, Solution};
use crate::error::{RcaError, StateMachineError};
use crate::plan::PlanningSession;
use crate::progress;
use crate::state_machine::{validate_agent_transition, validate_transition};
use chrono::{DateTime, Utc};
use rca_retrieval::EvidenceItem;
use rca_topology::TopologyView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Create new unique ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim()).map(Self)
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, pipeline not started
    Queued,
    /// Planning phase running
    Planning,
    /// Knowledge, reasoning, or execution running
    Executing,
    /// Finished with a result
    Completed,
    /// A phase failed
    Failed,
    /// Stopped by the user
    Interrupted,
}

impl TaskStatus {
    /// Terminal statuses never change again
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    /// Lowercase name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    /// Builds the plan
    Planner,
    /// Gathers evidence and topology
    Knowledge,
    /// Produces root-cause hypotheses
    Reasoning,
    /// Produces remediation
    Executor,
}

impl Agent {
    /// All agents, in pipeline order
    pub const ALL: [Agent; 4] = [
        Agent::Planner,
        Agent::Knowledge,
        Agent::Reasoning,
        Agent::Executor,
    ];

    /// Progress weight; the table sums to 1.0
    #[inline]
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Agent::Planner => 0.15,
            Agent::Knowledge => 0.40,
            Agent::Reasoning => 0.25,
            Agent::Executor => 0.20,
        }
    }

    /// Lowercase id
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Agent::Planner => "planner",
            Agent::Knowledge => "knowledge",
            Agent::Reasoning => "reasoning",
            Agent::Executor => "executor",
        }
    }
}

impl FromStr for Agent {
    type Err = RcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planner" => Ok(Agent::Planner),
            "knowledge" => Ok(Agent::Knowledge),
            "reasoning" => Ok(Agent::Reasoning),
            "executor" => Ok(Agent::Executor),
            _ => Err(RcaError::UnknownAgent(s.to_string())),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight for an agent id arriving as a string
///
/// Unknown ids get the uniform weight `1 / n`.
#[must_use]
pub fn weight_for_id(id: &str, n: usize) -> f64 {
    match id.parse::<Agent>() {
        Ok(agent) => agent.weight(),
        #[allow(clippy::cast_precision_loss)]
        Err(_) => 1.0 / n.max(1) as f64,
    }
}

/// Pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Plan construction
    Planning,
    /// Evidence + topology
    Knowledge,
    /// Hypothesis generation
    Reasoning,
    /// Remediation and final result
    Execution,
}

impl Phase {
    /// All phases, in order
    pub const ALL: [Phase; 4] = [
        Phase::Planning,
        Phase::Knowledge,
        Phase::Reasoning,
        Phase::Execution,
    ];

    /// Agent that runs this phase
    #[inline]
    #[must_use]
    pub const fn agent(self) -> Agent {
        match self {
            Phase::Planning => Agent::Planner,
            Phase::Knowledge => Agent::Knowledge,
            Phase::Reasoning => Agent::Reasoning,
            Phase::Execution => Agent::Executor,
        }
    }

    /// Task status while this phase runs
    #[inline]
    #[must_use]
    pub const fn task_status(self) -> TaskStatus {
        match self {
            Phase::Planning => TaskStatus::Planning,
            _ => TaskStatus::Executing,
        }
    }

    /// Lowercase name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Knowledge => "knowledge",
            Phase::Reasoning => "reasoning",
            Phase::Execution => "execution",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Not started
    Waiting,
    /// Running
    Working,
    /// Finished
    Done,
    /// Failed
    Failed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentState::Waiting => "waiting",
            AgentState::Working => "working",
            AgentState::Done => "done",
            AgentState::Failed => "failed",
        })
    }
}

/// State of one agent inside a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent
    pub agent: Agent,
    /// Lifecycle state
    pub status: AgentState,
    /// Progress in [0, 1]
    pub progress: f64,
    /// Latest summary produced by the agent
    pub last_conclusion: Option<String>,
}

impl AgentStatus {
    /// Waiting agent with zero progress
    #[must_use]
    pub fn waiting(agent: Agent) -> Self {
        Self {
            agent,
            status: AgentState::Waiting,
            progress: 0.0,
            last_conclusion: None,
        }
    }
}

/// Summary produced by an agent mid-pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateConclusion {
    /// Producing agent
    pub agent: Agent,
    /// One-line summary
    pub summary: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// When produced
    pub produced_at: DateTime<Utc>,
    /// Structured payload
    pub data: serde_json::Value,
}

impl IntermediateConclusion {
    /// Create conclusion; confidence is clamped to [0, 1]
    #[must_use]
    pub fn new(agent: Agent, summary: impl Into<String>, confidence: f64) -> Self {
        Self {
            agent,
            summary: summary.into(),
            confidence: progress::clamp_unit(confidence),
            produced_at: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// With structured payload
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Result of a completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Root-cause candidates, most confident first
    pub hypotheses: Vec<Hypothesis>,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    /// Remediation, by priority
    pub solutions: Vec<Solution>,
    /// Evidence the analysis was based on
    pub evidence: Vec<EvidenceItem>,
    /// Topology around the affected services
    pub topology: TopologyView,
    /// Retrieval ran in a degraded mode
    pub degraded: bool,
}

/// One RCA request and everything known about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier
    pub task_id: TaskId,
    /// Requesting user
    pub user_id: String,
    /// Incident description
    pub message: String,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Phase running or last run
    pub current_phase: Option<Phase>,
    /// Weighted progress, recomputed after every mutation
    pub overall_progress: f64,
    /// True while an interrupt would take effect
    pub can_interrupt: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Failure reason, `[code] message`
    pub error_message: Option<String>,
    /// Reason passed to interrupt
    pub interrupt_reason: Option<String>,
    /// Plan versions, oldest first
    pub planning_sessions: Vec<PlanningSession>,
    /// Agent states
    pub agents: BTreeMap<Agent, AgentStatus>,
    /// Append-only conclusions
    pub conclusions: Vec<IntermediateConclusion>,
    /// Set on completion
    pub final_result: Option<FinalResult>,
}

/// Owned, consistent copy of a task handed to pollers
pub type TaskSnapshot = Task;

impl Task {
    /// Queued task with all agents waiting
    #[must_use]
    pub fn new(task_id: TaskId, user_id: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            user_id: user_id.into(),
            message: message.into(),
            status: TaskStatus::Queued,
            current_phase: None,
            overall_progress: 0.0,
            can_interrupt: true,
            created_at: now,
            updated_at: now,
            error_message: None,
            interrupt_reason: None,
            planning_sessions: Vec::new(),
            agents: Agent::ALL
                .into_iter()
                .map(|a| (a, AgentStatus::waiting(a)))
                .collect(),
            conclusions: Vec::new(),
            final_result: None,
        }
    }

    /// True once completed, failed, or interrupted
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// State of `agent`
    ///
    /// Every task holds all four agents from construction on.
    #[must_use]
    pub fn agent(&self, agent: Agent) -> Option<&AgentStatus> {
        self.agents.get(&agent)
    }

    /// Latest plan version
    #[must_use]
    pub fn current_plan(&self) -> Option<&PlanningSession> {
        self.planning_sessions.last()
    }

    /// Move to `to`, checking the transition table
    ///
    /// # Errors
    /// `IllegalTaskTransition` when `to` is not reachable from the current status
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), StateMachineError> {
        if self.status == to {
            return Ok(());
        }
        validate_transition(self.status, to)?;
        self.status = to;
        self.can_interrupt = !to.is_terminal();
        self.touch();
        Ok(())
    }

    /// Update an agent's state and progress
    ///
    /// A working agent's progress never moves backwards; `Done` forces 1.0.
    ///
    /// # Errors
    /// - `IllegalAgentTransition` for moves outside the table
    /// - `InvalidProgress` for NaN or values outside [0, 1]
    pub fn update_agent(
        &mut self,
        agent: Agent,
        state: AgentState,
        progress: Option<f64>,
    ) -> Result<(), RcaError> {
        if let Some(p) = progress {
            if !(0.0..=1.0).contains(&p) {
                return Err(RcaError::InvalidProgress(p));
            }
        }
        let entry = self
            .agents
            .entry(agent)
            .or_insert_with(|| AgentStatus::waiting(agent));
        validate_agent_transition(entry.status, state)?;
        entry.status = state;
        match state {
            AgentState::Done => entry.progress = 1.0,
            AgentState::Working => {
                if let Some(p) = progress {
                    entry.progress = entry.progress.max(p);
                }
            }
            AgentState::Waiting | AgentState::Failed => {}
        }
        self.recompute_progress();
        self.touch();
        Ok(())
    }

    /// Record a conclusion and mirror its summary on the agent
    pub fn push_conclusion(&mut self, conclusion: IntermediateConclusion) {
        if let Some(status) = self.agents.get_mut(&conclusion.agent) {
            status.last_conclusion = Some(conclusion.summary.clone());
        }
        self.conclusions.push(conclusion);
        self.touch();
    }

    /// Recompute the cached overall progress from the agent map
    pub fn recompute_progress(&mut self) {
        self.overall_progress = progress::overall_progress(&self.agents);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
