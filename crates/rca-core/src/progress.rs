//! Progress accounting
//!
//! ```text
//! overall = Σ weight(agent) × contribution(agent)
//! contribution = 1.0 (done) | progress (working) | 0.0 (waiting, failed)
//! ```

use crate::types::{weight_for_id, Agent, AgentState, AgentStatus};
use std::collections::BTreeMap;

/// Clamp to [0, 1], mapping NaN to 0
#[inline]
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Contribution of one agent to overall progress
#[inline]
#[must_use]
pub fn contribution(status: &AgentStatus) -> f64 {
    match status.status {
        AgentState::Done => 1.0,
        AgentState::Working => clamp_unit(status.progress),
        AgentState::Waiting | AgentState::Failed => 0.0,
    }
}

/// Weighted overall progress of an agent map
#[must_use]
pub fn overall_progress(agents: &BTreeMap<Agent, AgentStatus>) -> f64 {
    let n = agents.len();
    let total: f64 = agents
        .iter()
        .map(|(agent, status)| weight_for_id(agent.as_str(), n) * contribution(status))
        .sum();
    clamp_unit(total)
}
