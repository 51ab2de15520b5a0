//! Pipeline phases
//!
//! Planning → Knowledge → Reasoning → Execution, strictly sequential. Each
//! phase:
//! - checks the task's cancellation token before starting
//! - marks its agent `working` and appends a plan version
//! - races its work against the token
//! - on success marks its agent `done`; on failure marks agent and task
//!   `failed` with `[code] message` and stops the pipeline
//!
//! Every state change goes through [`TaskStore::mutate`], which refuses
//! writes once the task is terminal. An interrupted task therefore stops at
//! the next write or the next token check, whichever comes first.
//!
//! [`TaskStore::mutate`]: crate::store::TaskStore::mutate

use crate::analysis::{rank_hypotheses, rank_solutions, AnalysisRequest, Hypothesis};
use crate::audit::AuditKind;
use crate::error::{GenerationError, PhaseError, PlanError, RcaError};
use crate::orchestrator::Inner;
use crate::plan::{default_steps, set_agent_steps, PlanningSession, SessionStatus, StepStatus};
use crate::types::{
    Agent, AgentState, FinalResult, IntermediateConclusion, Phase, Task, TaskId, TaskStatus,
};
use futures::future::join_all;
use rca_entity::Entities;
use rca_retrieval::{EvidenceItem, Fingerprint, SearchOutcome, SearchRequest};
use rca_topology::TopologyView;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the knowledge phase hands to reasoning
#[derive(Debug, Clone)]
struct Knowledge {
    entities: Entities,
    evidence: Vec<EvidenceItem>,
    topology: TopologyView,
    degraded: bool,
}

pub(crate) struct Pipeline {
    inner: Arc<Inner>,
    id: TaskId,
    cancel: CancellationToken,
}

impl Pipeline {
    pub(crate) fn new(inner: Arc<Inner>, id: TaskId, cancel: CancellationToken) -> Self {
        Self { inner, id, cancel }
    }

    /// Run to a terminal status
    ///
    /// Failures are recorded on the task, so nothing is returned.
    #[tracing::instrument(skip_all, fields(task_id = %self.id))]
    pub(crate) async fn run(self) {
        match self.execute().await {
            Ok(()) => tracing::info!("task completed"),
            Err(PhaseError::Cancelled) => tracing::info!("task interrupted, pipeline stopped"),
            Err(err) => tracing::warn!(error = %err, "task failed"),
        }
    }

    async fn execute(&self) -> Result<(), PhaseError> {
        let message = self.inner.store.snapshot(self.id)?.message;

        self.phase(Phase::Planning, self.planning(&message)).await?;
        let knowledge = self.phase(Phase::Knowledge, self.knowledge(&message)).await?;

        let request = AnalysisRequest {
            query: message,
            entities: knowledge.entities,
            evidence: knowledge.evidence,
            topology: knowledge.topology,
        };
        let hypotheses = self.phase(Phase::Reasoning, self.reasoning(&request)).await?;
        let result = self
            .phase(
                Phase::Execution,
                self.execution(request, hypotheses, knowledge.degraded),
            )
            .await?;

        self.complete(result)
    }

    #[tracing::instrument(skip_all, fields(phase = %phase))]
    async fn phase<T>(
        &self,
        phase: Phase,
        work: impl Future<Output = Result<T, PhaseError>>,
    ) -> Result<T, PhaseError> {
        if self.cancel.is_cancelled() {
            return Err(PhaseError::Cancelled);
        }
        if let Err(err) = self.begin(phase) {
            return Err(self.record_failure(phase, err));
        }

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PhaseError::Cancelled),
            result = work => result,
        };

        match outcome.and_then(|value| self.finish(phase).map(|()| value)) {
            Ok(value) => Ok(value),
            Err(PhaseError::Cancelled) => Err(PhaseError::Cancelled),
            Err(err) => Err(self.record_failure(phase, err)),
        }
    }

    fn begin(&self, phase: Phase) -> Result<(), PhaseError> {
        let agent = phase.agent();
        self.inner.store.mutate(self.id, |task| {
            task.transition(phase.task_status())?;
            task.current_phase = Some(phase);
            if phase != Phase::Planning {
                advance_plan(task, agent)?;
            }
            task.update_agent(agent, AgentState::Working, Some(0.0))
        })?;
        if phase != Phase::Planning {
            self.inner
                .audit
                .append(self.id, AuditKind::PlanRevised, format!("{agent} started"));
        }
        self.inner
            .audit
            .append(self.id, AuditKind::PhaseStarted, phase.as_str());
        tracing::debug!(%agent, "phase started");
        Ok(())
    }

    fn finish(&self, phase: Phase) -> Result<(), PhaseError> {
        self.inner.store.mutate(self.id, |task| {
            task.update_agent(phase.agent(), AgentState::Done, None)
        })?;
        self.inner
            .audit
            .append(self.id, AuditKind::PhaseCompleted, phase.as_str());
        Ok(())
    }

    /// Mark agent and task failed; returns the error for propagation
    fn record_failure(&self, phase: Phase, err: PhaseError) -> PhaseError {
        if err.is_cancelled() {
            return err;
        }
        let message = err.to_string();
        let recorded = self.inner.store.mutate(self.id, |task| {
            task.update_agent(phase.agent(), AgentState::Failed, None)?;
            task.transition(TaskStatus::Failed)?;
            task.error_message = Some(message.clone());
            Ok(())
        });
        match recorded {
            Ok(()) => {}
            // Interrupted while failing: interruption wins.
            Err(RcaError::TaskTerminal { .. }) => return PhaseError::Cancelled,
            Err(other) => {
                tracing::error!(error = %other, "could not record phase failure");
                if let Err(e) = self.inner.store.fail(self.id, &message) {
                    tracing::error!(error = %e, "task vanished while failing");
                }
            }
        }
        self.inner
            .audit
            .append(self.id, AuditKind::PhaseFailed, format!("{phase}: {message}"));
        tracing::warn!(%phase, error = %message, "phase failed");
        err
    }

    fn progress(&self, agent: Agent, value: f64) -> Result<(), PhaseError> {
        self.inner.store.mutate(self.id, |task| {
            task.update_agent(agent, AgentState::Working, Some(value))
        })?;
        Ok(())
    }

    fn conclude(&self, conclusion: IntermediateConclusion) -> Result<(), PhaseError> {
        self.inner.store.mutate(self.id, |task| {
            task.push_conclusion(conclusion);
            Ok(())
        })?;
        Ok(())
    }

    async fn planning(&self, message: &str) -> Result<(), PhaseError> {
        let session = PlanningSession::new(
            1,
            format!("Root-cause analysis: {}", summarize(message)),
            SessionStatus::Planning,
            default_steps(),
        )?;
        let steps = session.steps.len();

        self.inner.store.mutate(self.id, |task| {
            task.planning_sessions.push(session);
            task.update_agent(Agent::Planner, AgentState::Working, Some(0.5))
        })?;
        self.inner
            .audit
            .append(self.id, AuditKind::PlanRevised, "version 1");

        self.conclude(
            IntermediateConclusion::new(Agent::Planner, format!("Planned {steps} steps"), 1.0)
                .with_data(serde_json::json!({ "steps": steps })),
        )
    }

    async fn knowledge(&self, message: &str) -> Result<Knowledge, PhaseError> {
        let settings = &self.inner.config.retrieval;

        let retrieval = async {
            let request = SearchRequest::new(message, settings.default_limit, settings.alpha);
            let outcome = self.inner.retrieval.search_with(request, &self.cancel).await?;
            self.progress(Agent::Knowledge, 0.5)?;
            Ok::<_, PhaseError>(outcome)
        };

        let graph = async {
            let entities = self.inner.extractor.extract(message);
            self.progress(Agent::Knowledge, 0.1)?;
            let topology = self
                .inner
                .topology
                .get_topology(entities.services.as_slice())
                .await;
            self.progress(Agent::Knowledge, 0.3)?;
            Ok::<_, PhaseError>((entities, topology))
        };

        let (main, graph) = tokio::join!(retrieval, graph);
        let main = main?;
        let (entities, topology) = graph?;

        let scoped = join_all(
            entities
                .services
                .iter()
                .take(settings.max_scoped_services)
                .map(|service| {
                    let request =
                        SearchRequest::new(message, settings.scoped_search_limit, settings.alpha)
                            .scoped(service);
                    self.inner.retrieval.search_with(request, &self.cancel)
                }),
        )
        .await;

        let mut outcomes = vec![main];
        for outcome in scoped {
            outcomes.push(outcome?);
        }
        self.progress(Agent::Knowledge, 0.9)?;

        let degraded = outcomes.iter().any(SearchOutcome::is_degraded);
        let evidence = merge_evidence(outcomes);

        self.conclude(
            IntermediateConclusion::new(
                Agent::Knowledge,
                format!(
                    "Collected {} evidence items and {} relations",
                    evidence.len(),
                    topology.relations.len()
                ),
                evidence.first().map_or(0.0, |e| e.hybrid_score),
            )
            .with_data(serde_json::json!({
                "evidence": evidence.len(),
                "services": entities.services,
                "metrics": entities.metric_names(),
                "relations": topology.relations.len(),
                "impacted": topology.impacted,
                "degraded": degraded,
            })),
        )?;

        tracing::info!(
            evidence = evidence.len(),
            services = entities.services.len(),
            relations = topology.relations.len(),
            degraded,
            "knowledge gathered"
        );

        Ok(Knowledge {
            entities,
            evidence,
            topology,
            degraded,
        })
    }

    async fn reasoning(&self, request: &AnalysisRequest) -> Result<Vec<Hypothesis>, PhaseError> {
        let hypotheses = self.generate(self.inner.generator.analyze(request)).await?;
        let hypotheses = rank_hypotheses(hypotheses);

        let (summary, confidence) = hypotheses.first().map_or_else(
            || ("No hypothesis produced".to_string(), 0.0),
            |h| (h.description.clone(), h.confidence),
        );
        self.conclude(
            IntermediateConclusion::new(Agent::Reasoning, summary, confidence)
                .with_data(serde_json::json!({ "hypotheses": hypotheses.len() })),
        )?;
        Ok(hypotheses)
    }

    async fn execution(
        &self,
        request: AnalysisRequest,
        hypotheses: Vec<Hypothesis>,
        degraded: bool,
    ) -> Result<FinalResult, PhaseError> {
        let solutions = self
            .generate(self.inner.generator.recommend(&request, &hypotheses))
            .await?;
        let solutions = rank_solutions(solutions);
        let confidence = hypotheses.first().map_or(0.0, |h| h.confidence);

        self.conclude(
            IntermediateConclusion::new(
                Agent::Executor,
                format!("Proposed {} solutions", solutions.len()),
                confidence,
            )
            .with_data(serde_json::json!({ "solutions": solutions.len() })),
        )?;

        Ok(FinalResult {
            hypotheses,
            confidence,
            solutions,
            evidence: request.evidence,
            topology: request.topology,
            degraded,
        })
    }

    async fn generate<T>(
        &self,
        call: impl Future<Output = Result<T, GenerationError>>,
    ) -> Result<T, PhaseError> {
        let timeout = self.inner.config.timeouts.generation();
        let result = tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(GenerationError::Timeout(timeout)));
        result.map_err(|e| {
            tracing::warn!(error = %e, retryable = e.is_retryable(), "generation call failed");
            e.into()
        })
    }

    fn complete(&self, result: FinalResult) -> Result<(), PhaseError> {
        self.inner.store.mutate(self.id, |task| {
            if let Some(current) = task.current_plan() {
                let fin = current.next_version(SessionStatus::Completed, |steps| {
                    for step in steps.iter_mut() {
                        step.status = StepStatus::Completed;
                    }
                })?;
                task.planning_sessions.push(fin);
            }
            task.final_result = Some(result);
            task.transition(TaskStatus::Completed)?;
            task.recompute_progress();
            Ok(())
        })?;
        self.inner.audit.append(self.id, AuditKind::Completed, "");
        Ok(())
    }
}

/// Append the next plan version with `agent`'s steps started
///
/// Steps of agents earlier in the pipeline are completed first, then the
/// new steps are checked against their dependencies.
fn advance_plan(task: &mut Task, agent: Agent) -> Result<(), RcaError> {
    let Some(current) = task.current_plan() else {
        return Err(PlanError::Empty.into());
    };
    let mut next = current.next_version(SessionStatus::Executing, |steps| {
        for earlier in Agent::ALL.iter().take_while(|a| **a != agent) {
            set_agent_steps(steps, *earlier, StepStatus::Completed);
        }
    })?;
    let starting: Vec<String> = next
        .steps
        .iter()
        .filter(|s| s.assigned_agent == agent)
        .map(|s| s.step_id.clone())
        .collect();
    for step_id in &starting {
        next.ensure_startable(step_id)?;
    }
    set_agent_steps(&mut next.steps, agent, StepStatus::Executing);
    task.planning_sessions.push(next);
    Ok(())
}

/// Deduplicate by fingerprint keeping the best score, then rank
fn merge_evidence(outcomes: Vec<SearchOutcome>) -> Vec<EvidenceItem> {
    let mut by_fingerprint: HashMap<Fingerprint, usize> = HashMap::new();
    let mut merged: Vec<EvidenceItem> = Vec::new();
    for item in outcomes.into_iter().flat_map(|o| o.items) {
        let key = Fingerprint::of(&item.content);
        match by_fingerprint.get(&key) {
            Some(&idx) => {
                tracing::trace!(fingerprint = %key.short(), "duplicate evidence merged");
                if item.hybrid_score > merged[idx].hybrid_score {
                    merged[idx] = item;
                }
            }
            None => {
                by_fingerprint.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
    merged
}

fn summarize(message: &str) -> String {
    const MAX_CHARS: usize = 80;
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rca_retrieval::SourceType;

    fn item(content: &str, score: f64) -> EvidenceItem {
        EvidenceItem {
            content: content.to_string(),
            source_type: SourceType::Logs,
            service_name: Some("svc".into()),
            source_locator: None,
            timestamp: None,
            vector_score: score,
            lexical_score: 0.0,
            hybrid_score: score,
        }
    }

    #[test]
    fn merge_keeps_best_copy_and_ranks() {
        let a = SearchOutcome {
            items: vec![item("Redis timeout", 0.5), item("disk full", 0.4)],
            ..SearchOutcome::empty()
        };
        let b = SearchOutcome {
            items: vec![item("redis   TIMEOUT", 0.7)],
            ..SearchOutcome::empty()
        };
        let merged = merge_evidence(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].hybrid_score, 0.7);
        assert_eq!(merged[1].content, "disk full");
    }

    #[test]
    fn plan_advances_one_agent_at_a_time() {
        let mut task = Task::new(TaskId::new(), "u1", "m");
        task.planning_sessions.push(
            PlanningSession::new(1, "d", SessionStatus::Planning, default_steps()).unwrap(),
        );

        advance_plan(&mut task, Agent::Knowledge).unwrap();
        advance_plan(&mut task, Agent::Reasoning).unwrap();

        let versions: Vec<u32> = task.planning_sessions.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let v3 = task.current_plan().unwrap();
        assert_eq!(v3.status, SessionStatus::Executing);
        assert_eq!(v3.step("gather-evidence").unwrap().status, StepStatus::Completed);
        assert_eq!(v3.step("analyze-root-cause").unwrap().status, StepStatus::Executing);
        assert_eq!(
            task.planning_sessions[1].step("analyze-root-cause").unwrap().status,
            StepStatus::Pending
        );
    }

    #[test]
    fn advancing_without_plan_is_an_error() {
        let mut task = Task::new(TaskId::new(), "u1", "m");
        assert!(advance_plan(&mut task, Agent::Knowledge).is_err());
    }

    #[test]
    fn long_messages_are_summarized() {
        let long = "x".repeat(200);
        assert_eq!(summarize(&long).chars().count(), 81);
        assert_eq!(summarize("  short "), "short");
    }
}
