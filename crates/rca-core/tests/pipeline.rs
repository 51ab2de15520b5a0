//! End-to-end pipeline behaviour against the fixture corpus

use pretty_assertions::assert_eq;
use rca_core::prelude::*;
use rca_core::{AuditKind, GenerationError, Phase, PlanStep, SessionStatus, StepStatus};
use rca_retrieval::is_placeholder_service;
use rca_test_utils::{
    backends_with_generator, fixture_backends, orchestrator_with, orchestrator_with_config,
    setup_test_orchestrator, test_config, FailingEmbedder, FailingGenerator, FailingGraphStore,
    FailingStore, HangingGenerator, PanickingGenerator, RecordingGenerator,
};
use std::sync::Arc;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(2);
const INCIDENT: &str = "service-b CPU usage critical, response timeouts";

async fn wait_until(orchestrator: &Orchestrator, id: TaskId, ready: impl Fn(&TaskSnapshot) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = orchestrator.get_status(id).unwrap();
        if ready(&snapshot) {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test]
async fn cpu_incident_completes_with_service_evidence() {
    let orchestrator = setup_test_orchestrator();
    let id = orchestrator.create_task("u1", INCIDENT);
    let snapshot = orchestrator.wait_for_terminal(id, POLL).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert!(!snapshot.can_interrupt);
    assert_eq!(snapshot.agent(Agent::Knowledge).unwrap().status, AgentState::Done);
    for agent in Agent::ALL {
        assert_eq!(snapshot.agent(agent).unwrap().status, AgentState::Done);
    }
    assert!((snapshot.overall_progress - 1.0).abs() < 1e-9);

    let result = snapshot.final_result.as_ref().unwrap();
    assert!(result
        .evidence
        .iter()
        .any(|e| e.service_name.as_deref() == Some("service-b")));
    assert!(result
        .evidence
        .iter()
        .all(|e| !is_placeholder_service(e.service_name.as_deref())));
    assert!(result.hypotheses[0].description.contains("service-b"));
    assert!(!result.solutions.is_empty());
    assert!(!result.degraded);
    assert_eq!(result.topology.impacted, vec!["cache-cluster", "redis"]);
    assert_eq!(snapshot.conclusions.len(), 4);
}

#[tokio::test]
async fn plan_versions_are_appended_never_rewritten() {
    let orchestrator = setup_test_orchestrator();
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();

    let sessions = &snapshot.planning_sessions;
    let versions: Vec<u32> = sessions.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert_eq!(sessions[0].status, SessionStatus::Planning);
    assert!(sessions[0].steps.iter().all(|s| s.status == StepStatus::Pending));
    assert_eq!(sessions[1].status, SessionStatus::Executing);
    assert_eq!(
        sessions[1].step("gather-evidence").unwrap().status,
        StepStatus::Executing
    );
    let last = sessions.last().unwrap();
    assert_eq!(last.status, SessionStatus::Completed);
    assert!(last.steps.iter().all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn progress_never_decreases_while_running() {
    let orchestrator = setup_test_orchestrator();
    let id = orchestrator.create_task("u1", INCIDENT);

    let mut observed = Vec::new();
    loop {
        let snapshot = orchestrator.get_status(id).unwrap();
        observed.push(snapshot.overall_progress);
        if snapshot.is_terminal() {
            break;
        }
        tokio::task::yield_now().await;
    }

    for pair in observed.windows(2) {
        assert!(pair[1] >= pair[0], "progress went from {} to {}", pair[0], pair[1]);
    }
    assert!((observed.last().unwrap() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn interrupt_during_execution_is_final() {
    let generator = Arc::new(HangingGenerator::default());
    let config = test_config().with_generation_timeout(Duration::from_secs(60));
    let orchestrator =
        orchestrator_with_config(config, backends_with_generator(Arc::clone(&generator) as _));

    let id = orchestrator.create_task("u1", INCIDENT);
    wait_until(&orchestrator, id, |s| {
        s.current_phase == Some(Phase::Execution) && generator.is_waiting()
    })
    .await;
    assert_eq!(orchestrator.get_status(id).unwrap().status, TaskStatus::Executing);

    assert!(orchestrator.interrupt(id, "user requested").unwrap());
    let interrupted = orchestrator.get_status(id).unwrap();
    assert_eq!(interrupted.status, TaskStatus::Interrupted);
    assert_eq!(interrupted.interrupt_reason.as_deref(), Some("user requested"));
    assert!(!interrupted.can_interrupt);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = orchestrator.get_status(id).unwrap();
    assert_eq!(later.status, TaskStatus::Interrupted);
    assert!(later.final_result.is_none());
    assert_eq!(later.overall_progress, interrupted.overall_progress);
    assert!(!orchestrator.interrupt(id, "again").unwrap());

    let kinds: Vec<AuditKind> = orchestrator.audit_trail(id).iter().map(|e| e.kind).collect();
    assert_eq!(kinds.last(), Some(&AuditKind::Interrupted));
}

#[tokio::test]
async fn queued_task_can_be_interrupted() {
    let orchestrator = setup_test_orchestrator();
    let id = orchestrator.create_task("u1", INCIDENT);
    // The pipeline has not been polled yet on this single-threaded runtime.
    assert_eq!(orchestrator.get_status(id).unwrap().status, TaskStatus::Queued);
    assert!(orchestrator.interrupt(id, "changed my mind").unwrap());

    let snapshot = orchestrator.wait_for_terminal(id, POLL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(snapshot.status, TaskStatus::Interrupted);
    assert_eq!(orchestrator.get_status(id).unwrap().status, TaskStatus::Interrupted);
    assert!(orchestrator.get_status(id).unwrap().planning_sessions.is_empty());
}

#[tokio::test]
async fn generator_outage_fails_the_reasoning_phase() {
    let orchestrator =
        orchestrator_with(backends_with_generator(Arc::new(FailingGenerator::unavailable())));
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Failed);
    let message = snapshot.error_message.as_deref().unwrap();
    assert!(message.starts_with("[transport]"), "{message}");
    assert_eq!(snapshot.agent(Agent::Reasoning).unwrap().status, AgentState::Failed);
    assert_eq!(snapshot.agent(Agent::Executor).unwrap().status, AgentState::Waiting);
    assert!(snapshot.final_result.is_none());
    // planner + knowledge weights
    assert!((snapshot.overall_progress - 0.55).abs() < 1e-9);

    let kinds: Vec<AuditKind> = orchestrator
        .audit_trail(snapshot.task_id)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds.last(), Some(&AuditKind::PhaseFailed));
    assert!(!kinds.contains(&AuditKind::Completed));
}

#[tokio::test]
async fn slow_generator_times_out() {
    let generator = Arc::new(HangingGenerator::default());
    let config = test_config().with_generation_timeout(Duration::from_millis(30));
    let orchestrator = orchestrator_with_config(config, backends_with_generator(generator));

    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert!(snapshot.error_message.as_ref().unwrap().starts_with("[timeout]"));
    assert_eq!(snapshot.agent(Agent::Executor).unwrap().status, AgentState::Failed);
}

#[tokio::test]
async fn malformed_generation_is_a_generation_error() {
    let generator = FailingGenerator::new(GenerationError::InvalidResponse("not json".into()));
    let orchestrator = orchestrator_with(backends_with_generator(Arc::new(generator)));
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();
    assert!(snapshot.error_message.unwrap().starts_with("[generation]"));
}

#[tokio::test]
async fn panicking_pipeline_is_marked_failed() {
    let orchestrator = orchestrator_with(backends_with_generator(Arc::new(PanickingGenerator)));
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Failed);
    let message = snapshot.error_message.unwrap();
    assert!(message.starts_with("[internal]"), "{message}");
    assert!(message.contains("generator bug"));
    assert!(orchestrator.audit().verify_integrity().is_ok());
}

#[tokio::test]
async fn backend_outage_degrades_instead_of_failing() {
    let backends = Backends {
        embedder: Arc::new(FailingEmbedder::default()),
        vector_store: Arc::new(FailingStore),
        lexical_store: Arc::new(FailingStore),
        graph_store: Arc::new(FailingGraphStore),
        ..fixture_backends()
    };
    let orchestrator = orchestrator_with(backends);
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Completed);
    let result = snapshot.final_result.unwrap();
    assert!(result.degraded);
    assert!(result.evidence.is_empty());
    assert!(result.topology.is_empty());
    // service-b is still named in the message
    assert_eq!(result.hypotheses.len(), 1);
    assert_eq!(result.hypotheses[0].confidence, 0.0);
}

#[tokio::test]
async fn embedding_outage_falls_back_to_keywords() {
    let backends = Backends {
        embedder: Arc::new(FailingEmbedder::default()),
        ..fixture_backends()
    };
    let orchestrator = orchestrator_with(backends);
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();

    let result = snapshot.final_result.unwrap();
    assert!(result.degraded);
    assert!(!result.evidence.is_empty());
    assert!(result.evidence.iter().all(|e| e.vector_score == 0.0));
}

#[tokio::test]
async fn generator_sees_extracted_entities_and_topology() {
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = orchestrator_with(backends_with_generator(Arc::clone(&generator) as _));
    orchestrator.run_task("u1", INCIDENT).await.unwrap();

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.query, INCIDENT);
    assert_eq!(request.entities.services, vec!["service-b".to_string()]);
    assert!(request
        .topology
        .dependencies_of("service-b")
        .iter()
        .any(|(to, _)| *to == "redis"));
    let scores: Vec<f64> = request.evidence.iter().map(|e| e.hybrid_score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(scores, sorted);
}

#[tokio::test]
async fn audit_trail_follows_the_lifecycle() {
    let orchestrator = setup_test_orchestrator();
    let snapshot = orchestrator.run_task("u1", INCIDENT).await.unwrap();
    let trail = orchestrator.audit_trail(snapshot.task_id);

    assert_eq!(trail.first().unwrap().kind, AuditKind::TaskCreated);
    assert_eq!(trail.last().unwrap().kind, AuditKind::Completed);
    let started = trail.iter().filter(|e| e.kind == AuditKind::PhaseStarted).count();
    let completed = trail
        .iter()
        .filter(|e| e.kind == AuditKind::PhaseCompleted)
        .count();
    assert_eq!((started, completed), (4, 4));
    assert!(orchestrator.audit().verify_integrity().is_ok());
}

#[tokio::test]
async fn concurrent_tasks_are_independent() {
    let orchestrator = setup_test_orchestrator();
    let ok = orchestrator.create_task("u1", INCIDENT);
    let other = orchestrator.create_task("u2", "redis connection pool exhausted");
    orchestrator.interrupt(other, "duplicate").unwrap();

    let ok = orchestrator.wait_for_terminal(ok, POLL).await.unwrap();
    let other = orchestrator.wait_for_terminal(other, POLL).await.unwrap();
    assert_eq!(ok.status, TaskStatus::Completed);
    assert_eq!(other.status, TaskStatus::Interrupted);

    let users: Vec<String> = orchestrator.list_tasks().into_iter().map(|t| t.user_id).collect();
    assert_eq!(users.len(), 2);
    assert!(users.contains(&"u1".to_string()) && users.contains(&"u2".to_string()));
}

#[tokio::test]
async fn unknown_task_ids_are_reported() {
    let orchestrator = setup_test_orchestrator();
    let missing = TaskId::new();
    assert!(matches!(
        orchestrator.get_status(missing),
        Err(RcaError::TaskNotFound(_))
    ));
    assert!(matches!(
        orchestrator.interrupt(missing, "x"),
        Err(RcaError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn plan_revisions_are_validated_and_versioned() {
    let generator = Arc::new(HangingGenerator::default());
    let config = test_config().with_generation_timeout(Duration::from_secs(60));
    let orchestrator =
        orchestrator_with_config(config, backends_with_generator(Arc::clone(&generator) as _));
    let id = orchestrator.create_task("u1", INCIDENT);
    wait_until(&orchestrator, id, |_| generator.is_waiting()).await;

    let cyclic = vec![
        PlanStep::new("a", "A", Agent::Knowledge).after("b"),
        PlanStep::new("b", "B", Agent::Reasoning).after("a"),
    ];
    assert!(matches!(
        orchestrator.revise_plan(id, "loop", cyclic),
        Err(RcaError::Plan(_))
    ));

    let before = orchestrator.get_status(id).unwrap().current_plan().unwrap().version;
    let steps = vec![
        PlanStep::new("page-oncall", "Page on-call", Agent::Executor),
        PlanStep::new("rollback", "Roll back", Agent::Executor).after("page-oncall"),
    ];
    let version = orchestrator.revise_plan(id, "escalate", steps).unwrap();
    assert_eq!(version, before + 1);

    orchestrator.interrupt(id, "done").unwrap();
    assert!(matches!(
        orchestrator.revise_plan(id, "late", vec![PlanStep::new("x", "X", Agent::Planner)]),
        Err(RcaError::TaskTerminal { .. })
    ));
}
