//! Task orchestrator
//!
//! Owns the status store, the audit log, and the backends. `create_task`
//! returns immediately; the pipeline runs on its own tokio task under a
//! supervisor that turns a panic into a `failed` status.

use crate::analysis::TextGenerator;
use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::config::RcaConfig;
use crate::error::{ConfigError, ErrorCode, RcaError};
use crate::phases::Pipeline;
use crate::plan::{PlanStep, PlanningSession, SessionStatus};
use crate::store::TaskStore;
use crate::types::{Task, TaskId, TaskSnapshot};
use rca_entity::EntityExtractor;
use rca_retrieval::{EmbeddingProvider, HybridSearchEngine, LexicalStore, VectorStore};
use rca_topology::{GraphStore, TopologyAnalyzer};
use std::sync::Arc;
use std::time::Duration;

/// External services the pipeline depends on
#[derive(Clone)]
pub struct Backends {
    /// Text to vector
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Semantic search
    pub vector_store: Arc<dyn VectorStore>,
    /// Keyword search
    pub lexical_store: Arc<dyn LexicalStore>,
    /// Service relations
    pub graph_store: Arc<dyn GraphStore>,
    /// Hypotheses and remediation
    pub generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// State shared between the handle and running pipelines
pub(crate) struct Inner {
    pub(crate) store: TaskStore,
    pub(crate) audit: AuditLog,
    pub(crate) retrieval: HybridSearchEngine,
    pub(crate) topology: TopologyAnalyzer,
    pub(crate) extractor: EntityExtractor,
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) config: RcaConfig,
}

/// Cheaply cloneable orchestrator handle
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tasks", &self.inner.store.len())
            .field("audit_events", &self.inner.audit.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire the backends with `config`
    ///
    /// # Errors
    /// `Config` when `config` fails validation
    pub fn new(config: RcaConfig, backends: Backends) -> Result<Self, RcaError> {
        config.validate()?;

        let retrieval = HybridSearchEngine::new(
            backends.embedder,
            backends.vector_store,
            backends.lexical_store,
        )
        .with_config(config.search_config())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?
        .with_cache(config.embedding_cache());

        let topology = TopologyAnalyzer::new(backends.graph_store)
            .with_max_depth(config.topology.max_depth)
            .with_timeout(config.timeouts.store());

        let extractor =
            EntityExtractor::new().with_known_services(config.entity.extra_known_services.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                store: TaskStore::new(),
                audit: AuditLog::new(),
                retrieval,
                topology,
                extractor,
                generator: backends.generator,
                config,
            }),
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &RcaConfig {
        &self.inner.config
    }

    /// Accept a task and start its pipeline in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_task(&self, user_id: impl Into<String>, message: impl Into<String>) -> TaskId {
        let id = TaskId::new();
        let task = Task::new(id, user_id, message);
        let user = task.user_id.clone();
        let cancel = self.inner.store.insert(task);
        self.inner.audit.append(id, AuditKind::TaskCreated, user);
        tracing::info!(task_id = %id, "task created");

        let pipeline = tokio::spawn(Pipeline::new(Arc::clone(&self.inner), id, cancel).run());
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Err(join_error) = pipeline.await else {
                return;
            };
            let reason = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                "pipeline aborted".to_string()
            };
            let message = format!("[{}] {reason}", ErrorCode::Internal);
            tracing::error!(task_id = %id, error = %message, "pipeline crashed");
            match inner.store.fail(id, &message) {
                Ok(true) => {
                    inner.audit.append(id, AuditKind::PhaseFailed, message);
                }
                Ok(false) => {}
                Err(e) => tracing::error!(task_id = %id, error = %e, "crashed task vanished"),
            }
        });

        id
    }

    /// Consistent snapshot of a task
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn get_status(&self, id: TaskId) -> Result<TaskSnapshot, RcaError> {
        self.inner.store.snapshot(id)
    }

    /// Stop a task that has not finished
    ///
    /// Any non-terminal status is interruptible, `queued` included: a task
    /// interrupted before its pipeline starts never runs a phase.
    ///
    /// Returns true if the task moved to `interrupted`, false if it was
    /// already terminal. Any phase still running stops at its next
    /// cancellation point and its writes are discarded.
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn interrupt(&self, id: TaskId, reason: &str) -> Result<bool, RcaError> {
        let accepted = self.inner.store.interrupt(id, reason)?;
        if accepted {
            self.inner.audit.append(id, AuditKind::Interrupted, reason);
            tracing::info!(task_id = %id, reason, "task interrupted");
        } else {
            tracing::debug!(task_id = %id, "interrupt ignored, task already terminal");
        }
        Ok(accepted)
    }

    /// Poll until the task is terminal
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub async fn wait_for_terminal(
        &self,
        id: TaskId,
        poll_interval: Duration,
    ) -> Result<TaskSnapshot, RcaError> {
        loop {
            let snapshot = self.get_status(id)?;
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Create a task and wait for it with the configured poll interval
    ///
    /// # Errors
    /// Only if the task record disappears, which does not happen in practice
    pub async fn run_task(
        &self,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<TaskSnapshot, RcaError> {
        let id = self.create_task(user_id, message);
        self.wait_for_terminal(id, self.inner.config.orchestrator.poll_interval())
            .await
    }

    /// Snapshots of every task, oldest first
    #[must_use]
    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.inner.store.list()
    }

    /// Append a plan version with caller-supplied steps
    ///
    /// The new version keeps the current plan's status. Returns the new
    /// version number.
    ///
    /// # Errors
    /// - `TaskNotFound` or `TaskTerminal`
    /// - `Plan` if the steps are empty, duplicated, or cyclic
    pub fn revise_plan(
        &self,
        id: TaskId,
        description: impl Into<String>,
        steps: Vec<PlanStep>,
    ) -> Result<u32, RcaError> {
        let description = description.into();
        let version = self.inner.store.mutate(id, |task| {
            let (version, status) = task
                .current_plan()
                .map_or((1, SessionStatus::Planning), |p| (p.version + 1, p.status));
            let session = PlanningSession::new(version, description.clone(), status, steps)?;
            task.planning_sessions.push(session);
            Ok(version)
        })?;
        self.inner
            .audit
            .append(id, AuditKind::PlanRevised, format!("version {version}: {description}"));
        Ok(version)
    }

    /// Audit events of one task, oldest first
    #[must_use]
    pub fn audit_trail(&self, id: TaskId) -> Vec<AuditEvent> {
        self.inner.audit.events_for(id)
    }

    /// Process-wide audit log
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.inner.audit
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("pipeline panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("pipeline panicked: {s}")
    } else {
        "pipeline panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(
            panic_message(Box::new("boom")),
            "pipeline panicked: boom"
        );
        assert_eq!(
            panic_message(Box::new(String::from("bad state"))),
            "pipeline panicked: bad state"
        );
        assert_eq!(panic_message(Box::new(7_u8)), "pipeline panicked");
    }
}
