//! Status store
//!
//! One entry per task: the record behind a `parking_lot::RwLock` and the
//! task's cancellation token. Reads clone under the read lock, so pollers
//! always see a consistent snapshot. Writes to a terminal task are refused.
//! No lock is ever held across an `.await`.

use crate::error::RcaError;
use crate::types::{Task, TaskId, TaskStatus};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Entry {
    record: RwLock<Task>,
    cancel: CancellationToken,
}

/// Concurrent map of task records
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<TaskId, Arc<Entry>>,
}

impl TaskStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new task, returning its cancellation token
    pub fn insert(&self, task: Task) -> CancellationToken {
        let cancel = CancellationToken::new();
        let id = task.task_id;
        let entry = Arc::new(Entry {
            record: RwLock::new(task),
            cancel: cancel.clone(),
        });
        self.tasks.insert(id, entry);
        cancel
    }

    fn entry(&self, id: TaskId) -> Result<Arc<Entry>, RcaError> {
        self.tasks
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(RcaError::TaskNotFound(id))
    }

    /// Consistent copy of a task
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn snapshot(&self, id: TaskId) -> Result<Task, RcaError> {
        Ok(self.entry(id)?.record.read().clone())
    }

    /// Current status without cloning the record
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn status(&self, id: TaskId) -> Result<TaskStatus, RcaError> {
        Ok(self.entry(id)?.record.read().status)
    }

    /// Snapshots of all tasks, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        let entries: Vec<Arc<Entry>> = self.tasks.iter().map(|e| Arc::clone(e.value())).collect();
        let mut tasks: Vec<Task> = entries.iter().map(|e| e.record.read().clone()).collect();
        tasks.sort_by_key(|t| t.task_id);
        tasks
    }

    /// Number of tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when no task exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancellation token of a task
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn cancel_token(&self, id: TaskId) -> Result<CancellationToken, RcaError> {
        Ok(self.entry(id)?.cancel.clone())
    }

    /// Apply `f` to a non-terminal task under its write lock
    ///
    /// If `f` fails the record is restored, so a rejected mutation never
    /// leaves a partial update behind.
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown ids
    /// - `TaskTerminal` once the task completed, failed, or was interrupted
    /// - whatever `f` returns
    pub fn mutate<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut Task) -> Result<R, RcaError>,
    ) -> Result<R, RcaError> {
        let entry = self.entry(id)?;
        let mut record = entry.record.write();
        if record.is_terminal() {
            return Err(RcaError::TaskTerminal {
                id,
                status: record.status,
            });
        }
        let backup = record.clone();
        match f(&mut *record) {
            Ok(value) => Ok(value),
            Err(e) => {
                *record = backup;
                Err(e)
            }
        }
    }

    /// Force a non-terminal task into `failed`
    ///
    /// Used when the pipeline itself breaks. Returns false if the task was
    /// already terminal.
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn fail(&self, id: TaskId, message: &str) -> Result<bool, RcaError> {
        let entry = self.entry(id)?;
        let mut record = entry.record.write();
        if record.is_terminal() {
            return Ok(false);
        }
        // Failed is reachable from every non-terminal status.
        record.transition(TaskStatus::Failed)?;
        record.error_message = Some(message.to_string());
        record.recompute_progress();
        drop(record);
        entry.cancel.cancel();
        Ok(true)
    }

    /// Mark a non-terminal task `interrupted` and cancel its token
    ///
    /// Returns false if the task was already terminal.
    ///
    /// # Errors
    /// `TaskNotFound` for unknown ids
    pub fn interrupt(&self, id: TaskId, reason: &str) -> Result<bool, RcaError> {
        let entry = self.entry(id)?;
        let mut record = entry.record.write();
        if record.is_terminal() {
            return Ok(false);
        }
        record.transition(TaskStatus::Interrupted)?;
        record.interrupt_reason = Some(reason.to_string());
        drop(record);
        entry.cancel.cancel();
        Ok(true)
    }
}
