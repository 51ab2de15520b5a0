//! Append-only audit trail of task decisions
//!
//! Every event stores the SHA-256 of its predecessor, so rewriting or
//! dropping an entry breaks [`AuditLog::verify_integrity`].

use crate::error::AuditError;
use crate::types::TaskId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Task accepted
    TaskCreated,
    /// Phase began
    PhaseStarted,
    /// Phase finished
    PhaseCompleted,
    /// Phase failed; task failed
    PhaseFailed,
    /// New plan version appended
    PlanRevised,
    /// User interrupt accepted
    Interrupted,
    /// Task completed
    Completed,
}

impl AuditKind {
    /// snake_case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditKind::TaskCreated => "task_created",
            AuditKind::PhaseStarted => "phase_started",
            AuditKind::PhaseCompleted => "phase_completed",
            AuditKind::PhaseFailed => "phase_failed",
            AuditKind::PlanRevised => "plan_revised",
            AuditKind::Interrupted => "interrupted",
            AuditKind::Completed => "completed",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chained audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the log, from 0
    pub sequence: u64,
    /// Task concerned
    pub task_id: TaskId,
    /// Wall-clock time of append
    pub timestamp: DateTime<Utc>,
    /// Event kind
    pub kind: AuditKind,
    /// Free-form detail
    pub detail: String,
    /// Hash of the previous event, zero for the first
    pub prev_hash: [u8; 32],
    /// Hash of this event
    pub hash: [u8; 32],
}

impl AuditEvent {
    /// Hex form of `hash`
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Process-wide audit log shared by all tasks
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    /// Create empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its sequence number
    pub fn append(&self, task_id: TaskId, kind: AuditKind, detail: impl Into<String>) -> u64 {
        let mut guard = self.inner.lock();
        let prev_hash = guard.last().map_or([0u8; 32], |e| e.hash);
        let mut event = AuditEvent {
            sequence: guard.len() as u64,
            task_id,
            timestamp: Utc::now(),
            kind,
            detail: detail.into(),
            prev_hash,
            hash: [0u8; 32],
        };
        event.hash = compute_hash(&event);
        let sequence = event.sequence;
        guard.push(event);
        sequence
    }

    /// All events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner.lock().clone()
    }

    /// Events concerning one task, oldest first
    #[must_use]
    pub fn events_for(&self, task_id: TaskId) -> Vec<AuditEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing was logged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Recompute the chain
    ///
    /// # Errors
    /// `IntegrityViolation` at the first event whose links or hash do not match
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for e in guard.iter() {
            if e.prev_hash != prev || e.hash != compute_hash(e) {
                return Err(AuditError::IntegrityViolation {
                    sequence: e.sequence,
                });
            }
            prev = e.hash;
        }
        Ok(())
    }
}

fn compute_hash(event: &AuditEvent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(event.sequence.to_le_bytes());
    hasher.update(event.task_id.0.to_bytes());
    hasher.update(event.timestamp.timestamp_micros().to_le_bytes());
    hasher.update(event.kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(event.detail.as_bytes());
    hasher.update([0]);
    hasher.update(event.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_verifies() {
        let log = AuditLog::new();
        let task = TaskId::new();
        log.append(task, AuditKind::TaskCreated, "u1");
        log.append(task, AuditKind::PhaseStarted, "planning");
        log.append(TaskId::new(), AuditKind::TaskCreated, "u2");

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_for(task).len(), 2);
        assert!(log.verify_integrity().is_ok());
        assert_eq!(log.events()[1].prev_hash, log.events()[0].hash);
        assert_eq!(log.events()[0].hash_hex().len(), 64);
    }

    #[test]
    fn tampering_is_detected() {
        let log = AuditLog::new();
        let task = TaskId::new();
        log.append(task, AuditKind::TaskCreated, "u1");
        log.append(task, AuditKind::Completed, "done");

        log.inner.lock()[0].detail = "someone else".to_string();

        assert_eq!(
            log.verify_integrity(),
            Err(AuditError::IntegrityViolation { sequence: 0 })
        );
    }
}
