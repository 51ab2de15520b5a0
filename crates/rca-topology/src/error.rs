//! Error types for topology lookup

use std::time::Duration;

/// Errors from the dependency-graph store
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphStoreError {
    /// Store could not be reached
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected or failed the query
    #[error("graph query failed: {0}")]
    Query(String),

    /// Call exceeded its deadline
    #[error("graph store call timed out after {0:?}")]
    Timeout(Duration),
}

impl GraphStoreError {
    /// Transport-level failures are worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Reasons a raw relation is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationError {
    /// Endpoint absent or blank
    #[error("relation {0} endpoint is missing")]
    MissingEndpoint(&'static str),

    /// Endpoint is a serialised null
    #[error("relation {field} endpoint is the placeholder {value:?}")]
    PlaceholderEndpoint {
        /// `from_service` or `to_service`
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Relation kind absent
    #[error("relation kind is missing")]
    MissingKind,

    /// Relation kind outside the closed set
    #[error("unknown relation kind {0:?}")]
    UnknownKind(String),
}
