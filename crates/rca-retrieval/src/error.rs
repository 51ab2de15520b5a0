//! Error types for evidence retrieval
//!
//! Branch-level failures (`StoreError`, `EmbeddingError`) are absorbed by the
//! hybrid engine into degraded results. Only `RetrievalError` reaches callers.

use std::time::Duration;

/// Errors from a vector or lexical store
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected the query
    #[error("query rejected: {0}")]
    InvalidQuery(String),

    /// Call exceeded its deadline
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from the embedding provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider could not be reached
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Nothing embeddable in the input
    #[error("nothing to embed in input text")]
    EmptyInput,

    /// Provider returned a vector that cannot be used for similarity
    #[error("invalid embedding vector: {0}")]
    InvalidVector(String),

    /// Vector length does not match the deployment dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Returned length
        actual: usize,
    },

    /// Call exceeded its deadline
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
}

impl EmbeddingError {
    /// Transport-level failures are worth retrying; malformed output is not
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl StoreError {
    /// Transport-level failures are worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Hard retrieval errors
///
/// Store and embedding outages never surface here; they degrade the result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    /// Fusion weight outside [0, 1]
    #[error("alpha must be within [0, 1], got {0}")]
    InvalidAlpha(f64),

    /// Engine configured with unusable parameters
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),

    /// Caller cancelled the search
    #[error("search cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Check if the search was cancelled rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StoreError::InvalidQuery("bad".into()).is_retryable());
        assert!(!EmbeddingError::EmptyInput.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EmbeddingError::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 384"));
        assert!(RetrievalError::InvalidAlpha(1.5).to_string().contains("1.5"));
    }
}
