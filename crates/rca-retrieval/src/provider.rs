//! Seams to the external embedding model and search stores

use crate::error::{EmbeddingError, StoreError};
use crate::evidence::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance attached to a stored chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    /// Raw source type as stored; parsed leniently
    #[serde(default)]
    pub source_type: String,
    /// Owning service, possibly a placeholder
    #[serde(default)]
    pub service_name: Option<String>,
    /// File + line, document id, ...
    #[serde(default)]
    pub source_locator: Option<String>,
    /// Record time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HitMetadata {
    /// Parsed source type
    #[inline]
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        SourceType::parse_lenient(&self.source_type)
    }
}

/// One ranked row from a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    /// Chunk text
    pub content: String,
    /// Provenance
    pub metadata: HitMetadata,
    /// Store-native score: cosine certainty for vectors, BM25 for lexical
    pub score: f64,
}

/// Text → fixed-length vector
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`; unavailability is an error, never a zero vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector length for this deployment
    fn dimension(&self) -> usize;
}

/// Similarity search by vector
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `limit` hits by cosine similarity, optionally restricted to a service
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError>;
}

/// Ranked full-text search
#[async_trait::async_trait]
pub trait LexicalStore: Send + Sync {
    /// Top `limit` hits by BM25-style score, optionally restricted to a service
    async fn query(
        &self,
        text: &str,
        limit: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError>;
}
