//! RCA Retrieval - hybrid evidence search
//!
//! Finds evidence for an incident question by combining:
//! - Semantic similarity over query embeddings (vector branch)
//! - BM25-style full-text scoring (lexical branch)
//!
//! Branches run concurrently and fail independently; a failed branch degrades
//! the result instead of failing it. Results are deduplicated by content
//! fingerprint and filtered by data-quality rules before ranking.
//!
//! # Example
//!
//! ```rust,ignore
//! use rca_retrieval::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     embedder: Arc<dyn EmbeddingProvider>,
//! #     vectors: Arc<dyn VectorStore>,
//! #     lexical: Arc<dyn LexicalStore>,
//! # ) -> Result<(), RetrievalError> {
//! let engine = HybridSearchEngine::new(embedder, vectors, lexical);
//! let outcome = engine.search("redis connection timeout", 5, 0.6).await?;
//! for item in &outcome.items {
//!     println!("{:.2} {}", item.hybrid_score, item.content);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod hybrid;
pub mod memory;
pub mod provider;

pub use cache::EmbeddingCache;
pub use error::{EmbeddingError, RetrievalError, StoreError};
pub use evidence::{is_placeholder_service, EvidenceItem, SourceType, PLACEHOLDER_SERVICE_NAMES};
pub use fingerprint::Fingerprint;
pub use hybrid::{
    fuse, normalize_lexical_score, normalize_vector_score, Branch, BranchFailure, DegradedMode,
    FusionParams, HybridSearchEngine, SearchConfig, SearchOutcome, SearchRequest,
};
pub use memory::{
    cosine_similarity, tokenize, Document, HashingEmbedder, MemoryLexicalStore, MemoryVectorStore,
};
pub use provider::{EmbeddingProvider, HitMetadata, LexicalStore, StoreHit, VectorStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with RCA Retrieval
    pub use crate::{
        DegradedMode, EmbeddingProvider, EvidenceItem, HybridSearchEngine, LexicalStore,
        RetrievalError, SearchConfig, SearchOutcome, SearchRequest, SourceType, VectorStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
