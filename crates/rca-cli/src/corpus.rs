//! Offline corpus: documents and relations loaded from one JSON file

use anyhow::{Context, Result};
use rca_core::{Backends, TemplateGenerator};
use rca_retrieval::{Document, HashingEmbedder, MemoryLexicalStore, MemoryVectorStore};
use rca_topology::{MemoryGraphStore, RawRelation};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Vector length used by the offline embedder
pub(crate) const EMBEDDING_DIMENSION: usize = 256;

/// Corpus file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Corpus {
    pub(crate) documents: Vec<Document>,
    pub(crate) relations: Vec<RawRelation>,
}

impl Corpus {
    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("corpus is not valid JSON")
    }

    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading corpus {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing corpus {}", path.display()))
    }

    /// Index into memory backends with the template generator
    pub(crate) fn into_backends(self) -> Result<Backends> {
        let embedder = HashingEmbedder::new(EMBEDDING_DIMENSION);

        let vectors = MemoryVectorStore::new();
        let indexed = vectors
            .index(&embedder, self.documents.iter().cloned())
            .context("embedding corpus documents")?;
        let lexical = MemoryLexicalStore::new();
        lexical.index(self.documents);

        tracing::info!(
            documents = indexed,
            relations = self.relations.len(),
            "corpus loaded"
        );

        Ok(Backends {
            embedder: Arc::new(embedder),
            vector_store: Arc::new(vectors),
            lexical_store: Arc::new(lexical),
            graph_store: Arc::new(MemoryGraphStore::from_relations(self.relations)),
            generator: Arc::new(TemplateGenerator::new()),
        })
    }
}
