//! In-memory reference backends
//!
//! Deterministic stand-ins for the external embedding model and stores, used
//! by the CLI's fixture mode and by tests. Production deployments plug real
//! services in behind the same traits.

use crate::error::{EmbeddingError, StoreError};
use crate::provider::{EmbeddingProvider, HitMetadata, LexicalStore, StoreHit, VectorStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// BM25 term-frequency saturation
const BM25_K1: f64 = 1.2;
/// BM25 length normalisation
const BM25_B: f64 = 0.75;

/// A document as loaded into the in-memory stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Chunk text
    pub content: String,
    /// Raw source type
    #[serde(default)]
    pub source_type: String,
    /// Owning service
    #[serde(default)]
    pub service_name: Option<String>,
    /// Provenance locator
    #[serde(default)]
    pub source_locator: Option<String>,
    /// Record time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Document {
    /// Document with source type and service
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        source_type: impl Into<String>,
        service_name: Option<&str>,
    ) -> Self {
        Self {
            content: content.into(),
            source_type: source_type.into(),
            service_name: service_name.map(String::from),
            source_locator: None,
            timestamp: None,
        }
    }

    /// With locator
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.source_locator = Some(locator.into());
        self
    }

    fn metadata(&self) -> HitMetadata {
        HitMetadata {
            source_type: self.source_type.clone(),
            service_name: self.service_name.clone(),
            source_locator: self.source_locator.clone(),
            timestamp: self.timestamp,
        }
    }

    fn in_scope(&self, service: Option<&str>) -> bool {
        match service {
            None => true,
            Some(s) => self
                .service_name
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(s)),
        }
    }

    fn hit(&self, score: f64) -> StoreHit {
        StoreHit {
            content: self.content.clone(),
            metadata: self.metadata(),
            score,
        }
    }
}

/// Split text into search tokens
///
/// ASCII alphanumeric runs become lowercase words. Every other alphanumeric
/// character (CJK ideographs and the like) becomes its own token.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            word.push(ch.to_ascii_lowercase());
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !ch.is_ascii() && ch.is_alphanumeric() {
            tokens.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// Feature-hashing embedder
///
/// Each token is hashed into one of `dimension` buckets with a sign bit, and
/// the resulting vector is L2-normalised. Texts sharing vocabulary land close
/// together, which is all fixtures need.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create embedder producing vectors of length `dimension`
    #[inline]
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding, shared by indexing and querying
    ///
    /// # Errors
    /// `EmptyInput` when the text has no tokens
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&bytes[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::InvalidVector(
                "hashed features cancelled out".to_string(),
            ));
        }
        for v in &mut vector {
            *v /= norm;
        }
        Ok(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity, negative values clamped to zero
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}

/// Brute-force vector store
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    rows: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl MemoryVectorStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed and add documents
    ///
    /// # Errors
    /// Propagates the embedder's error for the first document that fails
    pub fn index(
        &self,
        embedder: &HashingEmbedder,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<usize, EmbeddingError> {
        let mut embedded = Vec::new();
        for doc in documents {
            let vector = embedder.embed_sync(&doc.content)?;
            embedded.push((doc, vector));
        }
        let count = embedded.len();
        self.rows.write().extend(embedded);
        Ok(count)
    }

    /// Add a document with a precomputed vector
    pub fn insert(&self, document: Document, vector: Vec<f32>) {
        self.rows.write().push((document, vector));
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// True when empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError> {
        let rows = self.rows.read();
        let mut scored: Vec<(f64, &Document)> = rows
            .iter()
            .filter(|(doc, _)| doc.in_scope(service))
            .map(|(doc, v)| (cosine_similarity(vector, v), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(s, d)| d.hit(s)).collect())
    }
}

#[derive(Debug)]
struct LexicalRow {
    document: Document,
    term_freqs: HashMap<String, usize>,
    length: usize,
}

#[derive(Debug, Default)]
struct LexicalIndex {
    rows: Vec<LexicalRow>,
    doc_freqs: HashMap<String, usize>,
    total_length: usize,
}

/// Okapi BM25 full-text store
#[derive(Debug, Default)]
pub struct MemoryLexicalStore {
    index: RwLock<LexicalIndex>,
}

impl MemoryLexicalStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add documents
    pub fn index(&self, documents: impl IntoIterator<Item = Document>) -> usize {
        let mut index = self.index.write();
        let mut added = 0;
        for document in documents {
            let tokens = tokenize(&document.content);
            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_default() += 1;
            }
            for term in term_freqs.keys() {
                *index.doc_freqs.entry(term.clone()).or_default() += 1;
            }
            index.total_length += tokens.len();
            index.rows.push(LexicalRow {
                document,
                term_freqs,
                length: tokens.len(),
            });
            added += 1;
        }
        added
    }

    /// Number of stored documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().rows.len()
    }

    /// True when empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().rows.is_empty()
    }
}

#[async_trait::async_trait]
impl LexicalStore for MemoryLexicalStore {
    #[allow(clippy::cast_precision_loss)]
    async fn query(
        &self,
        text: &str,
        limit: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError> {
        let mut terms = tokenize(text);
        terms.sort();
        terms.dedup();

        let index = self.index.read();
        if index.rows.is_empty() || terms.is_empty() {
            return Ok(Vec::new());
        }

        let n = index.rows.len() as f64;
        let avg_len = (index.total_length as f64 / n).max(1.0);

        let mut scored: Vec<(f64, &Document)> = index
            .rows
            .iter()
            .filter(|row| row.document.in_scope(service))
            .map(|row| {
                let score = terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *row.term_freqs.get(term)? as f64;
                        let df = *index.doc_freqs.get(term)? as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        let norm = 1.0 - BM25_B + BM25_B * row.length as f64 / avg_len;
                        Some(idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm))
                    })
                    .sum::<f64>();
                (score, &row.document)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(s, d)| d.hit(s)).collect())
    }
}
