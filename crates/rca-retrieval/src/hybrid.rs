//! Hybrid search engine fusing vector and lexical branches
//!
//! ## Score
//!
//! ```text
//! hybrid = alpha × vector + (1 − alpha) × min(lexical_raw / divisor, 1)
//! ```
//!
//! Both branches run concurrently and fail independently. A record found by
//! both branches is merged by content fingerprint and carries both scores; a
//! branch that did not see a record contributes zero.
//!
//! ## Ordering
//!
//! Hybrid score descending, ties broken by vector rank, then lexical rank.
//! Records failing the quality rules are dropped before truncation.

use crate::cache::EmbeddingCache;
use crate::error::{EmbeddingError, RetrievalError, StoreError};
use crate::evidence::EvidenceItem;
use crate::fingerprint::Fingerprint;
use crate::provider::{EmbeddingProvider, LexicalStore, StoreHit, VectorStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunable search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default semantic weight
    pub alpha: f64,
    /// Divisor bounding raw lexical scores into [0, 1]
    pub lexical_divisor: f64,
    /// Candidate rows fetched per branch, as a multiple of `limit`
    pub candidate_multiplier: usize,
    /// Drop records without a real service name even for unscoped queries
    pub require_service_name: bool,
    /// Deadline for the embedding call
    #[serde(with = "duration_ms")]
    pub embedding_timeout: Duration,
    /// Deadline for each store query
    #[serde(with = "duration_ms")]
    pub store_timeout: Duration,
}

impl SearchConfig {
    /// Check parameter ranges
    ///
    /// # Errors
    /// `InvalidAlpha` or `InvalidConfig` describing the first bad field
    pub fn validate(&self) -> Result<(), RetrievalError> {
        validate_alpha(self.alpha)?;
        if !(self.lexical_divisor.is_finite() && self.lexical_divisor > 0.0) {
            return Err(RetrievalError::InvalidConfig(format!(
                "lexical_divisor must be positive, got {}",
                self.lexical_divisor
            )));
        }
        if self.candidate_multiplier < 2 {
            return Err(RetrievalError::InvalidConfig(format!(
                "candidate_multiplier must be at least 2, got {}",
                self.candidate_multiplier
            )));
        }
        if self.embedding_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(RetrievalError::InvalidConfig(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            lexical_divisor: 3.0,
            candidate_multiplier: 3,
            require_service_name: true,
            embedding_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(15),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Search branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Embedding + vector similarity
    Vector,
    /// BM25-style full text
    Lexical,
}

/// Which branches a degraded result was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedMode {
    /// Vector branch failed
    LexicalOnly,
    /// Lexical branch failed
    VectorOnly,
    /// Both branches failed; result is empty
    Unavailable,
}

/// A branch failure absorbed into a degraded result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    /// Failed branch
    pub branch: Branch,
    /// Error text
    pub reason: String,
    /// Whether the underlying error is transient
    #[serde(default)]
    pub retryable: bool,
}

impl BranchFailure {
    fn store(branch: Branch, err: &StoreError) -> Self {
        Self {
            branch,
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    fn embedding(err: &EmbeddingError) -> Self {
        Self {
            branch: Branch::Vector,
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Ranked evidence plus degradation metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Evidence, best first
    pub items: Vec<EvidenceItem>,
    /// Set when a branch failed
    pub degraded: Option<DegradedMode>,
    /// Failures behind `degraded`
    pub failures: Vec<BranchFailure>,
    /// Merged records dropped by the quality rules
    pub filtered: usize,
}

impl SearchOutcome {
    /// Empty, non-degraded outcome
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when at least one branch failed
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// One search request
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    /// Query text
    pub query: &'a str,
    /// Maximum items returned
    pub limit: usize,
    /// Semantic weight
    pub alpha: f64,
    /// Restrict both branches to one service
    pub service: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    /// Unscoped request
    #[inline]
    #[must_use]
    pub fn new(query: &'a str, limit: usize, alpha: f64) -> Self {
        Self {
            query,
            limit,
            alpha,
            service: None,
        }
    }

    /// Restrict to `service`
    #[inline]
    #[must_use]
    pub fn scoped(mut self, service: &'a str) -> Self {
        self.service = Some(service);
        self
    }
}

#[derive(Debug)]
struct Candidate {
    item: EvidenceItem,
    vector_rank: Option<usize>,
    lexical_rank: Option<usize>,
}

/// Hybrid retrieval over one vector store and one lexical store
#[derive(Clone)]
pub struct HybridSearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    lexical_store: Arc<dyn LexicalStore>,
    cache: EmbeddingCache,
    config: SearchConfig,
}

impl std::fmt::Debug for HybridSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HybridSearchEngine {
    /// Create engine with default configuration and cache
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        lexical_store: Arc<dyn LexicalStore>,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            lexical_store,
            cache: EmbeddingCache::default(),
            config: SearchConfig::default(),
        }
    }

    /// With configuration
    ///
    /// # Errors
    /// Rejects configurations failing [`SearchConfig::validate`]
    pub fn with_config(mut self, config: SearchConfig) -> Result<Self, RetrievalError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Share an embedding cache with other engines
    #[must_use]
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Unscoped search
    ///
    /// # Errors
    /// See [`HybridSearchEngine::search_with`]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        alpha: f64,
    ) -> Result<SearchOutcome, RetrievalError> {
        let request = SearchRequest::new(query, limit, alpha);
        self.search_with(request, &CancellationToken::new()).await
    }

    /// Search restricted to one service
    ///
    /// # Errors
    /// See [`HybridSearchEngine::search_with`]
    pub async fn search_scoped(
        &self,
        query: &str,
        service: &str,
        limit: usize,
        alpha: f64,
    ) -> Result<SearchOutcome, RetrievalError> {
        let request = SearchRequest::new(query, limit, alpha).scoped(service);
        self.search_with(request, &CancellationToken::new()).await
    }

    /// Run a search request
    ///
    /// Blank queries and `limit == 0` return an empty outcome. Branch failures
    /// degrade the outcome instead of failing it.
    ///
    /// # Errors
    /// - `InvalidAlpha` for weights outside [0, 1]
    /// - `Cancelled` if `cancel` fires before both branches finish
    #[tracing::instrument(skip_all, fields(limit = request.limit, scoped = request.service.is_some()))]
    pub async fn search_with(
        &self,
        request: SearchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, RetrievalError> {
        validate_alpha(request.alpha)?;
        if request.query.trim().is_empty() || request.limit == 0 {
            return Ok(SearchOutcome::empty());
        }
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let candidates = request
            .limit
            .saturating_mul(self.config.candidate_multiplier);

        let branches = async {
            tokio::join!(
                self.vector_branch(request.query, candidates, request.service),
                self.lexical_branch(request.query, candidates, request.service),
            )
        };

        let (vector, lexical) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            results = branches => results,
        };

        let mut failures = Vec::new();
        let vector_hits = vector.unwrap_or_else(|failure| {
            tracing::warn!(
                reason = %failure.reason,
                retryable = failure.retryable,
                "vector branch failed, degrading to lexical results"
            );
            failures.push(failure);
            Vec::new()
        });
        let lexical_hits = lexical.unwrap_or_else(|failure| {
            tracing::warn!(
                reason = %failure.reason,
                retryable = failure.retryable,
                "lexical branch failed, degrading to vector results"
            );
            failures.push(failure);
            Vec::new()
        });

        let degraded = match (
            failures.iter().any(|f| f.branch == Branch::Vector),
            failures.iter().any(|f| f.branch == Branch::Lexical),
        ) {
            (false, false) => None,
            (true, false) => Some(DegradedMode::LexicalOnly),
            (false, true) => Some(DegradedMode::VectorOnly),
            (true, true) => Some(DegradedMode::Unavailable),
        };

        let require_service = self.config.require_service_name || request.service.is_some();
        let (items, filtered) = fuse(
            vector_hits,
            lexical_hits,
            FusionParams {
                alpha: request.alpha,
                lexical_divisor: self.config.lexical_divisor,
                require_service,
                limit: request.limit,
            },
        );

        tracing::debug!(
            returned = items.len(),
            filtered,
            degraded = ?degraded,
            "hybrid search complete"
        );

        Ok(SearchOutcome {
            items,
            degraded,
            failures,
            filtered,
        })
    }

    async fn vector_branch(
        &self,
        query: &str,
        candidates: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, BranchFailure> {
        let vector = self
            .embed(query)
            .await
            .map_err(|e| BranchFailure::embedding(&e))?;
        let timeout = self.config.store_timeout;
        let result =
            tokio::time::timeout(timeout, self.vector_store.query(&vector, candidates, service))
                .await
                .unwrap_or(Err(StoreError::Timeout(timeout)));
        result.map_err(|e| BranchFailure::store(Branch::Vector, &e))
    }

    async fn lexical_branch(
        &self,
        query: &str,
        candidates: usize,
        service: Option<&str>,
    ) -> Result<Vec<StoreHit>, BranchFailure> {
        let timeout = self.config.store_timeout;
        let result =
            tokio::time::timeout(timeout, self.lexical_store.query(query, candidates, service))
                .await
                .unwrap_or(Err(StoreError::Timeout(timeout)));
        result.map_err(|e| BranchFailure::store(Branch::Lexical, &e))
    }

    /// Embed through the cache, validating the provider's output
    ///
    /// # Errors
    /// Provider errors, timeouts, and unusable vectors
    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>, EmbeddingError> {
        let timeout = self.config.embedding_timeout;
        let expected = self.embedder.dimension();
        self.cache
            .try_get_or_insert_with(Fingerprint::of(text), || async move {
                let vector = tokio::time::timeout(timeout, self.embedder.embed(text))
                    .await
                    .map_err(|_| EmbeddingError::Timeout(timeout))??;
                check_vector(&vector, expected)?;
                Ok(vector)
            })
            .await
    }
}

fn check_vector(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidVector("non-finite component".to_string()));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::InvalidVector("zero vector".to_string()));
    }
    Ok(())
}

fn validate_alpha(alpha: f64) -> Result<(), RetrievalError> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(RetrievalError::InvalidAlpha(alpha))
    }
}

/// Parameters for [`fuse`]
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    /// Semantic weight in [0, 1]
    pub alpha: f64,
    /// Lexical normalisation divisor
    pub lexical_divisor: f64,
    /// Apply the placeholder-service rule
    pub require_service: bool,
    /// Maximum items kept
    pub limit: usize,
}

/// Normalise a vector-branch score into [0, 1]
#[inline]
#[must_use]
pub fn normalize_vector_score(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

/// Normalise a lexical-branch score into [0, 1]
#[inline]
#[must_use]
pub fn normalize_lexical_score(raw: f64, divisor: f64) -> f64 {
    if raw.is_nan() || divisor <= 0.0 {
        0.0
    } else {
        (raw / divisor).clamp(0.0, 1.0)
    }
}

/// Merge both branches' hits into ranked evidence
///
/// Returns the kept items and how many merged records the quality rules
/// dropped. A record survives with a zero fused score when `alpha` puts
/// all weight on the branch that missed it; only records neither branch
/// scored above zero are discarded.
#[must_use]
pub fn fuse(
    vector_hits: Vec<StoreHit>,
    lexical_hits: Vec<StoreHit>,
    params: FusionParams,
) -> (Vec<EvidenceItem>, usize) {
    let mut merged: IndexMap<Fingerprint, Candidate> = IndexMap::new();

    for (rank, hit) in vector_hits.into_iter().enumerate() {
        let score = normalize_vector_score(hit.score);
        let candidate = upsert(&mut merged, hit, params.require_service);
        candidate.item.vector_score = candidate.item.vector_score.max(score);
        candidate.vector_rank = Some(candidate.vector_rank.map_or(rank, |r| r.min(rank)));
    }
    for (rank, hit) in lexical_hits.into_iter().enumerate() {
        let score = normalize_lexical_score(hit.score, params.lexical_divisor);
        let candidate = upsert(&mut merged, hit, params.require_service);
        candidate.item.lexical_score = candidate.item.lexical_score.max(score);
        candidate.lexical_rank = Some(candidate.lexical_rank.map_or(rank, |r| r.min(rank)));
    }

    let before = merged.len();
    let mut kept: Vec<Candidate> = merged
        .into_values()
        .filter(|c| c.item.passes_quality(params.require_service))
        .collect();
    let filtered = before - kept.len();

    for c in &mut kept {
        c.item.hybrid_score =
            params.alpha * c.item.vector_score + (1.0 - params.alpha) * c.item.lexical_score;
    }
    kept.retain(|c| c.item.vector_score > 0.0 || c.item.lexical_score > 0.0);

    kept.sort_by(|a, b| {
        b.item
            .hybrid_score
            .total_cmp(&a.item.hybrid_score)
            .then_with(|| rank_order(a.vector_rank, b.vector_rank))
            .then_with(|| rank_order(a.lexical_rank, b.lexical_rank))
    });
    kept.truncate(params.limit);

    (kept.into_iter().map(|c| c.item).collect(), filtered)
}

fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn upsert(
    merged: &mut IndexMap<Fingerprint, Candidate>,
    hit: StoreHit,
    require_service: bool,
) -> &mut Candidate {
    let item = EvidenceItem {
        source_type: hit.metadata.source_type(),
        service_name: hit.metadata.service_name.clone(),
        source_locator: hit.metadata.source_locator.clone(),
        timestamp: hit.metadata.timestamp,
        content: hit.content,
        vector_score: 0.0,
        lexical_score: 0.0,
        hybrid_score: 0.0,
    };

    let candidate = merged
        .entry(Fingerprint::of(&item.content))
        .or_insert_with(|| Candidate {
            item: item.clone(),
            vector_rank: None,
            lexical_rank: None,
        });

    // A valid copy of a duplicated chunk replaces an invalid one's provenance.
    if !candidate.item.passes_quality(require_service) && item.passes_quality(require_service) {
        candidate.item.source_type = item.source_type;
        candidate.item.service_name = item.service_name;
        candidate.item.source_locator = item.source_locator;
        candidate.item.timestamp = item.timestamp;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HitMetadata;

    fn hit(content: &str, service: Option<&str>, score: f64) -> StoreHit {
        StoreHit {
            content: content.to_string(),
            metadata: HitMetadata {
                source_type: "logs".to_string(),
                service_name: service.map(String::from),
                source_locator: None,
                timestamp: None,
            },
            score,
        }
    }

    fn params(limit: usize) -> FusionParams {
        FusionParams {
            alpha: 0.6,
            lexical_divisor: 3.0,
            require_service: true,
            limit,
        }
    }

    #[test]
    fn merged_record_carries_both_scores() {
        let (items, _) = fuse(
            vec![hit("redis timeout", Some("a"), 0.9)],
            vec![hit("REDIS  timeout", Some("a"), 2.4)],
            params(5),
        );
        assert_eq!(items.len(), 1);
        assert!((items[0].hybrid_score - 0.86).abs() < 1e-9);
        assert!((items[0].lexical_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn lexical_scores_are_clamped() {
        assert_eq!(normalize_lexical_score(9.0, 3.0), 1.0);
        assert_eq!(normalize_lexical_score(-1.0, 3.0), 0.0);
        assert_eq!(normalize_lexical_score(f64::NAN, 3.0), 0.0);
        assert_eq!(normalize_vector_score(1.2), 1.0);
    }

    #[test]
    fn filter_runs_before_truncation() {
        let (items, filtered) = fuse(
            vec![
                hit("placeholder one", Some("None"), 0.99),
                hit("placeholder two", Some("unknown"), 0.98),
                hit("valid", Some("service-a"), 0.2),
            ],
            vec![],
            params(1),
        );
        assert_eq!(filtered, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "valid");
    }

    #[test]
    fn invalid_source_type_is_dropped_even_unscoped() {
        let mut bad = hit("from slack", Some("service-a"), 0.9);
        bad.metadata.source_type = "slack".to_string();
        let (items, filtered) = fuse(
            vec![bad],
            vec![],
            FusionParams {
                require_service: false,
                ..params(5)
            },
        );
        assert!(items.is_empty());
        assert_eq!(filtered, 1);
    }

    #[test]
    fn valid_duplicate_rescues_invalid_provenance() {
        let (items, filtered) = fuse(
            vec![hit("same chunk", None, 0.5)],
            vec![hit("same chunk", Some("service-b"), 1.5)],
            params(5),
        );
        assert_eq!(filtered, 0);
        assert_eq!(items[0].service_name.as_deref(), Some("service-b"));
    }

    #[test]
    fn ties_break_by_vector_rank() {
        let (items, _) = fuse(
            vec![hit("first", Some("a"), 0.5), hit("second", Some("a"), 0.5)],
            vec![],
            params(5),
        );
        assert_eq!(items[0].content, "first");
        assert_eq!(items[1].content, "second");
    }

    #[test]
    fn zero_scores_are_discarded() {
        let (items, _) = fuse(vec![hit("nothing", Some("a"), 0.0)], vec![], params(5));
        assert!(items.is_empty());
    }

    #[test]
    fn full_semantic_weight_keeps_lexical_only_matches() {
        let (items, filtered) = fuse(
            vec![],
            vec![hit("cpu 98%", Some("a"), 2.4), hit("gc pause", Some("a"), 0.9)],
            FusionParams {
                alpha: 1.0,
                ..params(5)
            },
        );
        assert_eq!(filtered, 0);
        let order: Vec<&str> = items.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(order, vec!["cpu 98%", "gc pause"]);
        assert!(items.iter().all(|i| i.hybrid_score == 0.0));
    }

    #[test]
    fn zero_semantic_weight_keeps_vector_only_matches() {
        let (items, _) = fuse(
            vec![hit("heap growth", Some("a"), 0.7)],
            vec![],
            FusionParams {
                alpha: 0.0,
                ..params(5)
            },
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].hybrid_score, 0.0);
        assert!((items[0].vector_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let bad = SearchConfig {
            candidate_multiplier: 1,
            ..SearchConfig::default()
        };
        assert!(matches!(bad.validate(), Err(RetrievalError::InvalidConfig(_))));
        let bad_alpha = SearchConfig {
            alpha: 1.5,
            ..SearchConfig::default()
        };
        assert!(matches!(bad_alpha.validate(), Err(RetrievalError::InvalidAlpha(_))));
    }

    #[test]
    fn zero_vectors_are_rejected() {
        assert!(check_vector(&[0.0, 0.0], 2).is_err());
        assert!(check_vector(&[1.0], 2).is_err());
        assert!(check_vector(&[f32::NAN, 1.0], 2).is_err());
        assert!(check_vector(&[0.0, 1.0], 2).is_ok());
    }
}
