//! Testing utilities for RCA workspace
//!
//! Shared fixtures, failing backends, and a ready-made orchestrator.

#![allow(missing_docs)]

use parking_lot::Mutex;
use rca_core::{
    AnalysisRequest, Backends, GenerationError, Hypothesis, Orchestrator, RcaConfig, Solution,
    TemplateGenerator, TextGenerator,
};
use rca_retrieval::{
    Document, EmbeddingError, EmbeddingProvider, HashingEmbedder, LexicalStore, MemoryLexicalStore,
    MemoryVectorStore, StoreError, StoreHit, VectorStore,
};
use rca_topology::{GraphStore, GraphStoreError, MemoryGraphStore, RawRelation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EMBEDDING_DIMENSION: usize = 64;

/// Log, metric, and ticket chunks around a service-b CPU incident
pub fn incident_documents() -> Vec<Document> {
    vec![
        Document::new(
            "service-b CPU usage at 98% for 10 minutes, request threads saturated",
            "metrics",
            Some("service-b"),
        )
        .with_locator("prometheus://cpu/service-b"),
        Document::new(
            "service-b response timeouts after 30s while CPU usage critical",
            "logs",
            Some("service-b"),
        )
        .with_locator("logs/service-b/2024-05-01.log"),
        Document::new(
            "service-a upstream call to service-b timed out, returning 504",
            "logs",
            Some("service-a"),
        ),
        Document::new(
            "redis connection pool exhausted, connections refused",
            "logs",
            Some("redis"),
        ),
        Document::new(
            "Runbook: mysql slow queries increase latency for order-service",
            "wiki",
            Some("mysql"),
        ),
        Document::new("CPU usage critical on unknown host", "logs", Some("unknown")),
        Document::new("response timeouts observed somewhere", "logs", None),
    ]
}

/// Traffic around service-b, plus records a real graph store may hold
pub fn service_relations() -> Vec<RawRelation> {
    vec![
        RawRelation::new("service-a", "service-b", "CALLS"),
        RawRelation::new("service-b", "redis", "CALLS"),
        RawRelation::new("service-b", "mysql", "DEPENDS_ON"),
        RawRelation::new("gateway", "service-a", "ROUTES_TO"),
        RawRelation::new("redis", "cache-cluster", "CALLS"),
        RawRelation::new("null", "service-b", "CALLS"),
        RawRelation {
            from_service: Some("service-b".into()),
            to_service: None,
            relation_kind: Some("CALLS".into()),
            ..RawRelation::default()
        },
        RawRelation::new("service-b", "kafka", "PUBLISHES_TO"),
    ]
}

/// Configuration with short deadlines for tests
pub fn test_config() -> RcaConfig {
    let mut config = RcaConfig::new()
        .with_store_timeout(Duration::from_millis(500))
        .with_generation_timeout(Duration::from_millis(500));
    config.timeouts.embedding_ms = 500;
    config.orchestrator.poll_interval_ms = 5;
    config
}

/// Memory backends loaded with the fixture corpus and the template generator
pub fn fixture_backends() -> Backends {
    let embedder = HashingEmbedder::new(EMBEDDING_DIMENSION);
    let vectors = MemoryVectorStore::new();
    vectors
        .index(&embedder, incident_documents())
        .unwrap_or_default();
    let lexical = MemoryLexicalStore::new();
    lexical.index(incident_documents());

    Backends {
        embedder: Arc::new(embedder),
        vector_store: Arc::new(vectors),
        lexical_store: Arc::new(lexical),
        graph_store: Arc::new(MemoryGraphStore::from_relations(service_relations())),
        generator: Arc::new(TemplateGenerator::new()),
    }
}

/// Fixture backends with a different generator
pub fn backends_with_generator(generator: Arc<dyn TextGenerator>) -> Backends {
    Backends {
        generator,
        ..fixture_backends()
    }
}

pub fn setup_test_orchestrator() -> Orchestrator {
    orchestrator_with(fixture_backends())
}

pub fn orchestrator_with(backends: Backends) -> Orchestrator {
    orchestrator_with_config(test_config(), backends)
}

pub fn orchestrator_with_config(config: RcaConfig, backends: Backends) -> Orchestrator {
    match Orchestrator::new(config, backends) {
        Ok(orchestrator) => orchestrator,
        Err(e) => panic!("test configuration rejected: {e}"),
    }
}

/// Embedder that is always down
#[derive(Debug, Default)]
pub struct FailingEmbedder {
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::Unavailable("connection refused".into()))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Vector and lexical store that is always down
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

#[async_trait::async_trait]
impl VectorStore for FailingStore {
    async fn query(
        &self,
        _vector: &[f32],
        _limit: usize,
        _service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[async_trait::async_trait]
impl LexicalStore for FailingStore {
    async fn query(
        &self,
        _text: &str,
        _limit: usize,
        _service: Option<&str>,
    ) -> Result<Vec<StoreHit>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Graph store that is always down
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingGraphStore;

#[async_trait::async_trait]
impl GraphStore for FailingGraphStore {
    async fn outgoing(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Err(GraphStoreError::Unavailable("connection refused".into()))
    }

    async fn incoming(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Err(GraphStoreError::Unavailable("connection refused".into()))
    }
}

/// Generator whose every call fails with a copy of `error`
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    error: GenerationError,
}

impl FailingGenerator {
    pub fn new(error: GenerationError) -> Self {
        Self { error }
    }

    pub fn unavailable() -> Self {
        Self::new(GenerationError::Unavailable("connection refused".into()))
    }
}

#[async_trait::async_trait]
impl TextGenerator for FailingGenerator {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError> {
        Err(self.error.clone())
    }

    async fn recommend(
        &self,
        _request: &AnalysisRequest,
        _hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError> {
        Err(self.error.clone())
    }
}

/// Generator that analyzes normally, then never answers `recommend`
///
/// Keeps a task parked in the execution phase.
#[derive(Debug, Default)]
pub struct HangingGenerator {
    entered: AtomicUsize,
}

impl HangingGenerator {
    /// True once `recommend` was entered
    pub fn is_waiting(&self) -> bool {
        self.entered.load(Ordering::SeqCst) > 0
    }
}

#[async_trait::async_trait]
impl TextGenerator for HangingGenerator {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError> {
        TemplateGenerator::new().analyze(request).await
    }

    async fn recommend(
        &self,
        _request: &AnalysisRequest,
        _hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Generator that panics, for supervisor tests
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingGenerator;

#[async_trait::async_trait]
impl TextGenerator for PanickingGenerator {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError> {
        panic!("generator bug")
    }

    async fn recommend(
        &self,
        _request: &AnalysisRequest,
        _hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError> {
        panic!("generator bug")
    }
}

/// Template generator that remembers every request it saw
#[derive(Debug, Default)]
pub struct RecordingGenerator {
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl RecordingGenerator {
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for RecordingGenerator {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError> {
        self.requests.lock().push(request.clone());
        TemplateGenerator::new().analyze(request).await
    }

    async fn recommend(
        &self,
        request: &AnalysisRequest,
        hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError> {
        TemplateGenerator::new().recommend(request, hypotheses).await
    }
}
