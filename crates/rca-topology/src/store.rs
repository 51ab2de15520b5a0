//! Graph store seam and an in-memory backend

use crate::error::GraphStoreError;
use crate::relation::RawRelation;
use parking_lot::RwLock;

/// Read access to a service dependency graph
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Relations whose source is `service`
    async fn outgoing(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError>;

    /// Relations whose target is `service`
    async fn incoming(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError>;
}

/// Graph store over a list of raw, possibly malformed relations
///
/// Endpoint matching is case-insensitive.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    relations: RwLock<Vec<RawRelation>>,
}

impl MemoryGraphStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store holding `relations`
    #[must_use]
    pub fn from_relations(relations: impl IntoIterator<Item = RawRelation>) -> Self {
        Self {
            relations: RwLock::new(relations.into_iter().collect()),
        }
    }

    /// Append a relation as-is
    pub fn insert(&self, relation: RawRelation) {
        self.relations.write().push(relation);
    }

    /// Number of stored relations, valid or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.relations.read().len()
    }

    /// True when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.read().is_empty()
    }

    fn matching(&self, pick: impl Fn(&RawRelation) -> Option<&String>, service: &str) -> Vec<RawRelation> {
        let service = service.trim();
        self.relations
            .read()
            .iter()
            .filter(|r| pick(r).is_some_and(|name| name.trim().eq_ignore_ascii_case(service)))
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraphStore {
    async fn outgoing(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Ok(self.matching(|r| r.from_service.as_ref(), service))
    }

    async fn incoming(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Ok(self.matching(|r| r.to_service.as_ref(), service))
    }
}
