//! Topology analyzer
//!
//! ## Lookup
//!
//! Hop 1 queries outgoing and incoming relations of every input service
//! concurrently. Further hops, up to `max_depth`, query outgoing relations of
//! services newly reached over `CALLS`/`ROUTES_TO` edges.
//!
//! ## Validation
//!
//! Raw relations are converted through [`TopologyRelation::try_from`]; rejects
//! are counted and logged, never propagated. Identical relations collapse to
//! the first seen.
//!
//! ## Failure
//!
//! Topology is advisory. A hop-1 store failure yields an empty view; a failure
//! on a later hop stops expansion and keeps what was collected.

use crate::error::GraphStoreError;
use crate::relation::{RawRelation, RelationKind, TopologyRelation};
use crate::store::GraphStore;
use futures::future::join_all;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Default traversal depth for the impact set
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// Validated neighbourhood of a set of services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyView {
    /// Surviving relations, first-seen order
    pub relations: Vec<TopologyRelation>,
    /// Services reachable from the inputs, inputs excluded, sorted
    pub impacted: Vec<String>,
    /// Raw relations rejected by validation
    pub dropped: usize,
}

impl TopologyView {
    /// Empty view
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no relation survived
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Targets of relations leaving `service`
    #[must_use]
    pub fn dependencies_of(&self, service: &str) -> Vec<(&str, RelationKind)> {
        self.relations
            .iter()
            .filter(|r| r.from_service() == service)
            .map(|r| (r.to_service(), r.relation_kind()))
            .collect()
    }

    /// Sources of relations entering `service`
    #[must_use]
    pub fn callers_of(&self, service: &str) -> Vec<(&str, RelationKind)> {
        self.relations
            .iter()
            .filter(|r| r.to_service() == service)
            .map(|r| (r.from_service(), r.relation_kind()))
            .collect()
    }
}

/// Looks up and validates service relations
#[derive(Clone)]
pub struct TopologyAnalyzer {
    store: Arc<dyn GraphStore>,
    max_depth: usize,
    timeout: Duration,
}

impl std::fmt::Debug for TopologyAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyAnalyzer")
            .field("max_depth", &self.max_depth)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TopologyAnalyzer {
    /// Create analyzer with depth 2 and a 15s store timeout
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: Duration::from_secs(15),
        }
    }

    /// With traversal depth; values below 1 are raised to 1
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// With per-call store timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the validated view around `service_names`
    ///
    /// Never fails; store problems produce an empty or partial view.
    #[tracing::instrument(skip_all, fields(services = service_names.len()))]
    pub async fn get_topology<S>(&self, service_names: &[S]) -> TopologyView
    where
        S: AsRef<str> + Sync,
    {
        let inputs = normalise_inputs(service_names);
        if inputs.is_empty() {
            return TopologyView::empty();
        }

        let mut collector = Collector::default();

        let first_hop = join_all(inputs.iter().map(|name| self.neighbourhood(name))).await;
        for result in first_hop {
            match result {
                Ok(raw) => collector.absorb(raw),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retryable = e.is_retryable(),
                        "graph store failed, returning empty topology"
                    );
                    return TopologyView::empty();
                }
            }
        }

        let mut visited: HashSet<String> = inputs.iter().cloned().collect();
        let mut frontier = collector.traffic_targets(&visited);
        for _ in 1..self.max_depth {
            if frontier.is_empty() {
                break;
            }
            visited.extend(frontier.iter().cloned());
            let hop = join_all(frontier.iter().map(|name| self.outgoing(name))).await;
            let mut failed = false;
            for result in hop {
                match result {
                    Ok(raw) => collector.absorb(raw),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retryable = e.is_retryable(),
                            "graph expansion stopped early"
                        );
                        failed = true;
                    }
                }
            }
            if failed {
                break;
            }
            frontier = collector.traffic_targets(&visited);
        }

        if collector.dropped > 0 {
            tracing::warn!(dropped = collector.dropped, "discarded invalid topology relations");
        }

        let impacted = impacted_services(&collector.relations, &inputs, self.max_depth);
        tracing::debug!(
            relations = collector.relations.len(),
            impacted = impacted.len(),
            "topology built"
        );

        TopologyView {
            relations: collector.relations,
            impacted,
            dropped: collector.dropped,
        }
    }

    async fn neighbourhood(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        let (out, inc) = tokio::join!(self.outgoing(service), self.incoming(service));
        let mut raw = out?;
        raw.extend(inc?);
        Ok(raw)
    }

    async fn outgoing(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        tokio::time::timeout(self.timeout, self.store.outgoing(service))
            .await
            .map_err(|_| GraphStoreError::Timeout(self.timeout))?
    }

    async fn incoming(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        tokio::time::timeout(self.timeout, self.store.incoming(service))
            .await
            .map_err(|_| GraphStoreError::Timeout(self.timeout))?
    }
}

#[derive(Default)]
struct Collector {
    relations: Vec<TopologyRelation>,
    seen: HashSet<(String, String, RelationKind)>,
    dropped: usize,
}

impl Collector {
    fn absorb(&mut self, raw: Vec<RawRelation>) {
        for candidate in raw {
            match TopologyRelation::try_from(candidate) {
                Ok(relation) => {
                    let (from, to, kind) = relation.key();
                    if self.seen.insert((from.to_string(), to.to_string(), kind)) {
                        self.relations.push(relation);
                    }
                }
                Err(reason) => {
                    tracing::debug!(%reason, "invalid relation");
                    self.dropped += 1;
                }
            }
        }
    }

    fn traffic_targets(&self, visited: &HashSet<String>) -> Vec<String> {
        let targets: BTreeSet<&str> = self
            .relations
            .iter()
            .filter(|r| r.relation_kind().propagates_impact())
            .filter(|r| visited.contains(r.from_service()))
            .map(TopologyRelation::to_service)
            .filter(|to| !visited.contains(*to))
            .collect();
        targets.into_iter().map(String::from).collect()
    }
}

fn normalise_inputs<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_string()))
        .map(String::from)
        .collect()
}

/// Bounded BFS over traffic edges from `inputs`
///
/// Returns sorted services within `max_depth` hops, inputs excluded.
#[must_use]
pub fn impacted_services(
    relations: &[TopologyRelation],
    inputs: &[String],
    max_depth: usize,
) -> Vec<String> {
    let mut graph: DiGraphMap<&str, RelationKind> = DiGraphMap::new();
    for relation in relations
        .iter()
        .filter(|r| r.relation_kind().propagates_impact())
    {
        graph.add_edge(relation.from_service(), relation.to_service(), relation.relation_kind());
    }

    let sources: HashSet<&str> = inputs.iter().map(String::as_str).collect();
    let mut reached: BTreeSet<&str> = BTreeSet::new();
    let mut seen: HashSet<&str> = sources.clone();
    let mut queue: VecDeque<(&str, usize)> = sources.iter().map(|s| (*s, 0)).collect();

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth || !graph.contains_node(node) {
            continue;
        }
        for next in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
            if seen.insert(next) {
                reached.insert(next);
                queue.push_back((next, depth + 1));
            }
        }
    }

    reached.into_iter().map(String::from).collect()
}
