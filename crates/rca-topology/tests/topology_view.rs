//! Topology lookup against in-memory and failing stores

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rca_topology::{
    GraphStore, GraphStoreError, MemoryGraphStore, RawRelation, RelationKind, TopologyAnalyzer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct DownStore;

#[async_trait]
impl GraphStore for DownStore {
    async fn outgoing(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Err(GraphStoreError::Unavailable("bolt://graph:7687 refused".into()))
    }

    async fn incoming(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Err(GraphStoreError::Unavailable("bolt://graph:7687 refused".into()))
    }
}

struct SlowStore;

#[async_trait]
impl GraphStore for SlowStore {
    async fn outgoing(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn incoming(&self, _service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        Ok(Vec::new())
    }
}

/// Answers hop 1 from an inner store, then fails every later call
struct FailsAfterFirstHop {
    inner: MemoryGraphStore,
    outgoing_calls: AtomicUsize,
}

#[async_trait]
impl GraphStore for FailsAfterFirstHop {
    async fn outgoing(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        if self.outgoing_calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(GraphStoreError::Query("expansion failed".into()));
        }
        self.inner.outgoing(service).await
    }

    async fn incoming(&self, service: &str) -> Result<Vec<RawRelation>, GraphStoreError> {
        self.inner.incoming(service).await
    }
}

fn null_target(from: &str) -> RawRelation {
    RawRelation {
        to_service: None,
        ..RawRelation::new(from, "", "CALLS")
    }
}

#[tokio::test]
async fn relation_with_null_endpoint_is_excluded() {
    let raw = vec![
        RawRelation::new("service-a", "service-b", "CALLS"),
        null_target("service-a"),
    ];
    let raw_len = raw.len();
    let analyzer = TopologyAnalyzer::new(Arc::new(MemoryGraphStore::from_relations(raw)));

    let view = analyzer.get_topology(&["service-a"]).await;

    assert_eq!(view.relations.len(), raw_len - 1);
    assert_eq!(view.dropped, 1);
    for relation in &view.relations {
        assert!(!relation.from_service().is_empty());
        assert!(!relation.to_service().is_empty());
    }
    assert_eq!(view.impacted, vec!["service-b".to_string()]);
}

#[tokio::test]
async fn relation_seen_from_both_ends_is_kept_once() {
    let store = MemoryGraphStore::from_relations([
        RawRelation::new("service-a", "service-b", "CALLS"),
        RawRelation::new("gateway", "service-a", "ROUTES_TO"),
    ]);
    let analyzer = TopologyAnalyzer::new(Arc::new(store));

    let view = analyzer.get_topology(&["service-a", "service-b"]).await;

    assert_eq!(view.relations.len(), 2);
    assert!(view.impacted.is_empty());
    assert_eq!(
        view.callers_of("service-a"),
        vec![("gateway", RelationKind::RoutesTo)]
    );
}

#[tokio::test]
async fn impact_expands_to_second_hop_only() {
    let store = MemoryGraphStore::from_relations([
        RawRelation::new("service-a", "service-b", "CALLS"),
        RawRelation::new("service-b", "service-c", "CALLS"),
        RawRelation::new("service-c", "service-d", "CALLS"),
        RawRelation::new("service-a", "mysql", "DEPENDS_ON"),
    ]);
    let analyzer = TopologyAnalyzer::new(Arc::new(store));

    let view = analyzer.get_topology(&["service-a"]).await;

    assert_eq!(
        view.impacted,
        vec!["service-b".to_string(), "service-c".to_string()]
    );
    assert_eq!(view.dependencies_of("service-a").len(), 2);
}

#[tokio::test]
async fn unreachable_store_gives_empty_view() {
    let analyzer = TopologyAnalyzer::new(Arc::new(DownStore));

    let view = analyzer.get_topology(&["service-a"]).await;

    assert!(view.is_empty());
    assert!(view.impacted.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_into_empty_view() {
    let analyzer =
        TopologyAnalyzer::new(Arc::new(SlowStore)).with_timeout(Duration::from_millis(100));

    let view = analyzer.get_topology(&["service-a"]).await;

    assert!(view.is_empty());
}

#[tokio::test]
async fn later_hop_failure_keeps_first_hop() {
    let store = FailsAfterFirstHop {
        inner: MemoryGraphStore::from_relations([
            RawRelation::new("service-a", "service-b", "CALLS"),
            RawRelation::new("service-b", "service-c", "CALLS"),
        ]),
        outgoing_calls: AtomicUsize::new(0),
    };
    let analyzer = TopologyAnalyzer::new(Arc::new(store));

    let view = analyzer.get_topology(&["service-a"]).await;

    assert_eq!(view.relations.len(), 1);
    assert_eq!(view.impacted, vec!["service-b".to_string()]);
}

#[tokio::test]
async fn blank_inputs_skip_the_store() {
    let analyzer = TopologyAnalyzer::new(Arc::new(DownStore));
    let view = analyzer.get_topology(&["", "  "]).await;
    assert_eq!(view, rca_topology::TopologyView::empty());
}

fn endpoint() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("  ".to_string())),
        Just(Some("null".to_string())),
        Just(Some("None".to_string())),
        "svc-[a-d]".prop_map(Some),
    ]
}

fn raw_relation() -> impl Strategy<Value = RawRelation> {
    (
        endpoint(),
        endpoint(),
        prop_oneof![
            Just(Some("CALLS".to_string())),
            Just(Some("ROUTES_TO".to_string())),
            Just(Some("DEPENDS_ON".to_string())),
            Just(Some("OWNS".to_string())),
            Just(None),
        ],
    )
        .prop_map(|(from, to, kind)| RawRelation {
            from_service: from,
            to_service: to,
            relation_kind: kind,
            ..RawRelation::default()
        })
}

proptest! {
    #[test]
    fn returned_relations_always_have_real_endpoints(
        raw in proptest::collection::vec(raw_relation(), 0..40),
        inputs in proptest::collection::vec("svc-[a-d]", 1..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let analyzer = TopologyAnalyzer::new(Arc::new(MemoryGraphStore::from_relations(raw)));

        let view = runtime.block_on(analyzer.get_topology(inputs.as_slice()));

        for relation in &view.relations {
            for name in [relation.from_service(), relation.to_service()] {
                prop_assert!(!name.trim().is_empty());
                prop_assert!(name != "null" && name != "None");
            }
        }
        for service in &view.impacted {
            prop_assert!(!inputs.contains(service));
        }
    }
}
