//! RCA Topology - service dependency view
//!
//! Answers "what is this service connected to" for the reasoning stage:
//! - Validated relations (no `null`/blank endpoints, closed kind set)
//! - A bounded impact set reached over `CALLS`/`ROUTES_TO` edges
//!
//! Malformed store data is dropped and counted, never propagated.
//!
//! # Example
//!
//! ```rust
//! use rca_topology::{MemoryGraphStore, RawRelation, TopologyAnalyzer};
//! use std::sync::Arc;
//!
//! # tokio_test_block_on(async {
//! let store = MemoryGraphStore::from_relations([
//!     RawRelation::new("service-a", "service-b", "CALLS"),
//!     RawRelation::new("service-b", "redis", "CALLS"),
//! ]);
//! let analyzer = TopologyAnalyzer::new(Arc::new(store));
//! let view = analyzer.get_topology(&["service-a"]).await;
//! assert_eq!(view.impacted, vec!["redis".to_string(), "service-b".to_string()]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod analyzer;
pub mod error;
pub mod relation;
pub mod store;

pub use analyzer::{impacted_services, TopologyAnalyzer, TopologyView, DEFAULT_MAX_DEPTH};
pub use error::{GraphStoreError, RelationError};
pub use relation::{RawRelation, RelationKind, TopologyRelation, NULL_ENDPOINTS};
pub use store::{GraphStore, MemoryGraphStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
