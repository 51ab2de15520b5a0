//! RCA Entity - service and metric extraction
//!
//! Turns free-form incident text into the entity lists that drive topology
//! lookup and service-scoped retrieval:
//! - Service identifiers by naming convention (`service-x`, `x-api`, ...)
//! - Bare infrastructure names (`redis`, `kafka`, ...)
//! - Metric families from a fixed vocabulary, in ASCII and CJK spellings
//!
//! # Example
//!
//! ```rust
//! use rca_entity::{extract, Metric};
//!
//! let entities = extract("service-b的CPU使用率过高");
//! assert_eq!(entities.services, vec!["service-b".to_string()]);
//! assert_eq!(entities.metrics, vec![Metric::Cpu]);
//! ```

#![warn(unreachable_pub)]

pub mod extractor;
pub mod vocabulary;

pub use extractor::{extract, Entities, EntityExtractor};
pub use vocabulary::Metric;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
