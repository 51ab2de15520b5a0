//! Relation model
//!
//! [`RawRelation`] is what a store hands back and may be malformed.
//! [`TopologyRelation`] can only be built through validation, so every value
//! of that type has two real endpoints and a known kind.

use crate::error::RelationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Endpoint values that upstream serialisers emit for a missing name
pub const NULL_ENDPOINTS: &[&str] = &["null", "None"];

/// Directed relation kinds between services
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Static dependency (database, cache, library)
    DependsOn,
    /// Runtime request flow
    Calls,
    /// Traffic routing (gateway, load balancer)
    RoutesTo,
}

impl RelationKind {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::DependsOn => "DEPENDS_ON",
            RelationKind::Calls => "CALLS",
            RelationKind::RoutesTo => "ROUTES_TO",
        }
    }

    /// Kinds followed when computing the impact set
    #[inline]
    #[must_use]
    pub const fn propagates_impact(self) -> bool {
        matches!(self, RelationKind::Calls | RelationKind::RoutesTo)
    }
}

impl FromStr for RelationKind {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEPENDS_ON" => Ok(RelationKind::DependsOn),
            "CALLS" => Ok(RelationKind::Calls),
            "ROUTES_TO" => Ok(RelationKind::RoutesTo),
            _ => Err(RelationError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation exactly as returned by a graph store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRelation {
    /// Source endpoint
    #[serde(default)]
    pub from_service: Option<String>,
    /// Target endpoint
    #[serde(default)]
    pub to_service: Option<String>,
    /// Kind as a string
    #[serde(default)]
    pub relation_kind: Option<String>,
    /// Free-form edge attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RawRelation {
    /// Raw relation with all three fields present
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            from_service: Some(from.into()),
            to_service: Some(to.into()),
            relation_kind: Some(kind.into()),
            attributes: BTreeMap::new(),
        }
    }
}

/// A validated relation between two named services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRelation")]
pub struct TopologyRelation {
    from_service: String,
    to_service: String,
    relation_kind: RelationKind,
    attributes: BTreeMap<String, serde_json::Value>,
}

impl TopologyRelation {
    /// Validate endpoints and build the relation
    ///
    /// # Errors
    /// `MissingEndpoint` for blank names, `PlaceholderEndpoint` for `null`/`None`
    pub fn new(
        from_service: impl Into<String>,
        to_service: impl Into<String>,
        relation_kind: RelationKind,
    ) -> Result<Self, RelationError> {
        Ok(Self {
            from_service: validate_endpoint("from_service", Some(from_service.into()))?,
            to_service: validate_endpoint("to_service", Some(to_service.into()))?,
            relation_kind,
            attributes: BTreeMap::new(),
        })
    }

    /// Attach an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Source endpoint
    #[inline]
    #[must_use]
    pub fn from_service(&self) -> &str {
        &self.from_service
    }

    /// Target endpoint
    #[inline]
    #[must_use]
    pub fn to_service(&self) -> &str {
        &self.to_service
    }

    /// Relation kind
    #[inline]
    #[must_use]
    pub fn relation_kind(&self) -> RelationKind {
        self.relation_kind
    }

    /// Edge attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }

    /// Identity used for deduplication
    #[must_use]
    pub fn key(&self) -> (&str, &str, RelationKind) {
        (&self.from_service, &self.to_service, self.relation_kind)
    }

    /// True when either endpoint is `service`
    #[must_use]
    pub fn touches(&self, service: &str) -> bool {
        self.from_service == service || self.to_service == service
    }
}

impl fmt::Display for TopologyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.from_service, self.relation_kind, self.to_service
        )
    }
}

impl TryFrom<RawRelation> for TopologyRelation {
    type Error = RelationError;

    fn try_from(raw: RawRelation) -> Result<Self, Self::Error> {
        let from_service = validate_endpoint("from_service", raw.from_service)?;
        let to_service = validate_endpoint("to_service", raw.to_service)?;
        let relation_kind = raw
            .relation_kind
            .as_deref()
            .ok_or(RelationError::MissingKind)?
            .parse()?;
        Ok(Self {
            from_service,
            to_service,
            relation_kind,
            attributes: raw.attributes,
        })
    }
}

impl From<TopologyRelation> for RawRelation {
    fn from(relation: TopologyRelation) -> Self {
        Self {
            from_service: Some(relation.from_service),
            to_service: Some(relation.to_service),
            relation_kind: Some(relation.relation_kind.as_str().to_string()),
            attributes: relation.attributes,
        }
    }
}

fn validate_endpoint(field: &'static str, value: Option<String>) -> Result<String, RelationError> {
    let value = value.ok_or(RelationError::MissingEndpoint(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RelationError::MissingEndpoint(field));
    }
    if NULL_ENDPOINTS.contains(&trimmed) {
        return Err(RelationError::PlaceholderEndpoint {
            field,
            value: trimmed.to_string(),
        });
    }
    Ok(trimmed.to_string())
}
