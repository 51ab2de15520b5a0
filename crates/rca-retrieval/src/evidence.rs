//! Evidence records and their data-quality rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service names that upstream indexers emit when the real name is missing
pub const PLACEHOLDER_SERVICE_NAMES: &[&str] = &["", "unknown", "None", "null"];

/// Where a piece of evidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Application or system logs
    Logs,
    /// Runbooks and wiki pages
    Wiki,
    /// Past incident tickets
    Ticket,
    /// Source repositories
    Repo,
    /// Anything unrecognised
    Invalid,
}

impl SourceType {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceType::Logs => "logs",
            SourceType::Wiki => "wiki",
            SourceType::Ticket => "ticket",
            SourceType::Repo => "repo",
            SourceType::Invalid => "invalid",
        }
    }

    /// Parse leniently: case-insensitive, singular/plural, unknown → `Invalid`
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "logs" | "log" => SourceType::Logs,
            "wiki" | "doc" | "docs" => SourceType::Wiki,
            "ticket" | "tickets" | "incident" => SourceType::Ticket,
            "repo" | "code" | "repository" => SourceType::Repo,
            _ => SourceType::Invalid,
        }
    }
}

impl FromStr for SourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `name` is missing or one of the known placeholders
#[must_use]
pub fn is_placeholder_service(name: Option<&str>) -> bool {
    match name {
        None => true,
        Some(n) => {
            let trimmed = n.trim();
            PLACEHOLDER_SERVICE_NAMES
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
        }
    }
}

/// A retrieved content fragment with provenance and scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Fragment text
    pub content: String,
    /// Origin category
    pub source_type: SourceType,
    /// Owning service, if known
    pub service_name: Option<String>,
    /// File + line, document id, or similar
    pub source_locator: Option<String>,
    /// When the underlying record was produced
    pub timestamp: Option<DateTime<Utc>>,
    /// Normalised semantic similarity in [0, 1]
    pub vector_score: f64,
    /// Normalised lexical score in [0, 1]
    pub lexical_score: f64,
    /// Fused ranking score
    pub hybrid_score: f64,
}

impl EvidenceItem {
    /// Check the data-quality rules
    ///
    /// `require_service` drops items without a real service name.
    #[must_use]
    pub fn passes_quality(&self, require_service: bool) -> bool {
        if self.source_type == SourceType::Invalid {
            return false;
        }
        !(require_service && is_placeholder_service(self.service_name.as_deref()))
    }

    /// Case-insensitive service match
    #[must_use]
    pub fn belongs_to(&self, service: &str) -> bool {
        self.service_name
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(service.trim()))
    }
}
