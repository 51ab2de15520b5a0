//! Workspace configuration
//!
//! Loaded from TOML; every field has a default, so an empty file is valid.
//!
//! ```toml
//! [retrieval]
//! alpha = 0.6
//! lexical_divisor = 3.0
//!
//! [timeouts]
//! generation_ms = 30000
//! ```

use crate::error::ConfigError;
use rca_retrieval::{EmbeddingCache, SearchConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaConfig {
    /// Hybrid search tuning
    pub retrieval: RetrievalSettings,
    /// Embedding cache sizing
    pub cache: CacheSettings,
    /// Impact traversal
    pub topology: TopologySettings,
    /// Per-call deadlines
    pub timeouts: TimeoutSettings,
    /// Entity extraction additions
    pub entity: EntitySettings,
    /// Polling behaviour
    pub orchestrator: OrchestratorSettings,
}

/// Hybrid search tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Semantic weight in [0, 1]
    pub alpha: f64,
    /// Divisor bounding raw lexical scores
    pub lexical_divisor: f64,
    /// Candidates fetched per branch, as a multiple of the limit
    pub candidate_multiplier: usize,
    /// Evidence items kept from the main search
    pub default_limit: usize,
    /// Evidence items kept from each service-scoped search
    pub scoped_search_limit: usize,
    /// Services given their own scoped search
    pub max_scoped_services: usize,
    /// Drop unattributed evidence from unscoped searches too
    pub require_service_name: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            lexical_divisor: 3.0,
            candidate_multiplier: 3,
            default_limit: 10,
            scoped_search_limit: 3,
            max_scoped_services: 3,
            require_service_name: true,
        }
    }
}

/// Embedding cache sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum cached embeddings
    pub capacity: u64,
    /// Entry lifetime in seconds, 0 = no expiry
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 3_600,
        }
    }
}

/// Impact traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySettings {
    /// BFS depth over traffic edges
    pub max_depth: usize,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self { max_depth: 2 }
    }
}

/// Per-call deadlines in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Embedding provider
    pub embedding_ms: u64,
    /// Vector, lexical, and graph stores
    pub store_ms: u64,
    /// Text generation
    pub generation_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            embedding_ms: 10_000,
            store_ms: 15_000,
            generation_ms: 30_000,
        }
    }
}

impl TimeoutSettings {
    /// Embedding deadline
    #[inline]
    #[must_use]
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }

    /// Store deadline
    #[inline]
    #[must_use]
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    /// Generation deadline
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }
}

/// Entity extraction additions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySettings {
    /// Service names that follow no naming convention
    pub extra_known_services: Vec<String>,
}

/// Polling behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Interval used by [`crate::Orchestrator::wait_for_terminal`] callers
    pub poll_interval_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl OrchestratorSettings {
    /// Poll interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RcaConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With semantic weight
    #[inline]
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.retrieval.alpha = alpha;
        self
    }

    /// With lexical divisor
    #[inline]
    #[must_use]
    pub fn with_lexical_divisor(mut self, divisor: f64) -> Self {
        self.retrieval.lexical_divisor = divisor;
        self
    }

    /// With topology depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.topology.max_depth = depth;
        self
    }

    /// With generation timeout
    #[inline]
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.generation_ms = duration_ms(timeout);
        self
    }

    /// With store timeout
    #[inline]
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.store_ms = duration_ms(timeout);
        self
    }

    /// With extra known service names
    #[must_use]
    pub fn with_known_services<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity
            .extra_known_services
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// `Parse` for malformed TOML, `Invalid` for out-of-range values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file
    ///
    /// # Errors
    /// `Io` when the file cannot be read, otherwise as [`RcaConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.alpha) {
            return Err(invalid(format!("retrieval.alpha must be in [0, 1], got {}", r.alpha)));
        }
        if !(r.lexical_divisor.is_finite() && r.lexical_divisor > 0.0) {
            return Err(invalid(format!(
                "retrieval.lexical_divisor must be positive, got {}",
                r.lexical_divisor
            )));
        }
        if r.candidate_multiplier < 2 {
            return Err(invalid(format!(
                "retrieval.candidate_multiplier must be at least 2, got {}",
                r.candidate_multiplier
            )));
        }
        if r.default_limit == 0 {
            return Err(invalid("retrieval.default_limit must be positive"));
        }
        if self.topology.max_depth == 0 {
            return Err(invalid("topology.max_depth must be at least 1"));
        }
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be positive"));
        }
        let t = &self.timeouts;
        if t.embedding_ms == 0 || t.store_ms == 0 || t.generation_ms == 0 {
            return Err(invalid("timeouts must be positive"));
        }
        if self.orchestrator.poll_interval_ms == 0 {
            return Err(invalid("orchestrator.poll_interval_ms must be positive"));
        }
        Ok(())
    }

    /// Search parameters for the hybrid engine
    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            alpha: self.retrieval.alpha,
            lexical_divisor: self.retrieval.lexical_divisor,
            candidate_multiplier: self.retrieval.candidate_multiplier,
            require_service_name: self.retrieval.require_service_name,
            embedding_timeout: self.timeouts.embedding(),
            store_timeout: self.timeouts.store(),
        }
    }

    /// Embedding cache sized by `cache`
    #[must_use]
    pub fn embedding_cache(&self) -> EmbeddingCache {
        if self.cache.ttl_secs == 0 {
            EmbeddingCache::new(self.cache.capacity)
        } else {
            EmbeddingCache::with_ttl(self.cache.capacity, Duration::from_secs(self.cache.ttl_secs))
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = RcaConfig::from_toml_str("").unwrap();
        assert_eq!(config, RcaConfig::default());
        assert_eq!(config.timeouts.generation(), Duration::from_secs(30));
        assert_eq!(config.orchestrator.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RcaConfig::from_toml_str(
            r#"
            [retrieval]
            alpha = 0.8

            [entity]
            extra_known_services = ["billing"]
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.alpha, 0.8);
        assert_eq!(config.retrieval.lexical_divisor, 3.0);
        assert_eq!(config.entity.extra_known_services, vec!["billing".to_string()]);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            RcaConfig::from_toml_str("[retrieval]\nalpha = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(RcaConfig::new().with_lexical_divisor(0.0).validate().is_err());
        assert!(RcaConfig::new().with_max_depth(0).validate().is_err());
        assert!(RcaConfig::new()
            .with_generation_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            RcaConfig::from_toml_str("[retrieval\nalpha = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn search_config_mirrors_settings() {
        let config = RcaConfig::new()
            .with_alpha(0.3)
            .with_store_timeout(Duration::from_millis(250));
        let search = config.search_config();
        assert_eq!(search.alpha, 0.3);
        assert_eq!(search.store_timeout, Duration::from_millis(250));
        assert!(search.validate().is_ok());
    }
}
