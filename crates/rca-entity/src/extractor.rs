//! Entity extraction over incident text
//!
//! Text is scanned for runs of ASCII identifier characters. Anything outside
//! `[A-Za-z0-9_-]` ends a run, including CJK characters, so a service name
//! glued to Chinese text (`service-b的CPU`) is still isolated without relying
//! on `\b` word boundaries.

use crate::vocabulary::{Metric, KNOWN_INFRA, SERVICE_SUFFIXES};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static IDENT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9_\-]*").expect("identifier pattern is valid"));

static SERVICE_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^service[-_][a-z0-9]+(?:[-_][a-z0-9]+)*$").expect("service pattern is valid")
});

static DEFAULT_EXTRACTOR: Lazy<EntityExtractor> = Lazy::new(EntityExtractor::new);

/// Entities found in a piece of text
///
/// Both lists are deduplicated and keep first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Lowercased service identifiers
    pub services: Vec<String>,
    /// Metric families
    pub metrics: Vec<Metric>,
}

impl Entities {
    /// True when nothing was found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.metrics.is_empty()
    }

    /// Metric names as strings
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.as_str().to_string()).collect()
    }
}

/// Pattern-based extractor for service and metric identifiers
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    known_services: HashSet<String>,
}

impl EntityExtractor {
    /// Create extractor with the built-in infrastructure names
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_services: KNOWN_INFRA.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Add deployment-specific service names that follow no naming convention
    #[must_use]
    pub fn with_known_services<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_services.extend(
            names
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        );
        self
    }

    /// Extract services and metrics from `text`
    ///
    /// Pure: the same text always produces the same entities.
    #[must_use]
    pub fn extract(&self, text: &str) -> Entities {
        let mut services = Vec::new();
        let mut seen_services = HashSet::new();
        let mut metric_hits: Vec<(usize, Metric)> = Vec::new();

        for run in IDENT_RUN.find_iter(text) {
            let token = run
                .as_str()
                .trim_end_matches(|c| c == '-' || c == '_')
                .to_ascii_lowercase();
            if token.is_empty() {
                continue;
            }

            if self.is_service(&token) {
                if seen_services.insert(token.clone()) {
                    services.push(token);
                }
                continue;
            }

            if let Some(metric) = ascii_metric(&token) {
                metric_hits.push((run.start(), metric));
            }
        }

        for metric in Metric::ALL {
            for alias in metric.cjk_aliases() {
                if let Some(pos) = text.find(alias) {
                    metric_hits.push((pos, metric));
                }
            }
        }

        metric_hits.sort_by_key(|(pos, _)| *pos);
        let mut seen_metrics = HashSet::new();
        let metrics = metric_hits
            .into_iter()
            .filter_map(|(_, m)| seen_metrics.insert(m).then_some(m))
            .collect();

        Entities { services, metrics }
    }

    fn is_service(&self, token: &str) -> bool {
        if self.known_services.contains(token) {
            return true;
        }
        if SERVICE_PREFIXED.is_match(token) {
            return true;
        }

        let mut parts = token.split(|c| c == '-' || c == '_');
        let head = parts.next().unwrap_or_default();
        if self.known_services.contains(head) && token.len() > head.len() {
            return true;
        }

        match token.rfind(|c| c == '-' || c == '_') {
            Some(idx) if idx > 0 => {
                let stem = &token[..idx];
                let suffix = &token[idx + 1..];
                SERVICE_SUFFIXES.contains(&suffix)
                    && stem.starts_with(|c: char| c.is_ascii_lowercase())
            }
            _ => false,
        }
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract with the default extractor
#[must_use]
pub fn extract(text: &str) -> Entities {
    DEFAULT_EXTRACTOR.extract(text)
}

fn ascii_metric(token: &str) -> Option<Metric> {
    let whole = lookup_alias(token);
    if whole.is_some() {
        return whole;
    }
    token
        .split(|c| c == '-' || c == '_')
        .find_map(lookup_alias)
}

fn lookup_alias(part: &str) -> Option<Metric> {
    Metric::ALL
        .into_iter()
        .find(|m| m.ascii_aliases().contains(&part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_prefixed_service_and_metrics() {
        let entities = extract("service-b CPU usage critical, response timeouts");
        assert_eq!(entities.services, vec!["service-b".to_string()]);
        assert_eq!(entities.metrics, vec![Metric::Cpu, Metric::Latency]);
    }

    #[test]
    fn service_glued_to_cjk_text_is_isolated() {
        let entities = extract("service-b的CPU使用率过高，内存也在上涨");
        assert_eq!(entities.services, vec!["service-b".to_string()]);
        assert_eq!(entities.metrics, vec![Metric::Cpu, Metric::Memory]);
    }

    #[test]
    fn cjk_only_metrics_are_found() {
        let entities = extract("订单服务响应延迟，磁盘空间不足");
        assert!(entities.services.is_empty());
        assert_eq!(entities.metrics, vec![Metric::Latency, Metric::Disk]);
    }

    #[test]
    fn suffix_conventions_and_infra_names() {
        let entities = extract("payment-api calls order-service; redis-01 and kafka lagging.");
        assert_eq!(
            entities.services,
            vec![
                "payment-api".to_string(),
                "order-service".to_string(),
                "redis-01".to_string(),
                "kafka".to_string(),
            ]
        );
    }

    #[test]
    fn names_are_lowercased_and_deduplicated() {
        let entities = extract("Service-A down. service-a restarted; SERVICE-A ok");
        assert_eq!(entities.services, vec!["service-a".to_string()]);
    }

    #[test]
    fn trailing_separator_is_trimmed() {
        let entities = extract("check service-c- logs");
        assert_eq!(entities.services, vec!["service-c".to_string()]);
    }

    #[test]
    fn plain_words_are_not_services() {
        let entities = extract("the service is slow and the api returns errors");
        assert!(entities.services.is_empty());
        assert_eq!(entities.metrics, vec![Metric::Latency, Metric::ErrorRate]);
    }

    #[test]
    fn compound_metric_tokens_match_on_parts() {
        let entities = extract("error_rate spiked, conn_pool exhausted");
        assert_eq!(entities.metrics, vec![Metric::ErrorRate, Metric::Connections]);
    }

    #[test]
    fn extra_known_services() {
        let extractor = EntityExtractor::new().with_known_services(["Billing", " "]);
        let entities = extractor.extract("billing is down");
        assert_eq!(entities.services, vec!["billing".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract("").is_empty());
        assert!(extract("，。！").is_empty());
    }
}
