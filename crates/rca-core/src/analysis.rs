//! Text-generation seam for the reasoning and execution phases
//!
//! The pipeline never talks to a model directly. It hands an
//! [`AnalysisRequest`] to a [`TextGenerator`]; any error fails the phase.
//! [`TemplateGenerator`] is a deterministic offline stand-in that builds
//! hypotheses from the extracted entities and ranked evidence.

use crate::error::GenerationError;
use crate::progress::clamp_unit;
use rca_entity::{Entities, Metric};
use rca_retrieval::EvidenceItem;
use rca_topology::TopologyView;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Root-cause candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// What is believed to have gone wrong
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl Hypothesis {
    /// Create hypothesis; confidence is clamped
    #[must_use]
    pub fn new(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            description: description.into(),
            confidence: clamp_unit(confidence),
        }
    }
}

/// Remediation proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Short title, unique within a result
    pub title: String,
    /// Ordered actions
    pub steps: Vec<String>,
    /// 1 = most urgent
    pub priority: u8,
}

/// Everything the generator may look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Incident description
    pub query: String,
    /// Services and metrics found in the description
    pub entities: Entities,
    /// Ranked evidence
    pub evidence: Vec<EvidenceItem>,
    /// Topology around the affected services
    pub topology: TopologyView,
}

/// External text-generation service
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce root-cause hypotheses, most confident first
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError>;

    /// Produce remediation for the accepted hypotheses
    async fn recommend(
        &self,
        request: &AnalysisRequest,
        hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError>;
}

/// Sort by priority then title, keeping the first solution per title
#[must_use]
pub fn rank_solutions(solutions: Vec<Solution>) -> Vec<Solution> {
    let mut seen = HashSet::new();
    let mut kept: Vec<Solution> = solutions
        .into_iter()
        .filter(|s| !s.title.trim().is_empty())
        .filter(|s| seen.insert(s.title.trim().to_lowercase()))
        .collect();
    kept.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.title.cmp(&b.title)));
    kept
}

/// Sort hypotheses by confidence, highest first
#[must_use]
pub fn rank_hypotheses(mut hypotheses: Vec<Hypothesis>) -> Vec<Hypothesis> {
    hypotheses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    hypotheses
}

/// Deterministic generator built from templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    /// Create generator
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn suspects(request: &AnalysisRequest) -> Vec<String> {
        let mut seen = HashSet::new();
        request
            .entities
            .services
            .iter()
            .cloned()
            .chain(request.topology.impacted.iter().cloned())
            .chain(
                request
                    .evidence
                    .iter()
                    .filter_map(|e| e.service_name.clone()),
            )
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    fn support(request: &AnalysisRequest, service: &str) -> f64 {
        request
            .evidence
            .iter()
            .filter(|e| e.belongs_to(service))
            .map(|e| e.hybrid_score)
            .fold(0.0, f64::max)
    }
}

#[async_trait::async_trait]
impl TextGenerator for TemplateGenerator {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Hypothesis>, GenerationError> {
        let symptom = request
            .entities
            .metrics
            .first()
            .map_or("abnormal behaviour", |m| metric_symptom(*m));

        let direct: HashSet<&str> = request.entities.services.iter().map(String::as_str).collect();
        let hypotheses = Self::suspects(request)
            .into_iter()
            .map(|service| {
                let mut confidence = Self::support(request, &service);
                if !direct.contains(service.as_str()) {
                    confidence *= 0.5;
                }
                Hypothesis::new(format!("{symptom} in {service}"), confidence)
            })
            .collect();

        Ok(rank_hypotheses(hypotheses))
    }

    async fn recommend(
        &self,
        request: &AnalysisRequest,
        hypotheses: &[Hypothesis],
    ) -> Result<Vec<Solution>, GenerationError> {
        let metrics = &request.entities.metrics;
        let mut solutions = Vec::new();
        for (rank, hypothesis) in hypotheses.iter().take(3).enumerate() {
            let priority = u8::try_from(rank + 1).unwrap_or(u8::MAX);
            let mut steps = vec![format!("Confirm: {}", hypothesis.description)];
            steps.extend(metrics.iter().map(|m| metric_action(*m).to_string()));
            if steps.len() == 1 {
                steps.push("Review recent deployments and configuration changes".to_string());
            }
            solutions.push(Solution {
                title: format!("Mitigate {}", hypothesis.description),
                steps,
                priority,
            });
        }
        Ok(rank_solutions(solutions))
    }
}

fn metric_symptom(metric: Metric) -> &'static str {
    match metric {
        Metric::Cpu => "CPU saturation",
        Metric::Memory => "Memory exhaustion",
        Metric::Disk => "Disk pressure",
        Metric::Network => "Network degradation",
        Metric::Latency => "Elevated latency",
        Metric::ErrorRate => "Elevated error rate",
        Metric::Throughput => "Throughput anomaly",
        Metric::Connections => "Connection exhaustion",
        Metric::Gc => "GC pauses",
        Metric::ThreadPool => "Thread pool saturation",
    }
}

fn metric_action(metric: Metric) -> &'static str {
    match metric {
        Metric::Cpu => "Profile hot paths and scale out CPU-bound instances",
        Metric::Memory => "Capture a heap dump and check for leaks",
        Metric::Disk => "Free disk space and check log rotation",
        Metric::Network => "Check packet loss and bandwidth between dependencies",
        Metric::Latency => "Trace slow requests and review downstream timeouts",
        Metric::ErrorRate => "Inspect error logs for the dominant failure signature",
        Metric::Throughput => "Compare request volume with capacity limits",
        Metric::Connections => "Check connection pool limits and leaked connections",
        Metric::Gc => "Tune heap sizing and GC settings",
        Metric::ThreadPool => "Increase pool size or shed load",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rca_retrieval::SourceType;

    fn evidence(service: &str, score: f64) -> EvidenceItem {
        EvidenceItem {
            content: format!("{service} log"),
            source_type: SourceType::Logs,
            service_name: Some(service.to_string()),
            source_locator: None,
            timestamp: None,
            vector_score: score,
            lexical_score: score,
            hybrid_score: score,
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            query: "service-b CPU usage critical".into(),
            entities: rca_entity::extract("service-b CPU usage critical"),
            evidence: vec![evidence("service-b", 0.8), evidence("redis", 0.9)],
            topology: TopologyView::empty(),
        }
    }

    #[tokio::test]
    async fn mentioned_service_ranks_first() {
        let hypotheses = TemplateGenerator::new().analyze(&request()).await.unwrap();
        assert_eq!(hypotheses[0].description, "CPU saturation in service-b");
        assert!((hypotheses[0].confidence - 0.8).abs() < 1e-9);
        assert!((hypotheses[1].confidence - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recommendations_are_prioritised() {
        let generator = TemplateGenerator::new();
        let req = request();
        let hypotheses = generator.analyze(&req).await.unwrap();
        let solutions = generator.recommend(&req, &hypotheses).await.unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions[0].priority, 1);
        assert!(solutions[0].steps.iter().any(|s| s.contains("hot paths")));
    }

    #[test]
    fn duplicate_titles_are_removed() {
        let ranked = rank_solutions(vec![
            Solution {
                title: "Restart redis".into(),
                steps: vec![],
                priority: 2,
            },
            Solution {
                title: "restart redis ".into(),
                steps: vec![],
                priority: 1,
            },
            Solution {
                title: "Scale out".into(),
                steps: vec![],
                priority: 1,
            },
        ]);
        let titles: Vec<&str> = ranked.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Scale out", "Restart redis"]);
    }
}
