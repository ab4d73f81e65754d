use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::{Result, RuntimeError};

/// A scoring function for one metric.
pub trait MetricScorer: Send + Sync {
    fn score(&self, prompt_text: &str, dataset_text: &str) -> f64;
}

/// Returns the same score for every input.
///
/// The built-in metrics use this until real scoring is registered over them.
#[derive(Debug, Clone, Copy)]
pub struct FixedScore(pub f64);

impl MetricScorer for FixedScore {
    fn score(&self, _prompt_text: &str, _dataset_text: &str) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricInfo {
    pub key: String,
    pub name: String,
    pub description: String,
    pub unit: String,
}

impl MetricInfo {
    pub fn new(key: &str, name: &str, description: &str, unit: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
        }
    }
}

#[derive(Clone)]
struct RegisteredMetric {
    info: MetricInfo,
    scorer: Arc<dyn MetricScorer>,
}

#[derive(Clone, Default)]
pub struct MetricRegistry {
    metrics: HashMap<String, RegisteredMetric>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.metrics.keys().collect();
        keys.sort();
        f.debug_struct("MetricRegistry").field("metrics", &keys).finish()
    }
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `accuracy`, `response_time` and `completeness`, scored with placeholder constants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            MetricInfo::new("accuracy", "Accuracy", "How often the prompt yields the expected answer.", "ratio"),
            FixedScore(0.95),
        );
        registry.register(
            MetricInfo::new("response_time", "Response Time", "Relative responsiveness of the prompt.", "score"),
            FixedScore(0.85),
        );
        registry.register(
            MetricInfo::new("completeness", "Completeness", "How fully responses cover the expected content.", "ratio"),
            FixedScore(0.90),
        );
        registry
    }

    /// Registers or replaces the metric under `info.key`.
    pub fn register(&mut self, info: MetricInfo, scorer: impl MetricScorer + 'static) {
        let key = info.key.clone();
        if self.metrics.insert(key.clone(), RegisteredMetric { info, scorer: Arc::new(scorer) }).is_some() {
            tracing::debug!("[MetricRegistry::register] replaced metric '{}'", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    pub fn scorer(&self, key: &str) -> Result<Arc<dyn MetricScorer>> {
        self.metrics
            .get(key)
            .map(|m| m.scorer.clone())
            .ok_or_else(|| RuntimeError::UnknownMetric(key.to_string()))
    }

    pub fn run(&self, key: &str, prompt_text: &str, dataset_text: &str) -> Result<f64> {
        Ok(self.scorer(key)?.score(prompt_text, dataset_text))
    }

    /// Metadata of every metric, sorted by key.
    pub fn list(&self) -> Vec<MetricInfo> {
        let mut infos: Vec<MetricInfo> = self.metrics.values().map(|m| m.info.clone()).collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// The keys in `keys` that are not registered, in input order.
    pub fn unknown_keys<'a>(&self, keys: &'a [String]) -> Vec<&'a str> {
        keys.iter()
            .filter(|k| !self.contains(k))
            .map(String::as_str)
            .collect()
    }
}
