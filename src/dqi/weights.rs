use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::BlockerCategory;
use crate::model::WeightManifestEntry;

/// One row of the weight registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub metric_name: String,
    pub weight: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

impl WeightEntry {
    pub fn default_for(category: BlockerCategory) -> Self {
        Self {
            metric_name: category.metric_name().to_string(),
            weight: category.default_weight(),
            is_active: true,
            description: Some(category.description().to_string()),
        }
    }
}

/// Active registry entries keyed by category. Inactive entries and names that match no
/// category exactly are dropped.
pub fn active_weights(entries: &[WeightEntry]) -> BTreeMap<BlockerCategory, f64> {
    entries
        .iter()
        .filter(|entry| entry.is_active)
        .filter_map(|entry| {
            BlockerCategory::from_metric_name(&entry.metric_name)
                .map(|category| (category, entry.weight))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    Registry,
    Default,
}

impl WeightSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Default => "default",
        }
    }
}

/// Effective weight per blocker category for one scoring pass.
///
/// Resolved once and passed by reference into the scorer. The sum of weights is not
/// forced to 1.0; when it drifts, composites drift off the nominal 0-100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSet {
    weights: BTreeMap<BlockerCategory, (f64, WeightSource)>,
}

impl WeightSet {
    pub fn default_weights() -> Self {
        Self::from_active(&BTreeMap::new())
    }

    /// Missing metrics fall back to their documented default weight.
    pub fn from_active(active: &BTreeMap<BlockerCategory, f64>) -> Self {
        let weights = BlockerCategory::ALL
            .into_iter()
            .map(|category| {
                let resolved = match active.get(&category) {
                    Some(weight) => (*weight, WeightSource::Registry),
                    None => (category.default_weight(), WeightSource::Default),
                };
                (category, resolved)
            })
            .collect();
        Self { weights }
    }

    pub fn from_entries(entries: &[WeightEntry]) -> Self {
        Self::from_active(&active_weights(entries))
    }

    pub fn weight(&self, category: BlockerCategory) -> f64 {
        self.weights
            .get(&category)
            .map(|(weight, _)| *weight)
            .unwrap_or_else(|| category.default_weight())
    }

    pub fn source(&self, category: BlockerCategory) -> WeightSource {
        self.weights
            .get(&category)
            .map(|(_, source)| *source)
            .unwrap_or(WeightSource::Default)
    }

    /// Unnormalized sum of the effective weights.
    pub fn sum(&self) -> f64 {
        BlockerCategory::ALL
            .into_iter()
            .map(|category| self.weight(category))
            .sum()
    }

    pub fn drifts_from_unit_sum(&self) -> bool {
        (self.sum() - 1.0).abs() > 1e-6
    }

    pub fn manifest_entries(&self) -> Vec<WeightManifestEntry> {
        BlockerCategory::ALL
            .into_iter()
            .map(|category| WeightManifestEntry {
                metric_name: category.metric_name().to_string(),
                weight: self.weight(category),
                source: self.source(category).as_str().to_string(),
            })
            .collect()
    }
}
