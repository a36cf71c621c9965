// Type grouping index derived from the canonical series
use crate::domain::telemetry::Metric;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// `type -> metrics` in canonical order. Keys iterate sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TypeGroups {
    groups: BTreeMap<String, Vec<Metric>>,
}

/// Rebuilt from scratch on every change; linear in the series length.
pub fn group_by_type(series: &[Metric]) -> TypeGroups {
    let mut groups: BTreeMap<String, Vec<Metric>> = BTreeMap::new();
    for metric in series {
        groups
            .entry(metric.metric_type.clone())
            .or_default()
            .push(metric.clone());
    }
    TypeGroups { groups }
}

impl TypeGroups {
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn get(&self, metric_type: &str) -> &[Metric] {
        self.groups
            .get(metric_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Metric])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Distinct location names across all groups, sorted.
    pub fn locations(&self) -> Vec<String> {
        self.groups
            .values()
            .flatten()
            .filter(|m| !m.name.is_empty())
            .map(|m| m.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Copy of the index keeping only metrics at `location`. Types left
    /// without metrics are dropped.
    pub fn for_location(&self, location: &str) -> TypeGroups {
        let groups = self
            .groups
            .iter()
            .filter_map(|(metric_type, metrics)| {
                let kept: Vec<Metric> = metrics
                    .iter()
                    .filter(|m| m.name == location)
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (metric_type.clone(), kept))
            })
            .collect();
        TypeGroups { groups }
    }
}
