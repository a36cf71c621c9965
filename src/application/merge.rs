// Deduplicating merge of metric sequences
use crate::domain::telemetry::{Metric, MetricId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Identity used for deduplication. Sentinel records have no individual id,
/// so they are keyed by what they describe instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    Id(MetricId),
    Derived {
        metric_type: String,
        name: String,
        created_at: DateTime<Utc>,
    },
}

impl MergeKey {
    fn of(metric: &Metric) -> Self {
        if metric.is_sentinel() {
            MergeKey::Derived {
                metric_type: metric.metric_type.clone(),
                name: metric.name.clone(),
                created_at: metric.created_at,
            }
        } else {
            MergeKey::Id(metric.id)
        }
    }
}

/// Merge two sequences: entries of `newer` replace entries of `older` with
/// the same identity. The result is sorted ascending by `created_at`; ties
/// keep first-seen order, and a replaced entry keeps its original slot.
pub fn merge(older: &[Metric], newer: &[Metric]) -> Vec<Metric> {
    merge_all([older, newer])
}

/// Merge any number of sequences, later sequences winning.
pub fn merge_all<'a, I>(sources: I) -> Vec<Metric>
where
    I: IntoIterator<Item = &'a [Metric]>,
{
    let mut by_key: IndexMap<MergeKey, Metric> = IndexMap::new();
    for source in sources {
        for metric in source {
            by_key.insert(MergeKey::of(metric), metric.clone());
        }
    }

    let mut merged: Vec<Metric> = by_key.into_values().collect();
    sort_by_time(&mut merged);
    merged
}

/// Stable ascending sort on `created_at`.
pub fn sort_by_time(metrics: &mut [Metric]) {
    metrics.sort_by_key(|m| m.created_at);
}
