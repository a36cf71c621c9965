// Converts daily aggregates into the metric shape used by the rest of the pipeline
use crate::application::merge::sort_by_time;
use crate::domain::telemetry::{DailyAverage, Metric, Payload, PayloadValue, SENTINEL_ID};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// One synthetic metric per (date, type, name). Rows sharing that key have
/// their `average_values` unioned, later rows overwriting on key collision.
/// Output is ascending by date.
pub fn aggregates_to_series(rows: &[DailyAverage]) -> Vec<Metric> {
    let mut grouped: IndexMap<(DateTime<Utc>, &str, &str), Payload> = IndexMap::new();

    for row in rows {
        let payload = grouped
            .entry((row.date, row.metric_type.as_str(), row.name.as_str()))
            .or_default();
        for (key, value) in &row.average_values {
            payload.insert(key.clone(), PayloadValue::Number(*value));
        }
    }

    let mut series: Vec<Metric> = grouped
        .into_iter()
        .map(|((date, metric_type, name), payload)| {
            Metric::new(SENTINEL_ID, metric_type, name, payload, date)
        })
        .collect();
    sort_by_time(&mut series);
    series
}
