// Dashboard domain model - summary counts and per-type presentation hints
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub count: u64,
}

/// Total and per-type counts for the current type/name predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_count: u64,
    #[serde(default)]
    pub type_aggregations: Vec<TypeCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visualization {
    Line,
    Bar,
    Gauge,
    Binary,
    MultiSeries,
    Heatmap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricTypeConfig {
    pub visualization: Visualization,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub payload_keys: Vec<String>,
    #[serde(default)]
    pub y_min: Option<f64>,
    #[serde(default)]
    pub y_max: Option<f64>,
}

impl MetricTypeConfig {
    fn new(visualization: Visualization, unit: &str, payload_keys: &[&str]) -> Self {
        Self {
            visualization,
            unit: Some(unit.to_string()),
            payload_keys: payload_keys.iter().map(|k| k.to_string()).collect(),
            y_min: None,
            y_max: None,
        }
    }

    pub fn fallback() -> Self {
        Self {
            visualization: Visualization::Line,
            unit: None,
            payload_keys: Vec::new(),
            y_min: None,
            y_max: None,
        }
    }
}

pub fn builtin_metric_types() -> BTreeMap<String, MetricTypeConfig> {
    BTreeMap::from([
        (
            "motion".to_string(),
            MetricTypeConfig::new(Visualization::Binary, "", &["motionDetected"]),
        ),
        (
            "energy".to_string(),
            MetricTypeConfig::new(Visualization::Line, "W", &["energy"]),
        ),
        (
            "air_quality".to_string(),
            MetricTypeConfig::new(Visualization::MultiSeries, "", &["co2", "pm25", "humidity"]),
        ),
    ])
}

/// Case-insensitive lookup, falling back to a plain line chart.
pub fn metric_type_config(
    configs: &BTreeMap<String, MetricTypeConfig>,
    metric_type: &str,
) -> MetricTypeConfig {
    configs
        .get(&metric_type.to_lowercase())
        .cloned()
        .unwrap_or_else(MetricTypeConfig::fallback)
}
