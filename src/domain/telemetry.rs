// Telemetry data domain models
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type MetricId = i64;

/// Reserved id for records derived from aggregation. Never individually addressable.
pub const SENTINEL_ID: MetricId = 0;

/// Scalar payload value as delivered by the providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PayloadValue {
    /// Numeric reading of the value, if it has one. Booleans chart as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PayloadValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            PayloadValue::Number(n) => Some(*n),
            PayloadValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub type Payload = BTreeMap<String, PayloadValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: MetricId,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub name: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Metric {
    pub fn new(
        id: MetricId,
        metric_type: impl Into<String>,
        name: impl Into<String>,
        payload: Payload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            metric_type: metric_type.into(),
            name: name.into(),
            payload,
            created_at,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricParseError {
    #[error("metric has no id")]
    MissingId,
    #[error("metric {0} has no createdAt")]
    MissingCreatedAt(MetricId),
    #[error("metric {id} has unparsable createdAt {value:?}")]
    InvalidTimestamp { id: MetricId, value: String },
}

/// Push-delivered metric before validation. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetric {
    pub id: Option<MetricId>,
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub name: Option<String>,
    pub payload: Option<Payload>,
    pub created_at: Option<String>,
}

impl TryFrom<RawMetric> for Metric {
    type Error = MetricParseError;

    fn try_from(raw: RawMetric) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or(MetricParseError::MissingId)?;
        let value = raw
            .created_at
            .ok_or(MetricParseError::MissingCreatedAt(id))?;
        let created_at = parse_timestamp(&value)
            .ok_or(MetricParseError::InvalidTimestamp { id, value })?;

        Ok(Metric {
            id,
            metric_type: raw.metric_type.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            payload: raw.payload.unwrap_or_default(),
            created_at,
        })
    }
}

/// Server-computed daily aggregate for one (date, type, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAverage {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub name: String,
    #[serde(default)]
    pub average_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub count: u64,
}

/// One page of a paged historical read.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPage {
    pub items: Vec<Metric>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

impl MetricsPage {
    pub fn is_last(&self) -> bool {
        self.page >= self.total_pages
    }
}

/// Parse the timestamp shapes the providers emit: RFC 3339, a naive
/// date-time (taken as UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_timestamp(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}")))
}
