// REST repository implementation
use crate::application::errors::{looks_like_html, FetchError, HTML_RESPONSE_MESSAGE};
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::dashboard::MetricsSummary;
use crate::domain::filter::{FilterState, TimeWindow};
use crate::domain::telemetry::{DailyAverage, Metric, MetricsPage};
use anyhow::Context;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RestMetricsRepository {
    client: reqwest::Client,
    base_url: String,
}

/// Paged envelope. Some backends serialize `Items` with a capital I.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse {
    #[serde(default, alias = "Items")]
    items: Option<Value>,
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    total_pages: u32,
}

impl RestMetricsRepository {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), &body));
        }
        parse_body(&body)
    }
}

fn filter_params(filter: &FilterState) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(metric_type) = &filter.metric_type {
        params.push(("type", metric_type.clone()));
    }
    if let Some(name) = &filter.name {
        params.push(("name", name.clone()));
    }
    params
}

fn parse_body(body: &str) -> Result<Value, FetchError> {
    if looks_like_html(body) {
        return Err(FetchError::MalformedResponse(HTML_RESPONSE_MESSAGE.to_string()));
    }
    if body.trim().is_empty() {
        return Err(FetchError::MalformedResponse("Empty response from server".to_string()));
    }
    serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {e}")))
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, FetchError> {
    serde_json::from_value(value)
        .map_err(|e| FetchError::MalformedResponse(format!("unexpected {what} shape: {e}")))
}

fn parse_page(value: Value, requested_page: u32) -> Result<MetricsPage, FetchError> {
    if !value.is_object() {
        return Err(FetchError::MalformedResponse(
            "paged response is not an object".to_string(),
        ));
    }
    let envelope: PagedResponse = decode(value, "paged response")?;

    let items: Vec<Metric> = match envelope.items {
        None | Some(Value::Null) => Vec::new(),
        Some(items @ Value::Array(_)) => decode(items, "metric")?,
        Some(_) => {
            return Err(FetchError::MalformedResponse(
                "items is not a sequence".to_string(),
            ));
        }
    };

    Ok(MetricsPage {
        items,
        page: envelope.page.unwrap_or(requested_page),
        total_pages: envelope.total_pages,
        total_count: envelope.total_count,
    })
}

fn parse_daily_averages(value: Value) -> Result<Vec<DailyAverage>, FetchError> {
    if !value.is_array() {
        return Err(FetchError::MalformedResponse(
            "daily averages response is not a sequence".to_string(),
        ));
    }
    decode(value, "daily average")
}

#[async_trait]
impl MetricsRepository for RestMetricsRepository {
    async fn fetch_metrics_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<MetricsPage, FetchError> {
        let mut query = vec![("page", page.to_string()), ("pageSize", page_size.to_string())];
        query.extend(filter_params(filter));

        let value = self.get_json("/api/metrics", &query).await?;
        let result = parse_page(value, page)?;
        tracing::debug!(
            "Fetched page {} of {}, got {} items, total: {}",
            result.page,
            result.total_pages,
            result.items.len(),
            result.total_count
        );
        Ok(result)
    }

    async fn fetch_daily_averages(
        &self,
        window: TimeWindow,
        filter: &FilterState,
    ) -> Result<Vec<DailyAverage>, FetchError> {
        let mut query = vec![
            ("fromDate", window.from.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ("toDate", window.to.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ];
        query.extend(filter_params(filter));

        let value = self.get_json("/api/metrics/daily-averages", &query).await?;
        parse_daily_averages(value)
    }

    async fn fetch_summary(&self, filter: &FilterState) -> Result<MetricsSummary, FetchError> {
        let value = self
            .get_json("/api/metrics/summary", &filter_params(filter))
            .await?;
        decode(value, "summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_page_accepts_either_items_casing() {
        let lower = json!({
            "items": [{"id": 1, "type": "motion", "name": "Hall", "payload": {"motionDetected": true}, "createdAt": "2024-01-01T00:00:00Z"}],
            "totalCount": 41, "page": 1, "pageSize": 20, "totalPages": 3
        });
        let page = parse_page(lower, 1).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_pages, 3);
        assert!(!page.is_last());

        let upper = json!({"Items": [], "totalCount": 0, "totalPages": 0});
        let page = parse_page(upper, 2).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.page, 2);
        assert!(page.is_last());
    }

    #[test]
    fn test_parse_page_rejects_non_sequence_items() {
        let err = parse_page(json!({"items": {"id": 1}}), 1).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));

        let err = parse_page(json!([1, 2, 3]), 1).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_body_detects_html() {
        assert_eq!(
            parse_body("<!DOCTYPE html><html></html>"),
            Err(FetchError::MalformedResponse(HTML_RESPONSE_MESSAGE.to_string()))
        );
        assert!(matches!(parse_body(""), Err(FetchError::MalformedResponse(_))));
        assert!(parse_body("[]").is_ok());
    }

    #[test]
    fn test_parse_daily_averages() {
        let rows = parse_daily_averages(json!([
            {"date": "2024-02-01", "type": "energy", "name": "Garage", "averageValues": {"energy": 12.5}, "count": 48}
        ]))
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].average_values["energy"], 12.5);

        assert!(matches!(
            parse_daily_averages(json!({"items": []})),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_filter_params() {
        let filter = FilterState {
            metric_type: Some("energy".into()),
            name: Some("Gar".into()),
            ..FilterState::default()
        };
        assert_eq!(
            filter_params(&filter),
            vec![("type", "energy".to_string()), ("name", "Gar".to_string())]
        );
        assert!(filter_params(&FilterState::default()).is_empty());
    }
}
