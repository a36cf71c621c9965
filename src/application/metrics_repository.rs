// Repository and push-channel traits for metrics data access
use crate::application::errors::{FetchError, PushError};
use crate::domain::dashboard::MetricsSummary;
use crate::domain::filter::{FilterState, TimeWindow};
use crate::domain::telemetry::{DailyAverage, MetricsPage, RawMetric};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// One page (1-based) of historical metrics matching the type/name predicate.
    async fn fetch_metrics_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<MetricsPage, FetchError>;

    /// Daily aggregates for the window, restricted by the type/name predicate.
    async fn fetch_daily_averages(
        &self,
        window: TimeWindow,
        filter: &FilterState,
    ) -> Result<Vec<DailyAverage>, FetchError>;

    /// Total and per-type counts for the type/name predicate.
    async fn fetch_summary(&self, filter: &FilterState) -> Result<MetricsSummary, FetchError>;
}

/// What the push channel delivers.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Metric(RawMetric),
    /// Coarse "something changed" notification with no payload.
    Invalidate,
    /// The channel went up or down.
    Connectivity(bool),
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Connect and forward events into `sink`. Calling it while connected is a no-op.
    async fn start(&self, sink: mpsc::Sender<PushEvent>) -> Result<(), PushError>;

    /// Disconnect. Calling it while disconnected is a no-op.
    async fn stop(&self);
}
