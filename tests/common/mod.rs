#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use telemetry_reconciler::application::controller::ControllerHandle;
use telemetry_reconciler::application::errors::{FetchError, PushError};
use telemetry_reconciler::application::metrics_repository::{
    MetricsRepository, PushChannel, PushEvent,
};
use telemetry_reconciler::domain::dashboard::{MetricsSummary, TypeCount};
use telemetry_reconciler::domain::filter::{FilterState, TimeWindow};
use telemetry_reconciler::domain::telemetry::{
    DailyAverage, Metric, MetricsPage, Payload, RawMetric,
};
use tokio::sync::mpsc;

pub fn at(day: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 12, minute, 0).unwrap()
}

pub fn metric(id: i64, metric_type: &str, created_at: DateTime<Utc>) -> Metric {
    Metric::new(id, metric_type, "A", Payload::new(), created_at)
}

pub fn raw(id: i64, metric_type: &str, created_at: DateTime<Utc>) -> RawMetric {
    RawMetric {
        id: Some(id),
        metric_type: Some(metric_type.to_string()),
        name: Some("A".to_string()),
        payload: None,
        created_at: Some(created_at.to_rfc3339()),
    }
}

pub fn daily(day: u32, metric_type: &str, value: f64) -> DailyAverage {
    DailyAverage {
        date: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
        metric_type: metric_type.to_string(),
        name: "A".to_string(),
        average_values: BTreeMap::from([("value".to_string(), value)]),
        count: 24,
    }
}

pub fn ids(series: &[Metric]) -> Vec<i64> {
    series.iter().map(|m| m.id).collect()
}

/// In-memory provider. Historical results are keyed by the filter's type.
#[derive(Default)]
pub struct FakeRepository {
    historical: Mutex<HashMap<Option<String>, (Duration, Vec<Metric>)>>,
    daily: Mutex<Vec<DailyAverage>>,
    fail_historical: AtomicBool,
    pub page_calls: AtomicUsize,
    pub daily_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
}

impl FakeRepository {
    pub fn with_historical(self, metric_type: Option<&str>, delay: Duration, items: Vec<Metric>) -> Self {
        self.historical
            .lock()
            .unwrap()
            .insert(metric_type.map(str::to_string), (delay, items));
        self
    }

    pub fn with_daily(self, rows: Vec<DailyAverage>) -> Self {
        *self.daily.lock().unwrap() = rows;
        self
    }

    pub fn fail_historical(&self, fail: bool) {
        self.fail_historical.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsRepository for FakeRepository {
    async fn fetch_metrics_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<MetricsPage, FetchError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_historical.load(Ordering::SeqCst) {
            return Err(FetchError::Server {
                status: 500,
                message: "boom".to_string(),
            });
        }

        let (delay, items) = self
            .historical
            .lock()
            .unwrap()
            .get(&filter.metric_type)
            .cloned()
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page_size = page_size as usize;
        let total_pages = items.len().div_ceil(page_size) as u32;
        let start = (page as usize - 1) * page_size;
        Ok(MetricsPage {
            items: items.iter().skip(start).take(page_size).cloned().collect(),
            page,
            total_pages,
            total_count: items.len() as u64,
        })
    }

    async fn fetch_daily_averages(
        &self,
        window: TimeWindow,
        _filter: &FilterState,
    ) -> Result<Vec<DailyAverage>, FetchError> {
        self.daily_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.daily.lock().unwrap().clone();
        Ok(rows.into_iter().filter(|r| window.contains(r.date)).collect())
    }

    async fn fetch_summary(&self, _filter: &FilterState) -> Result<MetricsSummary, FetchError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MetricsSummary {
            total_count: 1,
            type_aggregations: vec![TypeCount {
                metric_type: "motion".to_string(),
                count: 1,
            }],
        })
    }
}

/// Push channel the test drives by hand.
#[derive(Default)]
pub struct FakePush {
    sink: Mutex<Option<mpsc::Sender<PushEvent>>>,
    refuse: bool,
    pub stops: AtomicUsize,
}

impl FakePush {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub async fn emit(&self, event: PushEvent) {
        let sink = self.sink.lock().unwrap().clone();
        sink.expect("push channel started").send(event).await.unwrap();
    }
}

#[async_trait]
impl PushChannel for FakePush {
    async fn start(&self, sink: mpsc::Sender<PushEvent>) -> Result<(), PushError> {
        if self.refuse {
            return Err(PushError::Connect("connection refused".to_string()));
        }
        *self.sink.lock().unwrap() = Some(sink.clone());
        let _ = sink.send(PushEvent::Connectivity(true)).await;
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
    }
}

pub async fn wait_for_series(handle: &ControllerHandle, pred: impl Fn(&[Metric]) -> bool) {
    let mut rx = handle.subscribe_series();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for series")
        .expect("controller stopped");
}

pub async fn wait_connected(handle: &ControllerHandle) {
    let mut rx = handle.subscribe_connectivity();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|up| *up))
        .await
        .expect("timed out waiting for push channel")
        .expect("controller stopped");
}
