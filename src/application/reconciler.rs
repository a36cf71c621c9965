// Reconciliation state machine - single writer of the live buffer and canonical series
use crate::application::aggregate_adapter::aggregates_to_series;
use crate::application::errors::{DisplayError, FetchError};
use crate::application::grouping::{group_by_type, TypeGroups};
use crate::application::live_buffer::{BufferInsert, LiveBuffer, DEFAULT_CAPACITY};
use crate::application::merge::merge;
use crate::domain::dashboard::MetricsSummary;
use crate::domain::filter::{FilterState, TimeWindow, WindowTransition};
use crate::domain::telemetry::{DailyAverage, Metric, RawMetric};
use serde::Serialize;
use std::sync::Arc;

pub type Generation = u64;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub live_buffer_capacity: usize,
    pub historical_page_size: u32,
    pub historical_max_items: usize,
    pub latest_limit: usize,
    pub latest_push_limit: usize,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            live_buffer_capacity: DEFAULT_CAPACITY,
            historical_page_size: 20,
            historical_max_items: 100,
            latest_limit: 5,
            latest_push_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No time window: historical snapshot merged with the live buffer.
    Live,
    /// Time window active: daily aggregates only.
    Windowed,
}

/// A fetch the driver must run and report back with the same generation.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Historical {
        generation: Generation,
        filter: FilterState,
        page_size: u32,
        max_items: usize,
    },
    Aggregates {
        generation: Generation,
        window: TimeWindow,
        filter: FilterState,
    },
    Summary {
        generation: Generation,
        filter: FilterState,
    },
}

impl FetchRequest {
    pub fn generation(&self) -> Generation {
        match self {
            FetchRequest::Historical { generation, .. }
            | FetchRequest::Aggregates { generation, .. }
            | FetchRequest::Summary { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Historical(Result<Vec<Metric>, FetchError>),
    Aggregates(Result<Vec<DailyAverage>, FetchError>),
    Summary(Result<MetricsSummary, FetchError>),
}

/// Result of handling one event: fetches to issue and which outputs moved.
#[derive(Debug, Default)]
pub struct Step {
    pub requests: Vec<FetchRequest>,
    pub series_changed: bool,
    pub latest_changed: bool,
    pub summary_changed: bool,
    pub status_changed: bool,
}

#[derive(Debug, Default)]
struct Pending {
    historical: Option<Generation>,
    aggregates: Option<Generation>,
    summary: Option<Generation>,
}

pub struct Reconciler {
    settings: ReconcilerSettings,
    filter: FilterState,
    snapshot: Vec<Metric>,
    aggregates: Vec<Metric>,
    buffer: LiveBuffer,
    series: Arc<Vec<Metric>>,
    groups: Arc<TypeGroups>,
    latest: Arc<Vec<Metric>>,
    summary: Option<MetricsSummary>,
    error: Option<DisplayError>,
    last_generation: Generation,
    pending: Pending,
    torn_down: bool,
}

impl Reconciler {
    pub fn new(settings: ReconcilerSettings, filter: FilterState) -> Self {
        let buffer = LiveBuffer::with_capacity(settings.live_buffer_capacity);
        Self {
            settings,
            filter: filter.normalized(),
            snapshot: Vec::new(),
            aggregates: Vec::new(),
            buffer,
            series: Arc::default(),
            groups: Arc::default(),
            latest: Arc::default(),
            summary: None,
            error: None,
            last_generation: 0,
            pending: Pending::default(),
            torn_down: false,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.filter.has_time_window() {
            Mode::Windowed
        } else {
            Mode::Live
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn series(&self) -> Arc<Vec<Metric>> {
        self.series.clone()
    }

    pub fn groups(&self) -> Arc<TypeGroups> {
        self.groups.clone()
    }

    pub fn latest(&self) -> Arc<Vec<Metric>> {
        self.latest.clone()
    }

    pub fn summary(&self) -> Option<&MetricsSummary> {
        self.summary.as_ref()
    }

    pub fn error(&self) -> Option<&DisplayError> {
        self.error.as_ref()
    }

    pub fn buffer(&self) -> &LiveBuffer {
        &self.buffer
    }

    /// A fetch feeding the canonical series is still outstanding.
    pub fn is_loading(&self) -> bool {
        match self.mode() {
            Mode::Live => self.pending.historical.is_some(),
            Mode::Windowed => self.pending.aggregates.is_some(),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Initial load for the starting filter.
    pub fn start(&mut self) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            return step;
        }
        self.issue_reload(&mut step);
        step
    }

    pub fn set_filter(&mut self, filter: FilterState) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            return step;
        }

        let next = filter.normalized();
        let transition = WindowTransition::between(&self.filter, &next);
        self.filter = next;

        match transition {
            WindowTransition::Opened => {
                tracing::info!(buffered = self.buffer.len(), "time window opened, switching to windowed mode");
                self.buffer.clear();
            }
            WindowTransition::Closed => {
                tracing::info!("time window closed, switching to live mode");
                self.buffer.clear();
            }
            WindowTransition::Unchanged if self.mode() == Mode::Live => {
                let filter = &self.filter;
                self.buffer.retain(|m| filter.matches(m));
            }
            WindowTransition::Unchanged => {}
        }

        self.snapshot.clear();
        self.aggregates.clear();
        let filter = &self.filter;
        if self.latest.iter().any(|m| !filter.matches(m)) {
            self.latest = Arc::new(self.latest.iter().filter(|m| filter.matches(m)).cloned().collect());
            step.latest_changed = true;
        }
        self.rebuild(&mut step);
        self.issue_reload(&mut step);
        step
    }

    /// Manual refresh: clears the buffer and reloads the current mode.
    pub fn refresh(&mut self) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            return step;
        }
        tracing::info!(mode = ?self.mode(), "manual refresh");
        self.buffer.clear();
        self.snapshot.clear();
        self.aggregates.clear();
        self.rebuild(&mut step);
        self.issue_reload(&mut step);
        step
    }

    pub fn push_metric(&mut self, raw: RawMetric) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            return step;
        }

        let metric = match Metric::try_from(raw) {
            Ok(metric) => metric,
            Err(e) => {
                tracing::warn!("dropping malformed push metric: {}", e);
                return step;
            }
        };
        if metric.is_sentinel() {
            tracing::debug!("dropping push metric with sentinel id");
            return step;
        }
        if !self.filter.matches(&metric) {
            tracing::debug!(id = metric.id, "push metric outside type/name filter");
            return step;
        }

        self.record_latest(&metric);
        step.latest_changed = true;

        match self.mode() {
            Mode::Windowed => {
                tracing::debug!(id = metric.id, "windowed mode, push metric not charted");
            }
            Mode::Live => {
                let id = metric.id;
                if let BufferInsert::Appended { evicted } = self.buffer.insert(metric) {
                    if evicted > 0 {
                        tracing::debug!(id, evicted, "live buffer at capacity, evicted oldest");
                    }
                }
                self.rebuild(&mut step);
            }
        }
        step
    }

    /// Debounced invalidation signal: refresh the summary, and in windowed
    /// mode the aggregates. Never touches the live buffer.
    pub fn invalidation_settled(&mut self) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            return step;
        }
        if let Some(window) = self.filter.window() {
            let request = self.aggregates_request(window);
            step.requests.push(request);
            step.status_changed = true;
        }
        let request = self.summary_request();
        step.requests.push(request);
        step
    }

    pub fn complete(&mut self, generation: Generation, outcome: FetchOutcome) -> Step {
        let mut step = Step::default();
        if self.torn_down {
            tracing::debug!(generation, "completion after teardown ignored");
            return step;
        }

        match outcome {
            FetchOutcome::Historical(result) => {
                if !take_if_current(&mut self.pending.historical, generation) {
                    tracing::debug!(generation, "discarding stale historical fetch");
                    return step;
                }
                step.status_changed = true;
                match result {
                    Ok(items) => self.apply_historical(items, &mut step),
                    // Windowed series come from aggregates only; the read just seeds latest values.
                    Err(e) if self.mode() == Mode::Windowed => {
                        tracing::warn!(code = %e.code(), "historical fetch for latest values failed: {}", e);
                    }
                    Err(e) => self.fail(&e, "historical", &mut step),
                }
            }
            FetchOutcome::Aggregates(result) => {
                if !take_if_current(&mut self.pending.aggregates, generation) {
                    tracing::debug!(generation, "discarding stale aggregate fetch");
                    return step;
                }
                step.status_changed = true;
                match result {
                    Ok(rows) => {
                        if self.mode() == Mode::Windowed {
                            self.aggregates = aggregates_to_series(&rows);
                            self.error = None;
                            self.rebuild(&mut step);
                        }
                    }
                    Err(e) => self.fail(&e, "aggregate", &mut step),
                }
            }
            FetchOutcome::Summary(result) => {
                if !take_if_current(&mut self.pending.summary, generation) {
                    tracing::debug!(generation, "discarding stale summary fetch");
                    return step;
                }
                match result {
                    Ok(summary) => {
                        self.summary = Some(summary);
                        step.summary_changed = true;
                    }
                    Err(e) => tracing::warn!("summary fetch failed, keeping previous: {}", e),
                }
            }
        }
        step
    }

    /// No further events are processed; outstanding generations are forgotten.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.pending = Pending::default();
    }

    fn apply_historical(&mut self, mut items: Vec<Metric>, step: &mut Step) {
        items.truncate(self.settings.historical_max_items);

        let mut newest_first = items.clone();
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        newest_first.truncate(self.settings.latest_limit);
        self.latest = Arc::new(newest_first);
        step.latest_changed = true;
        self.error = None;

        // In windowed mode the historical read only seeds the latest values.
        if self.mode() == Mode::Live {
            self.snapshot = items;
            self.rebuild(step);
        }
    }

    fn fail(&mut self, err: &FetchError, source: &str, step: &mut Step) {
        tracing::warn!(code = %err.code(), "{} fetch failed, keeping displayed series: {}", source, err);
        self.error = Some(DisplayError::from(err));
        step.status_changed = true;
    }

    fn record_latest(&mut self, metric: &Metric) {
        let mut latest = Vec::with_capacity(self.settings.latest_push_limit);
        latest.push(metric.clone());
        latest.extend(self.latest.iter().filter(|m| m.id != metric.id).cloned());
        latest.truncate(self.settings.latest_push_limit);
        self.latest = Arc::new(latest);
    }

    fn rebuild(&mut self, step: &mut Step) {
        let series = match self.mode() {
            Mode::Live => merge(&self.snapshot, &self.buffer.to_vec()),
            Mode::Windowed => self.aggregates.clone(),
        };
        self.groups = Arc::new(group_by_type(&series));
        self.series = Arc::new(series);
        step.series_changed = true;
    }

    /// Historical read every time (it also seeds latest values), aggregates
    /// when windowed, and the summary.
    fn issue_reload(&mut self, step: &mut Step) {
        self.error = None;
        step.status_changed = true;

        let generation = self.next_generation();
        self.pending.historical = Some(generation);
        step.requests.push(FetchRequest::Historical {
            generation,
            filter: self.filter.without_window(),
            page_size: self.settings.historical_page_size,
            max_items: self.settings.historical_max_items,
        });

        match self.filter.window() {
            Some(window) => {
                let request = self.aggregates_request(window);
                step.requests.push(request);
            }
            None => self.pending.aggregates = None,
        }

        let request = self.summary_request();
        step.requests.push(request);
    }

    fn aggregates_request(&mut self, window: TimeWindow) -> FetchRequest {
        let generation = self.next_generation();
        self.pending.aggregates = Some(generation);
        FetchRequest::Aggregates {
            generation,
            window: window.day_bounds(),
            filter: self.filter.without_window(),
        }
    }

    fn summary_request(&mut self) -> FetchRequest {
        let generation = self.next_generation();
        self.pending.summary = Some(generation);
        FetchRequest::Summary {
            generation,
            filter: self.filter.without_window(),
        }
    }

    fn next_generation(&mut self) -> Generation {
        self.last_generation += 1;
        self.last_generation
    }
}

fn take_if_current(slot: &mut Option<Generation>, generation: Generation) -> bool {
    if *slot == Some(generation) {
        *slot = None;
        true
    } else {
        false
    }
}
