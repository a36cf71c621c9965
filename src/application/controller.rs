// Reconciliation controller - event loop driving the reconciler
use crate::application::errors::{DisplayError, FetchError};
use crate::application::grouping::TypeGroups;
use crate::application::metrics_repository::{MetricsRepository, PushChannel, PushEvent};
use crate::application::reconciler::{
    FetchOutcome, FetchRequest, Generation, Mode, Reconciler, ReconcilerSettings, Step,
};
use crate::domain::dashboard::MetricsSummary;
use crate::domain::filter::FilterState;
use crate::domain::telemetry::Metric;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const EVENT_QUEUE_SIZE: usize = 256;
const PUSH_QUEUE_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub reconciler: ReconcilerSettings,
    pub invalidate_debounce: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            reconciler: ReconcilerSettings::default(),
            invalidate_debounce: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub mode: Mode,
    pub filter: FilterState,
    pub loading: bool,
    pub error: Option<DisplayError>,
}

/// Everything the loop reacts to, serialized onto one queue.
#[derive(Debug)]
enum Event {
    SetFilter(FilterState),
    Refresh,
    Push(PushEvent),
    Completed {
        generation: Generation,
        outcome: FetchOutcome,
    },
    Shutdown,
}

struct Outputs {
    series: watch::Sender<Arc<Vec<Metric>>>,
    groups: watch::Sender<Arc<TypeGroups>>,
    latest: watch::Sender<Arc<Vec<Metric>>>,
    summary: watch::Sender<Option<MetricsSummary>>,
    status: watch::Sender<ControllerStatus>,
    connected: watch::Sender<bool>,
}

impl Outputs {
    fn publish(&self, reconciler: &Reconciler, step: &Step) {
        if step.series_changed {
            self.series.send_replace(reconciler.series());
            self.groups.send_replace(reconciler.groups());
        }
        if step.latest_changed {
            self.latest.send_replace(reconciler.latest());
        }
        if step.summary_changed {
            self.summary.send_replace(reconciler.summary().cloned());
        }
        if step.status_changed || step.series_changed {
            self.status.send_replace(status_of(reconciler));
        }
    }
}

fn status_of(reconciler: &Reconciler) -> ControllerStatus {
    ControllerStatus {
        mode: reconciler.mode(),
        filter: reconciler.filter().clone(),
        loading: reconciler.is_loading(),
        error: reconciler.error().cloned(),
    }
}

/// Presentation-facing side of a running controller. Commands are
/// fire-and-forget; effects show up on the watch outputs.
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<Event>,
    series: watch::Receiver<Arc<Vec<Metric>>>,
    groups: watch::Receiver<Arc<TypeGroups>>,
    latest: watch::Receiver<Arc<Vec<Metric>>>,
    summary: watch::Receiver<Option<MetricsSummary>>,
    status: watch::Receiver<ControllerStatus>,
    connected: watch::Receiver<bool>,
}

impl ControllerHandle {
    pub async fn set_filter(&self, filter: FilterState) {
        self.send(Event::SetFilter(filter)).await;
    }

    pub async fn refresh(&self) {
        self.send(Event::Refresh).await;
    }

    /// Unsubscribe from the push channel and stop processing events.
    pub async fn shutdown(&self) {
        self.send(Event::Shutdown).await;
    }

    async fn send(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("controller already stopped, command dropped");
        }
    }

    pub fn series(&self) -> Arc<Vec<Metric>> {
        self.series.borrow().clone()
    }

    pub fn groups(&self) -> Arc<TypeGroups> {
        self.groups.borrow().clone()
    }

    pub fn latest(&self) -> Arc<Vec<Metric>> {
        self.latest.borrow().clone()
    }

    pub fn summary(&self) -> Option<MetricsSummary> {
        self.summary.borrow().clone()
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn subscribe_series(&self) -> watch::Receiver<Arc<Vec<Metric>>> {
        self.series.clone()
    }

    pub fn subscribe_groups(&self) -> watch::Receiver<Arc<TypeGroups>> {
        self.groups.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }
}

pub struct ReconciliationController {
    repository: Arc<dyn MetricsRepository>,
    push: Arc<dyn PushChannel>,
    settings: ControllerSettings,
}

impl ReconciliationController {
    pub fn new(
        repository: Arc<dyn MetricsRepository>,
        push: Arc<dyn PushChannel>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            repository,
            push,
            settings,
        }
    }

    /// Start the event loop. Must be called inside a tokio runtime.
    pub fn spawn(self, initial_filter: FilterState) -> (ControllerHandle, JoinHandle<()>) {
        let reconciler = Reconciler::new(self.settings.reconciler.clone(), initial_filter);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        let (series, series_rx) = watch::channel(reconciler.series());
        let (groups, groups_rx) = watch::channel(reconciler.groups());
        let (latest, latest_rx) = watch::channel(reconciler.latest());
        let (summary, summary_rx) = watch::channel(None);
        let (status, status_rx) = watch::channel(status_of(&reconciler));
        let (connected, connected_rx) = watch::channel(false);

        let outputs = Outputs {
            series,
            groups,
            latest,
            summary,
            status,
            connected,
        };
        let handle = ControllerHandle {
            events: events_tx.clone(),
            series: series_rx,
            groups: groups_rx,
            latest: latest_rx,
            summary: summary_rx,
            status: status_rx,
            connected: connected_rx,
        };

        self.connect_push(events_tx.clone());
        let task = tokio::spawn(self.run(reconciler, events_rx, events_tx, outputs));
        (handle, task)
    }

    /// Forward push events onto the controller queue and connect in the
    /// background. A failed connect only shows up as connectivity.
    fn connect_push(&self, events: mpsc::Sender<Event>) {
        let (push_tx, mut push_rx) = mpsc::channel(PUSH_QUEUE_SIZE);

        let forward = events.clone();
        tokio::spawn(async move {
            while let Some(event) = push_rx.recv().await {
                if forward.send(Event::Push(event)).await.is_err() {
                    break;
                }
            }
        });

        let push = self.push.clone();
        tokio::spawn(async move {
            if let Err(e) = push.start(push_tx).await {
                tracing::warn!("push channel failed to start: {}", e);
                let _ = events
                    .send(Event::Push(PushEvent::Connectivity(false)))
                    .await;
            }
        });
    }

    async fn run(
        self,
        mut reconciler: Reconciler,
        mut events: mpsc::Receiver<Event>,
        events_tx: mpsc::Sender<Event>,
        outputs: Outputs,
    ) {
        let step = reconciler.start();
        self.apply(&reconciler, step, &outputs, &events_tx);

        let mut invalidate_at: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                received = events.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
                _ = tokio::time::sleep_until(invalidate_at.unwrap_or_else(Instant::now)), if invalidate_at.is_some() => {
                    invalidate_at = None;
                    tracing::debug!("invalidation settled, refreshing aggregates");
                    let step = reconciler.invalidation_settled();
                    self.apply(&reconciler, step, &outputs, &events_tx);
                    continue;
                }
            };

            let step = match event {
                Event::SetFilter(filter) => reconciler.set_filter(filter),
                Event::Refresh => reconciler.refresh(),
                Event::Push(PushEvent::Metric(raw)) => reconciler.push_metric(raw),
                Event::Push(PushEvent::Invalidate) => {
                    invalidate_at = Some(Instant::now() + self.settings.invalidate_debounce);
                    continue;
                }
                Event::Push(PushEvent::Connectivity(up)) => {
                    tracing::info!(connected = up, "push channel connectivity changed");
                    outputs.connected.send_replace(up);
                    continue;
                }
                Event::Completed { generation, outcome } => reconciler.complete(generation, outcome),
                Event::Shutdown => {
                    reconciler.teardown();
                    self.push.stop().await;
                    outputs.connected.send_replace(false);
                    tracing::info!("reconciliation controller stopped");
                    break;
                }
            };
            self.apply(&reconciler, step, &outputs, &events_tx);
        }
    }

    fn apply(
        &self,
        reconciler: &Reconciler,
        step: Step,
        outputs: &Outputs,
        events: &mpsc::Sender<Event>,
    ) {
        outputs.publish(reconciler, &step);
        for request in step.requests {
            self.dispatch(request, events.clone());
        }
    }

    fn dispatch(&self, request: FetchRequest, events: mpsc::Sender<Event>) {
        let repository = self.repository.clone();
        tokio::spawn(async move {
            let generation = request.generation();
            let outcome = run_fetch(repository.as_ref(), request).await;
            // The loop may have stopped; nothing left to update then.
            let _ = events.send(Event::Completed { generation, outcome }).await;
        });
    }
}

async fn run_fetch(repository: &dyn MetricsRepository, request: FetchRequest) -> FetchOutcome {
    match request {
        FetchRequest::Historical {
            filter,
            page_size,
            max_items,
            ..
        } => FetchOutcome::Historical(
            collect_historical(repository, &filter, page_size, max_items).await,
        ),
        FetchRequest::Aggregates { window, filter, .. } => {
            FetchOutcome::Aggregates(repository.fetch_daily_averages(window, &filter).await)
        }
        FetchRequest::Summary { filter, .. } => {
            FetchOutcome::Summary(repository.fetch_summary(&filter).await)
        }
    }
}

/// Drive pagination until the last page or `max_items` is reached.
pub async fn collect_historical(
    repository: &dyn MetricsRepository,
    filter: &FilterState,
    page_size: u32,
    max_items: usize,
) -> Result<Vec<Metric>, FetchError> {
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let result = repository.fetch_metrics_page(filter, page, page_size).await?;
        let last = result.is_last();
        tracing::debug!(
            page = result.page,
            total_pages = result.total_pages,
            received = result.items.len(),
            "fetched historical page"
        );
        let received = result.items.len();
        items.extend(result.items);

        if last || received == 0 || items.len() >= max_items {
            break;
        }
        page += 1;
    }

    items.truncate(max_items);
    Ok(items)
}
