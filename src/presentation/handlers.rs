// HTTP request handlers
use crate::application::controller::ControllerStatus;
use crate::domain::dashboard::metric_type_config;
use crate::domain::filter::FilterState;
use crate::infrastructure::chunked_stream::stream_from_watch;
use crate::infrastructure::http_response::{accepts_brotli, respond_json};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    connected: bool,
    #[serde(flatten)]
    status: ControllerStatus,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/series", get(get_series))
        .route("/series/stream", get(stream_series))
        .route("/groups", get(get_groups))
        .route("/locations", get(get_locations))
        .route("/latest", get(get_latest))
        .route("/summary", get(get_summary))
        .route("/status", get(get_status))
        .route("/metric-types/:metric_type", get(get_metric_type))
        .route("/filter", post(set_filter))
        .route("/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `signal` resolves. The controller stops first so its watch
/// senders drop and open `/series/stream` bodies can finish.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let controller = state.controller.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            controller.shutdown().await;
        })
        .await
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_series(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond_json(&state.controller.series(), &headers).await
}

/// Stream series snapshots as they are republished
pub async fn stream_series(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let series = state.controller.subscribe_series();
    let groups = state.controller.subscribe_groups();
    stream_from_watch(series, groups, accepts_brotli(&headers)).await
}

/// Type grouping, optionally narrowed to one location
pub async fn get_groups(
    Query(query): Query<LocationQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let groups = state.controller.groups();
    match query.location.as_deref().filter(|l| !l.is_empty()) {
        Some(location) => respond_json(&groups.for_location(location), &headers).await,
        None => respond_json(groups.as_ref(), &headers).await,
    }
}

pub async fn get_locations(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond_json(&state.controller.groups().locations(), &headers).await
}

pub async fn get_latest(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond_json(&state.controller.latest(), &headers).await
}

pub async fn get_summary(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.controller.summary() {
        Some(summary) => respond_json(&summary, &headers).await,
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn get_status(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = StatusBody {
        connected: state.controller.is_connected(),
        status: state.controller.status(),
    };
    respond_json(&body, &headers).await
}

pub async fn get_metric_type(
    Path(metric_type): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    respond_json(&metric_type_config(&state.metric_types, &metric_type), &headers).await
}

pub async fn set_filter(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<FilterState>,
) -> impl IntoResponse {
    state.controller.set_filter(filter).await;
    StatusCode::ACCEPTED
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.controller.refresh().await;
    StatusCode::ACCEPTED
}
