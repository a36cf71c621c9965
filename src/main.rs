// Main entry point - Dependency injection and server setup
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use telemetry_reconciler::application::controller::ReconciliationController;
use telemetry_reconciler::domain::filter::FilterState;
use telemetry_reconciler::infrastructure::config::load_dashboard_config;
use telemetry_reconciler::infrastructure::push_client::HttpPushChannel;
use telemetry_reconciler::infrastructure::rest_repository::RestMetricsRepository;
use telemetry_reconciler::presentation::app_state::AppState;
use telemetry_reconciler::presentation::handlers::serve;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_dashboard_config().context("loading dashboard config")?;

    // Initialize tracing, RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create providers (infrastructure layer)
    let repository = Arc::new(RestMetricsRepository::new(
        config.api.base_url.clone(),
        Duration::from_millis(config.api.timeout_ms),
    )?);
    let push = Arc::new(HttpPushChannel::new(config.push.url.clone()));

    // Start the reconciliation controller (application layer)
    let controller = ReconciliationController::new(
        repository,
        push,
        config.reconciler.controller_settings(),
    );
    let (handle, controller_task) = controller.spawn(FilterState::default());

    // Create application state
    let state = Arc::new(AppState {
        controller: handle,
        metric_types: config.metric_types.clone(),
    });

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    tracing::info!("Starting telemetry-reconciler on {}", addr);

    // Serve (presentation layer); ctrl-c stops the controller before draining connections
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
    })
    .await?;

    let _ = controller_task.await;

    Ok(())
}
