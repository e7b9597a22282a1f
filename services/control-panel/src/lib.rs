//! HTTP control panel for launching federated-learning training runs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use fedpanel_core::{
    clear_ready, health_routes, init_tracing, load_settings, mark_not_live, mark_ready, CommandEngine, PanelSettings, Panel, VisualizationHandle,
    VisualizationLauncher,
};
use tracing::info;

pub mod metrics;
pub mod page;
pub mod routes;

use metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<PanelSettings>,
    pub panel: Arc<Panel>,
    pub viz: VisualizationHandle,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/controls", get(routes::controls))
        .route("/api/train", post(routes::train))
        .route("/api/runs/last", get(routes::last_run))
        .route("/status", get(routes::status))
        .route("/metrics", get(routes::metrics))
        .merge(health_routes::<AppState>())
        .with_state(state)
}

pub async fn run() -> Result<()> {
    let settings = load_settings("control-panel")?;
    init_tracing(&settings.service_name, &settings.log_level)?;
    info!(target: "control-panel", "Starting control-panel service");

    let launcher = VisualizationLauncher::from_settings(settings.visualization.clone()).context("building readiness probe")?;
    let viz = launcher.launch().await;

    let engine = CommandEngine::from_settings(&settings.training);
    let panel = Panel::new(settings.base_training_config(), engine);
    let metrics = Metrics::new().context("registering metrics")?;
    metrics.observe_visualization(&viz.status());

    let addr: SocketAddr = format!("{}:{}", settings.panel.bind, settings.panel.port)
        .parse()
        .with_context(|| format!("invalid panel address {}:{}", settings.panel.bind, settings.panel.port))?;
    let state = AppState { settings: Arc::new(settings), panel: Arc::new(panel), viz, metrics: Arc::new(metrics) };

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!(target: "control-panel", %addr, "panel listening");
    mark_ready();
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await?;
    info!(target: "control-panel", "control-panel stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    clear_ready();
    mark_not_live();
    info!(target: "control-panel", "shutdown requested");
}
