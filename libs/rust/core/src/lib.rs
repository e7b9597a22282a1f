//! Core library for the federated-learning control panel.
//!
//! Declares the panel controls, binds submitted values onto a per-run
//! [`TrainingConfig`], drives the training engine and launches the
//! visualization server. Shared tracing, settings and health plumbing live here too.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use axum::{routing::get, Json, Router};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod binding;
pub mod controls;
pub mod engine;
pub mod panel;
pub mod resilience;
pub mod settings;
pub mod training_config;
pub mod visualization;

pub use binding::{collect_and_bind, BindError};
pub use controls::{Constraint, Control, ControlValue, Section};
pub use engine::{CommandEngine, TrainingEngine, TrainingError};
pub use panel::{Panel, RunRecord, TrainingOutcome, COMPLETION_MESSAGE};
pub use resilience::{retry_async, RetryConfig};
pub use settings::{load_settings, PanelSettings, PortPolicy};
pub use training_config::TrainingConfig;
pub use visualization::{VisualizationHandle, VisualizationLauncher, VisualizationStatus};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`;
/// `FEDPANEL_JSON_LOG=1` switches to flattened JSON lines.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("FEDPANEL_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false));
        let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true));
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "fedpanel", service, "tracing initialized");
    Ok(())
}

/// `/live` and `/ready` probes backed by the process-wide flags.
pub fn health_routes<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({ "live": is_live() })) }))
        .route("/ready", get(|| async { Json(serde_json::json!({ "ready": is_ready() })) }))
}
