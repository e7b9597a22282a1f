use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use fedpanel_core::{ControlValue, TrainingOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::page::Page;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub values: Vec<ControlValue>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub run_id: u64,
    pub outcome: TrainingOutcome,
    pub message: String,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let status = state.viz.status();
    let page = Page {
        title: &state.settings.panel.title,
        controls: state.panel.controls(),
        base: state.panel.base(),
        visualization: &status,
        visualization_url: state.viz.url(),
        frame_height: state.settings.visualization.frame_height,
    };
    Html(page.render())
}

pub async fn controls(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.panel.controls())
}

pub async fn train(State(state): State<AppState>, body: Result<Json<TrainRequest>, JsonRejection>) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "submission_malformed");
            let outcome = TrainingOutcome::Rejected { reason: rejection.body_text() };
            let body = json!({ "outcome": outcome, "message": outcome.message() });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
        }
    };
    let panel = state.panel.clone();
    let record = match tokio::task::spawn_blocking(move || panel.submit(&req.values)).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "training_task_failed");
            let outcome = TrainingOutcome::Failed { reason: format!("training task aborted: {e}") };
            let body = json!({ "outcome": outcome, "message": outcome.message() });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };
    state.metrics.record_run(&record);

    let status = match &record.outcome {
        TrainingOutcome::Completed => StatusCode::OK,
        TrainingOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TrainingOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = record.outcome.message();
    (status, Json(TrainResponse { run_id: record.id, outcome: record.outcome, message })).into_response()
}

pub async fn last_run(State(state): State<AppState>) -> Response {
    match state.panel.last_run() {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no training run yet" }))).into_response(),
    }
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let last = state.panel.last_run();
    Json(json!({
        "live": fedpanel_core::is_live(),
        "ready": fedpanel_core::is_ready(),
        "visualization": state.viz.status(),
        "visualization_url": state.viz.url(),
        "last_run": last.map(|r| json!({ "id": r.id, "finished_at": r.finished_at, "outcome": r.outcome })),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    state.metrics.observe_visualization(&state.viz.status());
    match state.metrics.encode() {
        Ok(buf) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}
