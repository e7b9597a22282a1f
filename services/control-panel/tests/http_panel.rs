//! Drives the panel router over a real socket.
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use control_panel::metrics::Metrics;
use control_panel::{router, AppState};
use fedpanel_core::{Panel, PanelSettings, TrainingConfig, TrainingEngine, TrainingError, VisualizationHandle, VisualizationStatus};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

async fn serve(engine: Arc<dyn TrainingEngine>, viz: VisualizationStatus) -> SocketAddr {
    let settings = PanelSettings::default();
    let viz = VisualizationHandle::new(settings.visualization.url(), viz);
    let panel = Panel::with_engine(settings.base_training_config(), engine);
    let state = AppState { settings: Arc::new(settings), panel: Arc::new(panel), viz, metrics: Arc::new(Metrics::new().unwrap()) };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
    addr
}

fn ready() -> VisualizationStatus { VisualizationStatus::Ready { url: "http://127.0.0.1:6006".into(), reused: false } }

fn recording_engine() -> (Arc<dyn TrainingEngine>, Arc<Mutex<Vec<TrainingConfig>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let engine = move |cfg: TrainingConfig| -> Result<(), TrainingError> {
        sink.lock().unwrap().push(cfg);
        Ok(())
    };
    (Arc::new(engine), calls)
}

fn submission(overrides: &[(&str, Value)]) -> Value {
    let controls: Value = serde_json::to_value(fedpanel_core::controls::declared()).unwrap();
    let values: Vec<Value> = controls
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            let name = c["name"].as_str().unwrap();
            overrides.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone()).unwrap_or_else(|| c["default"].clone())
        })
        .collect();
    json!({ "values": values })
}

#[tokio::test]
async fn page_and_controls_are_served() {
    let (engine, _) = recording_engine();
    let addr = serve(engine, ready()).await;
    let client = Client::new();

    let page = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let html = page.text().await.unwrap();
    assert!(html.contains("Federated Learning GUI"));
    assert!(html.contains("src=\"http://127.0.0.1:6006\""));

    let controls: Value = client.get(format!("http://{addr}/api/controls")).send().await.unwrap().json().await.unwrap();
    let names: Vec<&str> = controls.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 16);
    assert_eq!(names[0], "algorithm");
    assert_eq!(names[15], "dpfl");
    assert_eq!(controls[5]["constraint"], json!({ "kind": "range", "min": 32.0, "max": 512.0, "step": 32.0 }));
}

#[tokio::test]
async fn submit_runs_engine_and_records_last_run() {
    let (engine, calls) = recording_engine();
    let addr = serve(engine, ready()).await;
    let client = Client::new();

    let none = client.get(format!("http://{addr}/api/runs/last")).send().await.unwrap();
    assert_eq!(none.status(), StatusCode::NOT_FOUND);

    let body = submission(&[("algorithm", json!("fedprox")), ("dataset", json!("Cifar10")), ("num_clients", json!(5)), ("dpfl", json!(true))]);
    let resp = client.post(format!("http://{addr}/api/train")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let out: Value = resp.json().await.unwrap();
    assert_eq!(out["message"], "Training complete! 🎉 Check TensorBoard for results.");
    assert_eq!(out["outcome"]["status"], "completed");

    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].num_clients, 5);
        assert!(calls[0].dpfl);
        assert_eq!(calls[0].batch_size, 128);
        assert_eq!(calls[0].num_rounds, 10);
    }

    let last: Value = client.get(format!("http://{addr}/api/runs/last")).send().await.unwrap().json().await.unwrap();
    assert_eq!(last["config"]["algorithm"], "fedprox");
    assert_eq!(last["config"]["dataset"], "Cifar10");

    let status: Value = client.get(format!("http://{addr}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["visualization"]["state"], "ready");
    assert_eq!(status["last_run"]["outcome"]["status"], "completed");

    let metrics = client.get(format!("http://{addr}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("fedpanel_training_runs_total{outcome=\"completed\"} 1"));
    assert!(metrics.contains("fedpanel_visualization_ready 1"));
}

#[tokio::test]
async fn invalid_submission_is_422_and_skips_engine() {
    let (engine, calls) = recording_engine();
    let addr = serve(engine, ready()).await;
    let client = Client::new();

    let body = submission(&[("batch_size", json!(100))]);
    let resp = client.post(format!("http://{addr}/api/train")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let out: Value = resp.json().await.unwrap();
    assert_eq!(out["outcome"]["status"], "rejected");
    assert!(out["message"].as_str().unwrap().starts_with("Invalid input:"));

    let malformed = client.post(format!("http://{addr}/api/train")).json(&json!({ "values": [null] })).send().await.unwrap();
    assert_eq!(malformed.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let out: Value = malformed.json().await.unwrap();
    assert_eq!(out["outcome"]["status"], "rejected");
    assert!(out["message"].as_str().unwrap().starts_with("Invalid input:"));

    let not_json = client.post(format!("http://{addr}/api/train")).body("values=1").send().await.unwrap();
    assert!(not_json.status().is_client_error());
    let out: Value = not_json.json().await.unwrap();
    assert_eq!(out["outcome"]["status"], "rejected");

    let short = client.post(format!("http://{addr}/api/train")).json(&json!({ "values": ["fedavg"] })).send().await.unwrap();
    assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(calls.lock().unwrap().is_empty());

    let none = client.get(format!("http://{addr}/api/runs/last")).send().await.unwrap();
    assert_eq!(none.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_engine_is_500() {
    let engine = |_: TrainingConfig| -> Result<(), TrainingError> { Err(TrainingError::Engine("CUDA out of memory".into())) };
    let addr = serve(Arc::new(engine), ready()).await;
    let resp = Client::new().post(format!("http://{addr}/api/train")).json(&submission(&[])).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let out: Value = resp.json().await.unwrap();
    assert_eq!(out["message"], "Training failed: CUDA out of memory");
}

#[tokio::test]
async fn unavailable_visualization_is_reported() {
    let (engine, _) = recording_engine();
    let addr = serve(engine, VisualizationStatus::Unavailable { reason: "port 6006 is already in use".into() }).await;
    let client = Client::new();

    let html = client.get(format!("http://{addr}/")).send().await.unwrap().text().await.unwrap();
    assert!(html.contains("Visualization unavailable: port 6006 is already in use"));

    let status: Value = client.get(format!("http://{addr}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["visualization"], json!({ "state": "unavailable", "reason": "port 6006 is already in use" }));
    assert!(status["last_run"].is_null());

    let live: Value = client.get(format!("http://{addr}/live")).send().await.unwrap().json().await.unwrap();
    assert_eq!(live["live"], true);
}
