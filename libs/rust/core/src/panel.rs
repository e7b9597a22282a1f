//! Configuration panel dispatch: bind a submission, run training, report the outcome.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use crate::binding::{collect_and_bind, BindError};
use crate::controls::{self, Control, ControlValue};
use crate::engine::TrainingEngine;
use crate::training_config::TrainingConfig;

pub const COMPLETION_MESSAGE: &str = "Training complete! 🎉 Check TensorBoard for results.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Completed,
    Failed { reason: String },
    Rejected { reason: String },
}

impl TrainingOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Completed => COMPLETION_MESSAGE.to_string(),
            Self::Failed { reason } => format!("Training failed: {reason}"),
            Self::Rejected { reason } => format!("Invalid input: {reason}"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub fn is_completed(&self) -> bool { matches!(self, Self::Completed) }
}

impl From<BindError> for TrainingOutcome {
    fn from(e: BindError) -> Self { Self::Rejected { reason: e.to_string() } }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the submission was rejected before binding completed.
    pub config: Option<TrainingConfig>,
    pub outcome: TrainingOutcome,
}

impl RunRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub struct Panel {
    controls: &'static [Control],
    base: TrainingConfig,
    engine: Arc<dyn TrainingEngine>,
    // One run at a time; later submissions queue behind it.
    run_lock: Mutex<()>,
    next_id: AtomicU64,
    last_run: RwLock<Option<RunRecord>>,
}

impl Panel {
    pub fn new<E: TrainingEngine + 'static>(base: TrainingConfig, engine: E) -> Self {
        Self::with_engine(base, Arc::new(engine))
    }

    pub fn with_engine(base: TrainingConfig, engine: Arc<dyn TrainingEngine>) -> Self {
        Self {
            controls: controls::declared(),
            base,
            engine,
            run_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            last_run: RwLock::new(None),
        }
    }

    pub fn controls(&self) -> &'static [Control] { self.controls }

    /// Configuration every submission starts from.
    pub fn base(&self) -> &TrainingConfig { &self.base }

    pub fn collect_and_bind(&self, values: &[ControlValue]) -> Result<TrainingConfig, BindError> {
        collect_and_bind(&self.base, self.controls, values)
    }

    /// Hands `config` to the engine and blocks until it returns.
    pub fn start_training(&self, config: TrainingConfig) -> TrainingOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.engine.run(config))) {
            Ok(Ok(())) => TrainingOutcome::Completed,
            Ok(Err(e)) => TrainingOutcome::Failed { reason: e.to_string() },
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                TrainingOutcome::Failed { reason: format!("training engine panicked: {msg}") }
            }
        }
    }

    /// Binds `values` and runs training. Blocking; call from a blocking-capable thread.
    ///
    /// Rejected submissions return immediately, even while another run holds the
    /// run lock, and are not recorded as the last run.
    pub fn submit(&self, values: &[ControlValue]) -> RunRecord {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        let config = match self.collect_and_bind(values) {
            Ok(config) => config,
            Err(e) => {
                warn!(run_id = id, error = %e, "submission_rejected");
                return RunRecord { id, started_at, finished_at: Utc::now(), config: None, outcome: e.into() };
            }
        };

        let _guard = self.run_lock.lock();
        let started_at = Utc::now();
        info!(run_id = id, algorithm = %config.algorithm, dataset = %config.dataset, rounds = config.num_rounds, clients = config.num_clients, "training_started");
        let clock = Instant::now();
        let outcome = self.start_training(config.clone());
        match &outcome {
            TrainingOutcome::Completed => info!(run_id = id, elapsed_ms = clock.elapsed().as_millis() as u64, "training_completed"),
            other => warn!(run_id = id, outcome = %other.message(), "training_failed"),
        }

        let record = RunRecord { id, started_at, finished_at: Utc::now(), config: Some(config), outcome };
        *self.last_run.write() = Some(record.clone());
        record
    }

    pub fn last_run(&self) -> Option<RunRecord> { self.last_run.read().clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{default_values, defaults_with};
    use crate::engine::TrainingError;
    use crate::training_config::Algorithm;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::mpsc;
    use std::sync::Mutex as StdMutex;
    use std::thread;
    use std::time::Duration;

    fn recording_panel() -> (Panel, Arc<StdMutex<Vec<TrainingConfig>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let sink = calls.clone();
        let panel = Panel::new(TrainingConfig::default(), move |cfg: TrainingConfig| -> Result<(), TrainingError> {
            sink.lock().unwrap().push(cfg);
            Ok(())
        });
        (panel, calls)
    }

    #[test]
    fn one_submit_runs_engine_once_with_latest_values() {
        let (panel, calls) = recording_panel();
        let values = defaults_with(&[("algorithm", "moon".into()), ("num_rounds", 4.0.into())]).unwrap();
        let record = panel.submit(&values);
        assert_eq!(record.outcome, TrainingOutcome::Completed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].algorithm, Algorithm::Moon);
        assert_eq!(calls[0].num_rounds, 4);
    }

    #[test]
    fn no_op_engine_yields_verbatim_completion_message() {
        let panel = Panel::new(TrainingConfig::default(), |_: TrainingConfig| -> Result<(), TrainingError> { Ok(()) });
        let record = panel.submit(&default_values());
        assert_eq!(record.outcome.message(), "Training complete! 🎉 Check TensorBoard for results.");
        assert_eq!(record.config.as_ref(), Some(panel.base()));
    }

    #[test]
    fn rejected_submission_never_reaches_engine() {
        let (panel, calls) = recording_panel();
        let record = panel.submit(&[true.into()]);
        assert!(matches!(record.outcome, TrainingOutcome::Rejected { .. }));
        assert!(record.outcome.message().starts_with("Invalid input: expected 16 values"));
        assert!(record.config.is_none());
        assert!(calls.lock().unwrap().is_empty());
        assert!(panel.last_run().is_none());
    }

    #[test]
    fn engine_errors_and_panics_become_failures() {
        let failing = Panel::new(TrainingConfig::default(), |_: TrainingConfig| -> Result<(), TrainingError> {
            Err(TrainingError::Engine("out of memory".into()))
        });
        assert_eq!(failing.submit(&default_values()).outcome.message(), "Training failed: out of memory");

        let panicking = Panel::new(TrainingConfig::default(), |_: TrainingConfig| -> Result<(), TrainingError> { panic!("boom") });
        let outcome = panicking.submit(&default_values()).outcome;
        assert_eq!(outcome, TrainingOutcome::Failed { reason: "training engine panicked: boom".into() });
    }

    #[test]
    fn concurrent_submits_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (now, peak) = (in_flight.clone(), max_seen.clone());
        let panel = Arc::new(Panel::new(TrainingConfig::default(), move |_: TrainingConfig| -> Result<(), TrainingError> {
            let current = now.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            peak.fetch_max(current, AtomicOrdering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            now.fetch_sub(1, AtomicOrdering::SeqCst);
            Ok(())
        }));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let panel = panel.clone();
                thread::spawn(move || panel.submit(&default_values()))
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap().outcome.is_completed());
        }
        assert_eq!(max_seen.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn rejection_does_not_wait_for_running_training() {
        let (started_tx, started_rx) = mpsc::channel();
        let panel = Arc::new(Panel::new(TrainingConfig::default(), move |_: TrainingConfig| -> Result<(), TrainingError> {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(800));
            Ok(())
        }));
        let running = {
            let panel = panel.clone();
            thread::spawn(move || panel.submit(&default_values()))
        };
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let clock = Instant::now();
        let rejected = panel.submit(&[true.into()]);
        assert!(matches!(rejected.outcome, TrainingOutcome::Rejected { .. }));
        assert!(clock.elapsed() < Duration::from_millis(400), "rejection waited {:?}", clock.elapsed());

        let completed = running.join().unwrap();
        let last = panel.last_run().unwrap();
        assert_eq!(last.id, completed.id);
        assert!(last.outcome.is_completed());
    }

    #[test]
    fn last_run_tracks_most_recent_submission() {
        let (panel, _) = recording_panel();
        assert!(panel.last_run().is_none());
        let first = panel.submit(&default_values());
        let second = panel.submit(&defaults_with(&[("num_epochs", 2.0.into())]).unwrap());
        let last = panel.last_run().unwrap();
        assert_eq!(last.id, second.id);
        assert!(last.id > first.id);
        assert_eq!(last.config.unwrap().num_epochs, 2);
    }
}
