//! Prometheus metrics for training runs and the visualization server.

use fedpanel_core::{RunRecord, VisualizationStatus};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub runs_total: IntCounterVec,
    pub run_duration_seconds: Histogram,
    pub visualization_ready: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let runs_total = IntCounterVec::new(
            Opts::new("fedpanel_training_runs_total", "Training submissions by outcome"),
            &["outcome"],
        )?;
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("fedpanel_training_duration_seconds", "Wall time of completed or failed training runs")
                .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]),
        )?;
        let visualization_ready = IntGauge::new("fedpanel_visualization_ready", "1 when the visualization server answered its readiness probe")?;
        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(visualization_ready.clone()))?;
        Ok(Self { registry, runs_total, run_duration_seconds, visualization_ready })
    }

    pub fn record_run(&self, record: &RunRecord) {
        self.runs_total.with_label_values(&[record.outcome.label()]).inc();
        // rejected submissions never reach the engine
        if record.config.is_some() {
            self.run_duration_seconds.observe(record.duration_secs());
        }
    }

    pub fn observe_visualization(&self, status: &VisualizationStatus) {
        self.visualization_ready.set(i64::from(status.is_ready()));
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedpanel_core::{TrainingConfig, TrainingOutcome};

    fn record(outcome: TrainingOutcome, config: Option<TrainingConfig>) -> RunRecord {
        let now = chrono::Utc::now();
        RunRecord { id: 1, started_at: now, finished_at: now, config, outcome }
    }

    #[test]
    fn runs_are_counted_by_outcome() {
        let m = Metrics::new().unwrap();
        m.record_run(&record(TrainingOutcome::Completed, Some(TrainingConfig::default())));
        m.record_run(&record(TrainingOutcome::Rejected { reason: "bad".into() }, None));
        m.record_run(&record(TrainingOutcome::Completed, Some(TrainingConfig::default())));
        assert_eq!(m.runs_total.with_label_values(&["completed"]).get(), 2);
        assert_eq!(m.runs_total.with_label_values(&["rejected"]).get(), 1);
        assert_eq!(m.run_duration_seconds.get_sample_count(), 2);
    }

    #[test]
    fn exposition_contains_all_families() {
        let m = Metrics::new().unwrap();
        m.observe_visualization(&VisualizationStatus::Ready { url: "http://127.0.0.1:6006".into(), reused: false });
        m.runs_total.with_label_values(&["failed"]).inc();
        let text = String::from_utf8(m.encode().unwrap()).unwrap();
        assert!(text.contains("fedpanel_training_runs_total{outcome=\"failed\"} 1"));
        assert!(text.contains("fedpanel_training_duration_seconds"));
        assert!(text.contains("fedpanel_visualization_ready 1"));
    }
}
