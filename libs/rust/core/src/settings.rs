//! Layered service settings: built-in defaults, optional file, `FEDPANEL__*` environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::controls;
use crate::resilience::RetryConfig;
use crate::training_config::TrainingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub service_name: String,
    pub log_level: String,
    pub panel: ServerSettings,
    pub visualization: VisualizationSettings,
    pub training: EngineSettings,
    /// Overrides applied to the base training configuration.
    pub defaults: TrainingConfig,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            service_name: "control-panel".into(),
            log_level: "info".into(),
            panel: ServerSettings::default(),
            visualization: VisualizationSettings::default(),
            training: EngineSettings::default(),
            defaults: TrainingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    pub title: String,
}

impl Default for ServerSettings {
    fn default() -> Self { Self { bind: "127.0.0.1".into(), port: 7860, title: "Federated Learning GUI".into() } }
}

/// What to do when the visualization port already answers before we spawn anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortPolicy {
    #[default]
    Reuse,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationSettings {
    pub enabled: bool,
    pub program: String,
    pub extra_args: Vec<String>,
    pub log_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub frame_height: u32,
    pub probe_attempts: usize,
    pub probe_delay_ms: u64,
    pub startup_timeout_ms: u64,
    /// Upper bound for the backoff between background probes after a slow start.
    pub recheck_max_delay_ms: u64,
    pub on_port_in_use: PortPolicy,
}

impl Default for VisualizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "tensorboard".into(),
            extra_args: Vec::new(),
            log_dir: PathBuf::from("runs"),
            host: "127.0.0.1".into(),
            port: 6006,
            frame_height: 700,
            probe_attempts: 10,
            probe_delay_ms: 200,
            startup_timeout_ms: 5000,
            recheck_max_delay_ms: 5000,
            on_port_in_use: PortPolicy::Reuse,
        }
    }
}

impl VisualizationSettings {
    pub fn url(&self) -> String { format!("http://{}:{}", self.host, self.port) }

    pub fn probe_retry(&self) -> RetryConfig { RetryConfig::fixed(self.probe_attempts, Duration::from_millis(self.probe_delay_ms)) }

    pub fn startup_timeout(&self) -> Duration { Duration::from_millis(self.startup_timeout_ms) }

    /// Unbounded, jittered exponential backoff used once the startup window has passed.
    pub fn recheck_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: usize::MAX,
            base_delay: Duration::from_millis(self.probe_delay_ms),
            max_delay: Duration::from_millis(self.recheck_max_delay_ms.max(self.probe_delay_ms)),
            jitter: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self { Self { program: "python".into(), args: vec!["main.py".into()], working_dir: None } }
}

impl PanelSettings {
    /// Base configuration for submissions; the log directory always follows the visualization server.
    pub fn base_training_config(&self) -> TrainingConfig {
        TrainingConfig { log_dir: self.visualization.log_dir.clone(), ..self.defaults.clone() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.panel.port == 0 { bail!("panel.port must be non-zero"); }
        let viz = &self.visualization;
        if viz.enabled {
            if viz.port == 0 { bail!("visualization.port must be non-zero"); }
            if viz.program.trim().is_empty() { bail!("visualization.program must not be empty"); }
            if viz.probe_attempts == 0 { bail!("visualization.probe_attempts must be at least 1"); }
        }
        if viz.frame_height == 0 { bail!("visualization.frame_height must be positive"); }
        if self.training.program.trim().is_empty() { bail!("training.program must not be empty"); }
        // The page starts its widgets from the base, so it has to be submittable as-is.
        let base = self.base_training_config();
        for control in controls::declared() {
            let Some(value) = base.field(control.name) else { bail!("defaults: no field `{}`", control.name) };
            if let Err(e) = control.constraint.check(control.name, &value) {
                bail!("defaults.{}: {e}", control.name);
            }
        }
        Ok(())
    }
}

fn builder(service: &str) -> Result<ConfigBuilder<DefaultState>> {
    Ok(config::Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<PanelSettings> {
    let builder = builder.add_source(Environment::with_prefix("FEDPANEL").separator("__").try_parsing(true));
    let settings: PanelSettings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings; `FEDPANEL_CONFIG_FILE` names an optional YAML/TOML/JSON file.
pub fn load_settings(service: &str) -> Result<PanelSettings> {
    let mut b = builder(service)?;
    if let Ok(file) = std::env::var("FEDPANEL_CONFIG_FILE") {
        b = b.add_source(File::with_name(&file).required(false));
    }
    finish(b)
}

pub fn settings_from_yaml(service: &str, yaml: &str) -> Result<PanelSettings> {
    finish(builder(service)?.add_source(File::from_str(yaml, FileFormat::Yaml)))
}
