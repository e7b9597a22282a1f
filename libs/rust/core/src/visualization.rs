//! Background launcher for the metrics-visualization server (TensorBoard by default).
//!
//! The server process is watched by its own OS thread. Readiness is established
//! by probing its HTTP port with bounded retries under a hard timeout; the
//! outcome is published through a shared [`VisualizationHandle`].

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::resilience::{retry_async, RetryConfig};
use crate::settings::{PortPolicy, VisualizationSettings};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VisualizationStatus {
    Disabled,
    Starting,
    Ready { url: String, reused: bool },
    Unavailable { reason: String },
    Exited { reason: String },
}

impl VisualizationStatus {
    pub fn is_ready(&self) -> bool { matches!(self, Self::Ready { .. }) }

    /// Human-readable reason the frame cannot be shown, if any.
    pub fn problem(&self) -> Option<String> {
        match self {
            Self::Ready { .. } => None,
            Self::Disabled => Some("visualization is disabled".into()),
            Self::Starting => Some("visualization server is still starting".into()),
            Self::Unavailable { reason } | Self::Exited { reason } => Some(reason.clone()),
        }
    }
}

/// Shared view of the visualization server's state.
#[derive(Debug, Clone)]
pub struct VisualizationHandle {
    url: String,
    status: Arc<RwLock<VisualizationStatus>>,
}

impl VisualizationHandle {
    pub fn new(url: impl Into<String>, status: VisualizationStatus) -> Self {
        Self { url: url.into(), status: Arc::new(RwLock::new(status)) }
    }

    pub fn url(&self) -> &str { &self.url }

    pub fn status(&self) -> VisualizationStatus { self.status.read().clone() }

    fn exit_reason(&self) -> Option<String> {
        match &*self.status.read() {
            VisualizationStatus::Exited { reason } => Some(reason.clone()),
            _ => None,
        }
    }

    fn mark_exited(&self, reason: String) {
        warn!(url = %self.url, %reason, "visualization_exited");
        *self.status.write() = VisualizationStatus::Exited { reason };
    }

    // An exit observed by the watcher thread wins over the probe result.
    fn settle(&self, status: VisualizationStatus) {
        let mut current = self.status.write();
        if !matches!(*current, VisualizationStatus::Exited { .. }) {
            *current = status;
        }
    }
}

/// Command line used to start the visualization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VizCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl VizCommand {
    pub fn new(program: &str, log_dir: &Path, port: u16, extra_args: &[String]) -> Self {
        let mut args = vec!["--logdir".to_string(), log_dir.display().to_string(), "--port".to_string(), port.to_string()];
        args.extend(extra_args.iter().cloned());
        Self { program: program.to_string(), args }
    }
}

pub type ExitHook = Box<dyn FnOnce(String) + Send + 'static>;

pub trait Spawner: Send + Sync {
    /// Starts `command` without waiting for it; `on_exit` fires once the process ends.
    fn spawn(&self, command: &VizCommand, on_exit: ExitHook) -> io::Result<()>;
}

/// Spawns a real process and waits on it from a detached, named thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, command: &VizCommand, on_exit: ExitHook) -> io::Result<()> {
        let mut child = Command::new(&command.program).args(&command.args).stdin(Stdio::null()).spawn()?;
        info!(program = %command.program, pid = child.id(), "visualization_process_spawned");
        thread::Builder::new().name("viz-server".into()).spawn(move || {
            let reason = match child.wait() {
                Ok(status) => format!("visualization process exited with {status}"),
                Err(e) => format!("failed to wait on visualization process: {e}"),
            };
            on_exit(reason);
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("{0}")]
    Exited(String),
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// Any non-5xx HTTP answer counts as serving.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { client: reqwest::Client::builder().timeout(timeout).build()? })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let resp = self.client.get(url).send().await?;
        if resp.status().is_server_error() {
            return Err(ProbeError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

pub struct VisualizationLauncher<S = ProcessSpawner, P = HttpProbe> {
    settings: VisualizationSettings,
    spawner: S,
    probe: Arc<P>,
}

impl VisualizationLauncher {
    pub fn from_settings(settings: VisualizationSettings) -> Result<Self, reqwest::Error> {
        // A single probe never outlives one retry interval (with a sane floor).
        let per_request = Duration::from_millis(settings.probe_delay_ms.max(250));
        let probe = HttpProbe::new(per_request)?;
        Ok(Self::new(settings, ProcessSpawner, probe))
    }
}

impl<S: Spawner, P: Probe + 'static> VisualizationLauncher<S, P> {
    pub fn new(settings: VisualizationSettings, spawner: S, probe: P) -> Self { Self { settings, spawner, probe: Arc::new(probe) } }

    pub fn url(&self) -> String { self.settings.url() }

    pub fn command(&self) -> VizCommand {
        VizCommand::new(&self.settings.program, &self.settings.log_dir, self.settings.port, &self.settings.extra_args)
    }

    /// Starts the server (or adopts one already on the port) and waits, bounded, until it answers.
    ///
    /// A spawned server that misses the startup window keeps being probed in the
    /// background until it answers or exits.
    pub async fn launch(&self) -> VisualizationHandle {
        let handle = VisualizationHandle::new(self.url(), VisualizationStatus::Starting);
        let (status, spawned) = if self.settings.enabled { self.start(&handle).await } else { (VisualizationStatus::Disabled, false) };
        match &status {
            VisualizationStatus::Ready { url, reused } => info!(%url, reused, "visualization_ready"),
            VisualizationStatus::Unavailable { reason } => warn!(%reason, "visualization_unavailable"),
            _ => info!(?status, "visualization_status"),
        }
        let recheck = spawned && matches!(status, VisualizationStatus::Unavailable { .. });
        handle.settle(status);
        if recheck {
            tokio::spawn(keep_probing(handle.clone(), self.probe.clone(), self.settings.recheck_retry()));
        }
        handle
    }

    /// Returns the status reached within the startup window and whether a process was spawned.
    async fn start(&self, handle: &VisualizationHandle) -> (VisualizationStatus, bool) {
        let url = self.url();
        let window = self.settings.startup_timeout();
        let deadline = tokio::time::Instant::now() + window;

        // A pre-check that cannot finish inside the window counts as "nothing serving".
        if let Ok(Ok(())) = tokio::time::timeout_at(deadline, self.probe.probe(&url)).await {
            let status = match self.settings.on_port_in_use {
                PortPolicy::Reuse => VisualizationStatus::Ready { url, reused: true },
                PortPolicy::Fail => VisualizationStatus::Unavailable { reason: format!("port {} is already in use", self.settings.port) },
            };
            return (status, false);
        }

        let command = self.command();
        let watcher = handle.clone();
        if let Err(e) = self.spawner.spawn(&command, Box::new(move |reason| watcher.mark_exited(reason))) {
            return (VisualizationStatus::Unavailable { reason: format!("failed to start `{}`: {e}", command.program) }, false);
        }

        let retry = self.settings.probe_retry();
        let probe = self.probe.as_ref();
        let target = url.as_str();
        let probing = retry_async(&retry, |_attempt| {
            let exited = handle.exit_reason();
            async move {
                match exited {
                    Some(reason) => Err(ProbeError::Exited(reason)),
                    None => probe.probe(target).await,
                }
            }
        });
        let status = match tokio::time::timeout_at(deadline, probing).await {
            Ok(Ok(())) => VisualizationStatus::Ready { url, reused: false },
            Ok(Err(e)) => VisualizationStatus::Unavailable { reason: format!("{url} not reachable after {} attempts: {e}", retry.attempts()) },
            Err(_) => VisualizationStatus::Unavailable { reason: format!("{url} not reachable within {}ms", window.as_millis()) },
        };
        (status, true)
    }
}

async fn keep_probing<P: Probe>(handle: VisualizationHandle, probe: Arc<P>, retry: RetryConfig) {
    for attempt in 0..=retry.max_retries {
        tokio::time::sleep(retry.delay_for(attempt)).await;
        if handle.exit_reason().is_some() {
            return;
        }
        if probe.probe(handle.url()).await.is_ok() {
            info!(url = %handle.url(), attempt, "visualization_ready");
            handle.settle(VisualizationStatus::Ready { url: handle.url().to_string(), reused: false });
            return;
        }
    }
    warn!(url = %handle.url(), "visualization_recheck_gave_up");
}
