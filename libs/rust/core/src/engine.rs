//! Training engine boundary.
//!
//! The panel only knows this trait. Closures implement it directly; `CommandEngine`
//! runs an external training program with the bound configuration as flags.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{info, instrument};

use crate::settings::EngineSettings;
use crate::training_config::TrainingConfig;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("failed to start `{program}`: {source}")]
    Spawn { program: String, #[source] source: std::io::Error },
    #[error("`{program}` exited with {status}: {detail}")]
    Exit { program: String, status: String, detail: String },
    #[error("{0}")]
    Engine(String),
}

pub trait TrainingEngine: Send + Sync {
    /// Runs training to completion on the calling thread.
    fn run(&self, config: TrainingConfig) -> Result<(), TrainingError>;
}

impl<F> TrainingEngine for F
where
    F: Fn(TrainingConfig) -> Result<(), TrainingError> + Send + Sync,
{
    fn run(&self, config: TrainingConfig) -> Result<(), TrainingError> { self(config) }
}

/// Runs `<program> <args..> --<field> <value>.. --log_dir <dir>` and waits for it.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, working_dir: None }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self { program: settings.program.clone(), args: settings.args.clone(), working_dir: settings.working_dir.clone() }
    }

    pub fn command_line(&self, config: &TrainingConfig) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(config.to_cli_args());
        args
    }
}

impl TrainingEngine for CommandEngine {
    #[instrument(skip_all, fields(program = %self.program))]
    fn run(&self, config: TrainingConfig) -> Result<(), TrainingError> {
        let args = self.command_line(&config);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::inherit()).stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir { cmd.current_dir(dir); }
        info!(?args, "training_process_starting");

        let spawn_err = |source| TrainingError::Spawn { program: self.program.clone(), source };
        let mut child = cmd.spawn().map_err(spawn_err)?;

        // stderr is forwarded line by line; the last line is kept for the failure message.
        let mut last_line = None;
        if let Some(stderr) = child.stderr.take() {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if line.trim().is_empty() { continue; }
                info!(target: "training", "{line}");
                last_line = Some(line.trim().to_string());
            }
        }
        let status = child.wait().map_err(spawn_err)?;
        if status.success() {
            info!("training_process_finished");
            return Ok(());
        }
        Err(TrainingError::Exit {
            program: self.program.clone(),
            status: status.to_string(),
            detail: last_line.unwrap_or_else(|| "no stderr output".to_string()),
        })
    }
}
