//! Execution of a single configuration, in-process or in a child process.

use crate::training::execute_config_within;
use async_trait::async_trait;
use goalcast_core::tracking::TrackingStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Succeeded,
    Failed,
}

/// Result of executing one configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutcome {
    pub config: PathBuf,
    pub status: WorkStatus,
    /// Run id on success, otherwise the failure text or captured output.
    pub output: String,
    pub duration: Duration,
}

impl WorkOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == WorkStatus::Succeeded
    }
}

/// Executes one configuration. A worker never returns an error: every
/// failure, panic or timeout is reported as a failed outcome.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, config: &Path) -> WorkOutcome;
}

/// Runs the training pipeline on a spawned task of the current runtime.
pub struct InProcessWorker {
    store: Arc<dyn TrackingStore>,
    timeout: Option<Duration>,
}

impl InProcessWorker {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Worker for InProcessWorker {
    async fn execute(&self, config: &Path) -> WorkOutcome {
        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let path = config.to_path_buf();
        let limit = self.timeout;
        // Awaited to completion: the limit is enforced inside the run, before
        // registration, so the next configuration never overlaps this one.
        let joined = tokio::spawn(async move {
            execute_config_within(&path, store.as_ref(), limit).await
        })
        .await;

        match joined {
            Ok(Ok(run_id)) => outcome(config, WorkStatus::Succeeded, run_id, started),
            Ok(Err(e)) => outcome(config, WorkStatus::Failed, e.to_string(), started),
            Err(e) if e.is_panic() => {
                warn!(config = %config.display(), "experiment panicked");
                outcome(
                    config,
                    WorkStatus::Failed,
                    format!("experiment panicked: {e}"),
                    started,
                )
            }
            Err(e) => outcome(config, WorkStatus::Failed, e.to_string(), started),
        }
    }
}

/// Re-invokes an executable as `<program> <args_prefix..> run <config>`.
///
/// A time limit is forwarded as `--timeout-ms` and enforced by the child the
/// same way [`InProcessWorker`] enforces it; the child is always awaited.
pub struct SubprocessWorker {
    program: PathBuf,
    args_prefix: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessWorker {
    pub fn new(program: impl Into<PathBuf>, args_prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args_prefix,
            timeout: None,
        }
    }

    /// Worker that re-invokes the running executable.
    pub fn current_exe(args_prefix: Vec<String>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args_prefix))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, config: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args_prefix).arg("run").arg(config);
        if let Some(limit) = self.timeout {
            cmd.arg("--timeout-ms").arg(limit.as_millis().to_string());
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Worker for SubprocessWorker {
    async fn execute(&self, config: &Path) -> WorkOutcome {
        let started = Instant::now();
        debug!(program = %self.program.display(), config = %config.display(), "spawning experiment process");
        let result = self.command(config).output().await;

        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut captured = stdout.trim_end().to_string();
                if !stderr.trim().is_empty() {
                    if !captured.is_empty() {
                        captured.push('\n');
                    }
                    captured.push_str(stderr.trim_end());
                }
                let status = if output.status.success() {
                    WorkStatus::Succeeded
                } else {
                    WorkStatus::Failed
                };
                outcome(config, status, captured, started)
            }
            Err(e) => outcome(
                config,
                WorkStatus::Failed,
                format!("could not start {}: {e}", self.program.display()),
                started,
            ),
        }
    }
}

fn outcome(config: &Path, status: WorkStatus, output: String, started: Instant) -> WorkOutcome {
    WorkOutcome {
        config: config.to_path_buf(),
        status,
        output,
        duration: started.elapsed(),
    }
}
