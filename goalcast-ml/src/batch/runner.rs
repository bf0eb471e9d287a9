//! Sequential batch execution.

use super::worker::{WorkOutcome, Worker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Tally of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<WorkOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchReport {
    fn push(&mut self, outcome: WorkOutcome) {
        self.total += 1;
        if outcome.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Percentage of successful runs; `None` for an empty batch.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.succeeded as f64 * 100.0 / self.total as f64)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

/// Runs configurations one after another, pausing between runs.
pub struct BatchRunner<W: Worker> {
    worker: W,
    pause: Duration,
}

impl<W: Worker> BatchRunner<W> {
    pub fn new(worker: W, pause: Duration) -> Self {
        Self { worker, pause }
    }

    /// Execute every configuration. One failure never stops the batch.
    pub async fn execute_all(&self, configs: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, config) in configs.iter().enumerate() {
            info!(
                step = i + 1,
                total = configs.len(),
                config = %config.display(),
                "running experiment"
            );
            let outcome = self.worker.execute(config).await;
            if outcome.succeeded() {
                info!(config = %config.display(), elapsed_ms = outcome.duration.as_millis() as u64, "experiment succeeded");
            } else {
                warn!(config = %config.display(), output = %outcome.output, "experiment failed");
            }
            report.push(outcome);

            if i + 1 < configs.len() && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished"
        );
        report
    }
}
