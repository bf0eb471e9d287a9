//! Metrics bridge: projects tracking-store state into Prometheus text.
//!
//! For every experiment except the reserved default one, the run with the
//! largest `end_time` is selected and each of its metrics becomes one line:
//!
//! ```text
//! mlflow_mse_local{run_id="abc"} 1.234
//! ```

pub mod server;

use crate::error::BridgeError;
use crate::settings::BridgeSettings;
use crate::tracking::{TrackingRun, TrackingStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix added to every exported metric name.
pub const METRIC_PREFIX: &str = "mlflow_";

/// One exposition line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposedLine {
    pub metric_name: String,
    /// Label pairs in output order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl ExposedLine {
    pub fn render(&self) -> String {
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{labels}}} {}", self.metric_name, format_value(self.value))
    }
}

/// Reads the tracking store and renders the latest metrics per experiment.
pub struct MetricsBridge {
    store: Arc<dyn TrackingStore>,
    settings: BridgeSettings,
}

impl MetricsBridge {
    pub fn new(store: Arc<dyn TrackingStore>, settings: BridgeSettings) -> Self {
        Self { store, settings }
    }

    /// Query the store and build the exposition lines.
    ///
    /// Any upstream failure aborts the whole collection; nothing partial is
    /// returned.
    pub async fn collect(&self) -> Result<Vec<ExposedLine>, BridgeError> {
        let experiments = self
            .store
            .search_experiments(self.settings.max_experiments)
            .await?;
        let experiment_ids: Vec<String> = experiments
            .into_iter()
            .filter(|e| e.name != self.settings.excluded_experiment)
            .map(|e| e.experiment_id)
            .collect();
        if experiment_ids.is_empty() {
            return Err(BridgeError::NoExperiments);
        }
        debug!(experiments = experiment_ids.len(), "searching runs");

        let runs = self.store.search_runs(&experiment_ids).await?;
        if runs.is_empty() {
            return Err(BridgeError::NoRuns { experiment_ids });
        }

        let lines: Vec<ExposedLine> = select_latest_runs(&runs)
            .into_iter()
            .flat_map(exposed_lines)
            .collect();
        info!(
            runs = runs.len(),
            lines = lines.len(),
            "rendered tracking metrics"
        );
        Ok(lines)
    }

    /// Exposition text: one line per metric, joined by `\n`.
    pub async fn render(&self) -> Result<String, BridgeError> {
        let lines = self.collect().await?;
        Ok(lines
            .iter()
            .map(ExposedLine::render)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Latest run of each experiment, in order of first appearance.
///
/// The run with the largest `end_time` wins; on a tie the lexicographically
/// smallest `run_id` is kept.
pub fn select_latest_runs(runs: &[TrackingRun]) -> Vec<&TrackingRun> {
    let mut order: Vec<&TrackingRun> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for run in runs {
        let exp_id = run.info.experiment_id.as_str();
        match slot.get(exp_id) {
            None => {
                slot.insert(exp_id, order.len());
                order.push(run);
            }
            Some(&i) => {
                let current = order[i];
                let newer = run.info.end_time > current.info.end_time
                    || (run.info.end_time == current.info.end_time
                        && run.info.run_id < current.info.run_id);
                if newer {
                    order[i] = run;
                }
            }
        }
    }
    order
}

/// One line per metric of `run`, labelled with its run id.
pub fn exposed_lines(run: &TrackingRun) -> Vec<ExposedLine> {
    run.data
        .metrics
        .iter()
        .map(|metric| ExposedLine {
            metric_name: format!("{METRIC_PREFIX}{}", metric.key),
            labels: vec![("run_id".to_string(), run.info.run_id.clone())],
            value: metric.value,
        })
        .collect()
}

/// Render a sample value.
///
/// Integral values keep one decimal (`2.0`), non-finite values use the
/// Prometheus spellings, everything else uses the shortest representation
/// that round-trips.
///
/// Unlike Python's `str(float)`, very small and very large magnitudes are
/// written positionally rather than in exponent form: `1e-05` renders as
/// `0.00001` and `1e16` as `10000000000000000`. Both parse to the same
/// sample value.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{MetricEntry, RunData, RunInfo};

    fn run(exp: &str, run_id: &str, end_time: i64, metrics: &[(&str, f64)]) -> TrackingRun {
        TrackingRun {
            info: RunInfo {
                run_id: run_id.into(),
                experiment_id: exp.into(),
                run_name: None,
                end_time,
                artifact_uri: String::new(),
                status: None,
            },
            data: RunData {
                metrics: metrics
                    .iter()
                    .map(|(k, v)| MetricEntry::new(*k, *v, 0))
                    .collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_latest_run_wins() {
        let runs = vec![
            run("1", "a", 100, &[]),
            run("1", "b", 200, &[]),
            run("1", "c", 150, &[]),
        ];
        let latest = select_latest_runs(&runs);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].info.run_id, "b");
    }

    #[test]
    fn test_tie_breaks_on_smallest_run_id() {
        let runs = vec![
            run("1", "zeta", 200, &[]),
            run("1", "alpha", 200, &[]),
            run("1", "mid", 200, &[]),
        ];
        assert_eq!(select_latest_runs(&runs)[0].info.run_id, "alpha");
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let runs = vec![
            run("7", "x", 1, &[]),
            run("3", "y", 1, &[]),
            run("7", "z", 2, &[]),
        ];
        let ids: Vec<_> = select_latest_runs(&runs)
            .iter()
            .map(|r| r.info.run_id.as_str())
            .collect();
        assert_eq!(ids, vec!["z", "y"]);
    }

    #[test]
    fn test_line_format() {
        let r = run("1", "abc", 1, &[("mse_local", 1.234)]);
        let lines = exposed_lines(&r);
        assert_eq!(lines[0].render(), r#"mlflow_mse_local{run_id="abc"} 1.234"#);
    }

    #[test]
    fn test_run_without_metrics_yields_no_lines() {
        assert!(exposed_lines(&run("1", "abc", 1, &[])).is_empty());
    }

    #[test]
    fn test_value_formatting() {
        assert_eq!(format_value(1.234), "1.234");
        assert_eq!(format_value(2.0), "2.0");
        assert_eq!(format_value(0.0), "0.0");
        assert_eq!(format_value(-3.5), "-3.5");
        assert_eq!(format_value(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_extreme_magnitudes_are_positional() {
        assert_eq!(format_value(1e-5), "0.00001");
        assert_eq!(format_value(1e16), "10000000000000000");
        assert_eq!(format_value(1e15), "1000000000000000.0");
        assert_eq!(format_value(1e-5).parse::<f64>().unwrap(), 1e-5);
    }

    #[test]
    fn test_label_escaping() {
        let line = ExposedLine {
            metric_name: "mlflow_x".into(),
            labels: vec![("run_id".into(), "a\"b\\c".into())],
            value: 1.5,
        };
        assert_eq!(line.render(), r#"mlflow_x{run_id="a\"b\\c"} 1.5"#);
    }
}
