//! Batch orchestration: discover configurations, pick a subset, execute
//! each one in isolation, and tally the results.

pub mod discovery;
pub mod runner;
pub mod worker;

pub use discovery::{BatchFilter, ConfigSummary, discover, group_by_model, select};
pub use runner::{BatchReport, BatchRunner};
pub use worker::{InProcessWorker, SubprocessWorker, WorkOutcome, WorkStatus, Worker};

use std::path::PathBuf;

/// What a batch invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    /// List configurations grouped by model type; executes nothing.
    List,
    RunAll,
    RunFiltered(BatchFilter),
}

/// Configurations `command` would execute, in discovery order.
pub fn plan(command: &BatchCommand, summaries: &[ConfigSummary]) -> Vec<PathBuf> {
    match command {
        BatchCommand::List => Vec::new(),
        BatchCommand::RunAll => summaries.iter().map(|s| s.path.clone()).collect(),
        BatchCommand::RunFiltered(filter) => select(summaries, filter)
            .into_iter()
            .map(|s| s.path.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summaries() -> Vec<ConfigSummary> {
        [("LR_config_01.json", "LinearRegression"), ("PR_config_01.json", "PoissonRegressor")]
            .into_iter()
            .map(|(p, m)| ConfigSummary {
                path: PathBuf::from(p),
                model_type: m.into(),
                run_name: "r".into(),
                experiment_name: "e".into(),
            })
            .collect()
    }

    #[test]
    fn test_plan() {
        let all = summaries();
        assert!(plan(&BatchCommand::List, &all).is_empty());
        assert_eq!(plan(&BatchCommand::RunAll, &all).len(), 2);
        let filtered = plan(
            &BatchCommand::RunFiltered(BatchFilter {
                pattern: None,
                model_type: Some("poisson".into()),
            }),
            &all,
        );
        assert_eq!(filtered, vec![PathBuf::from("PR_config_01.json")]);
    }
}
