//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use goalcast_core::bridge::{ExposedLine, format_value, select_latest_runs};
use goalcast_core::experiment::ExperimentConfig;
use goalcast_core::tracking::{RunData, RunInfo, TrackingRun};

fn run(exp: u8, id: String, end_time: i64) -> TrackingRun {
    TrackingRun {
        info: RunInfo {
            run_id: id,
            experiment_id: exp.to_string(),
            run_name: None,
            end_time,
            artifact_uri: String::new(),
            status: None,
        },
        data: RunData::default(),
    }
}

// --- Value formatting properties ---

proptest! {
    #[test]
    fn finite_values_round_trip(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        let rendered = format_value(value);
        let parsed: f64 = rendered.parse().unwrap();
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn integral_values_keep_one_decimal(value in -1_000_000i64..1_000_000) {
        let rendered = format_value(value as f64);
        prop_assert!(rendered.ends_with(".0"), "{}", rendered);
    }

    #[test]
    fn rendered_line_has_name_labels_value(
        key in "[a-z_]{1,20}",
        id in "[a-f0-9]{32}",
        value in -1e6f64..1e6,
    ) {
        let line = ExposedLine {
            metric_name: format!("mlflow_{key}"),
            labels: vec![("run_id".into(), id.clone())],
            value,
        }
        .render();
        let expected_prefix = format!("mlflow_{key}{{run_id=\"{id}\"}} ");
        prop_assert!(line.starts_with(&expected_prefix));
        prop_assert!(!line.contains('\n'));
    }
}

// --- Latest-run selection properties ---

proptest! {
    #[test]
    fn one_run_per_experiment_with_max_end_time(
        entries in prop::collection::vec((0u8..5, 0i64..50), 1..40),
    ) {
        let runs: Vec<TrackingRun> = entries
            .iter()
            .enumerate()
            .map(|(i, (exp, end))| run(*exp, format!("run{i:03}"), *end))
            .collect();
        let latest = select_latest_runs(&runs);

        let mut seen = std::collections::HashSet::new();
        for chosen in &latest {
            prop_assert!(seen.insert(chosen.info.experiment_id.clone()));
            let max_end = runs
                .iter()
                .filter(|r| r.info.experiment_id == chosen.info.experiment_id)
                .map(|r| r.info.end_time)
                .max()
                .unwrap();
            prop_assert_eq!(chosen.info.end_time, max_end);
        }
        let distinct: std::collections::HashSet<_> =
            runs.iter().map(|r| r.info.experiment_id.clone()).collect();
        prop_assert_eq!(latest.len(), distinct.len());
    }

    #[test]
    fn selection_ignores_input_order(
        entries in prop::collection::vec((0u8..3, 0i64..5), 1..20),
    ) {
        let build = |entries: &[(u8, i64)]| -> Vec<TrackingRun> {
            entries
                .iter()
                .enumerate()
                .map(|(i, (exp, end))| run(*exp, format!("run{i:03}-{exp}-{end}"), *end))
                .collect()
        };
        let forward = build(&entries);
        let mut picked: Vec<String> = select_latest_runs(&forward)
            .iter()
            .map(|r| r.info.run_id.clone())
            .collect();
        picked.sort();

        let mut reversed = forward.clone();
        reversed.reverse();
        let mut picked_rev: Vec<String> = select_latest_runs(&reversed)
            .iter()
            .map(|r| r.info.run_id.clone())
            .collect();
        picked_rev.sort();
        prop_assert_eq!(picked, picked_rev);
    }
}

// --- Experiment configuration parsing ---

proptest! {
    #[test]
    fn test_size_outside_open_interval_is_rejected(test_size in prop_oneof![-5.0f64..=0.0, 1.0f64..5.0]) {
        let doc = format!(
            r#"{{
                "model_type": "LinearRegression",
                "run_name": "r",
                "experiment_name": "e",
                "parameters": {{}},
                "dataset": {{"file_path": "d.csv", "features": ["a"], "targets": ["l", "v"]}},
                "training": {{"test_size": {test_size:?}, "random_state": 1}}
            }}"#
        );
        prop_assert!(ExperimentConfig::parse(std::path::Path::new("prop.json"), &doc).is_err());
    }
}
