//! Dual-target training pipeline.
//!
//! One configuration produces one split, two models trained on the same
//! training rows, and one metric set computed on the same test rows.

use super::metrics::{MetricSet, evaluate};
use crate::data::{CsvSource, TrainTestSplit};
use crate::error::MlError;
use crate::models::{self, Regressor, TrainedPair};
use goalcast_core::experiment::ExperimentConfig;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One training row, logged as the input example of both models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

/// Everything a pipeline run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    pub metrics: MetricSet,
    pub models: TrainedPair,
    pub split: TrainTestSplit,
    pub input_sample: InputSample,
}

/// Load the dataset, split it once, train both targets and score them.
///
/// CPU-bound and blocking; async callers should run it on a blocking thread.
pub fn run(config: &ExperimentConfig) -> Result<PipelineOutput, MlError> {
    let dataset = &config.dataset;
    let table = CsvSource::new(&dataset.file_path).load()?;
    if table.row_count() < 2 {
        return Err(MlError::dataset(format!(
            "{} has {} data rows; at least 2 are needed to split",
            dataset.file_path.display(),
            table.row_count()
        )));
    }

    let x = table.matrix(&dataset.features)?;
    let y_local = table.column(dataset.local_target())?;
    let y_visitor = table.column(dataset.visitor_target())?;

    let split = TrainTestSplit::new(
        table.row_count(),
        config.training.test_size,
        config.training.random_state,
    )?;
    let x_train = split.train_rows(&x);
    let x_test = split.test_rows(&x);
    info!(
        run = %config.run_name,
        model = %config.model_type,
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        "training dual-target models"
    );

    let local = fit_target(config, &x_train, &split.train_values(&y_local))?;
    let visitor = fit_target(config, &x_train, &split.train_values(&y_visitor))?;

    let pred_local = local.predict(&x_test)?;
    let pred_visitor = visitor.predict(&x_test)?;
    let metrics = evaluate(
        &split.test_values(&y_local).to_vec(),
        &pred_local.to_vec(),
        &split.test_values(&y_visitor).to_vec(),
        &pred_visitor.to_vec(),
    )?;
    info!(
        run = %config.run_name,
        mse_local = metrics.get("mse_local"),
        mse_visitante = metrics.get("mse_visitante"),
        "evaluation complete"
    );

    let input_sample = InputSample {
        columns: dataset.features.clone(),
        values: x_train.row(0).to_vec(),
    };

    Ok(PipelineOutput {
        metrics,
        models: TrainedPair { local, visitor },
        split,
        input_sample,
    })
}

fn fit_target(
    config: &ExperimentConfig,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<Box<dyn Regressor>, MlError> {
    let mut model = models::build(config.model_params());
    model.fit(x, y)?;
    Ok(model)
}
