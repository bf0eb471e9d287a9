//! Model factory and the regressor family.
//!
//! Every supported `model_type` maps onto one [`Regressor`] implementation.
//! Parameters are checked against the variant's schema before anything is
//! constructed, so a typo in a configuration file fails early.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod poisson;
pub mod tree;

pub use boosting::GradientBoostingModel;
pub use forest::RandomForestModel;
pub use linear::LinearRegressionModel;
pub use poisson::PoissonModel;

use crate::error::MlError;
use goalcast_core::experiment::{ModelKind, ModelParams};
use ndarray::{Array1, Array2};

/// A trainable single-target regressor.
pub trait Regressor: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ModelKind;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError>;

    /// Fails when called before [`Regressor::fit`].
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError>;

    /// Fitted state as a JSON document, logged as the model file.
    fn to_artifact(&self) -> Result<serde_json::Value, MlError>;
}

/// Build an untrained regressor from a `model_type` identifier and its raw
/// parameters.
pub fn create(
    model_type: &str,
    parameters: &serde_json::Map<String, serde_json::Value>,
) -> Result<Box<dyn Regressor>, MlError> {
    let kind: ModelKind = model_type.parse()?;
    let params = ModelParams::from_parameters(kind, parameters)?;
    Ok(build(&params))
}

/// Build an untrained regressor from already-validated parameters.
pub fn build(params: &ModelParams) -> Box<dyn Regressor> {
    match params {
        ModelParams::RandomForest(p) => Box::new(RandomForestModel::new(p.clone())),
        ModelParams::GradientBoosting(p) => Box::new(GradientBoostingModel::new(p.clone())),
        ModelParams::LinearRegression(p) => Box::new(LinearRegressionModel::new(p.clone())),
        ModelParams::Poisson(p) => Box::new(PoissonModel::new(p.clone())),
    }
}

/// The two models of one run, trained on the same rows.
#[derive(Debug)]
pub struct TrainedPair {
    pub local: Box<dyn Regressor>,
    pub visitor: Box<dyn Regressor>,
}

pub(crate) fn not_fitted(kind: ModelKind) -> MlError {
    MlError::training(format!("{kind} used before fit"))
}

/// Shape checks shared by every `fit`.
pub(crate) fn check_fit_input(
    kind: ModelKind,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(), MlError> {
    if x.nrows() == 0 {
        return Err(MlError::training(format!("{kind}: no training rows")));
    }
    if x.nrows() != y.len() {
        return Err(MlError::training(format!(
            "{kind}: {} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_predict_input(
    kind: ModelKind,
    x: &Array2<f64>,
    n_features: usize,
) -> Result<(), MlError> {
    if x.ncols() != n_features {
        return Err(MlError::training(format!(
            "{kind}: fitted on {n_features} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}
