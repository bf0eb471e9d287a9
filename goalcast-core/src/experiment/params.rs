//! Per-variant hyperparameter schemas.
//!
//! Each regressor accepts a closed set of keys. Keys that only tune the
//! execution environment of other toolkits (`n_jobs`, `copy_X`) are accepted
//! so existing configuration files keep loading, but have no effect here.

use super::ModelKind;
use crate::error::ExperimentError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Typed parameters, one variant per supported regressor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelParams {
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
    LinearRegression(LinearRegressionParams),
    Poisson(PoissonParams),
}

impl ModelParams {
    /// Decode and range-check `parameters` against the schema for `kind`.
    pub fn from_parameters(
        kind: ModelKind,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ExperimentError> {
        let params = match kind {
            ModelKind::RandomForest => Self::RandomForest(decode(kind, parameters)?),
            ModelKind::GradientBoosting => Self::GradientBoosting(decode(kind, parameters)?),
            ModelKind::LinearRegression => Self::LinearRegression(decode(kind, parameters)?),
            ModelKind::Poisson => Self::Poisson(decode(kind, parameters)?),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::RandomForest(_) => ModelKind::RandomForest,
            Self::GradientBoosting(_) => ModelKind::GradientBoosting,
            Self::LinearRegression(_) => ModelKind::LinearRegression,
            Self::Poisson(_) => ModelKind::Poisson,
        }
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        match self {
            Self::RandomForest(p) => p.validate(),
            Self::GradientBoosting(p) => p.validate(),
            Self::LinearRegression(_) => Ok(()),
            Self::Poisson(p) => p.validate(),
        }
    }
}

fn decode<T: DeserializeOwned>(
    kind: ModelKind,
    parameters: &serde_json::Map<String, serde_json::Value>,
) -> Result<T, ExperimentError> {
    serde_json::from_value(serde_json::Value::Object(parameters.clone()))
        .map_err(|e| ExperimentError::validation(format!("{kind} parameters: {e}")))
}

fn out_of_range(kind: ModelKind, key: &str, rule: &str) -> ExperimentError {
    ExperimentError::validation(format!("{kind} parameter '{key}' {rule}"))
}

/// Bagged regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features considered at each split.
    pub max_features: f64,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    pub n_jobs: Option<i64>,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
            random_state: None,
            n_jobs: None,
        }
    }
}

impl RandomForestParams {
    fn validate(&self) -> Result<(), ExperimentError> {
        let kind = ModelKind::RandomForest;
        if self.n_estimators == 0 {
            return Err(out_of_range(kind, "n_estimators", "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(out_of_range(kind, "max_depth", "must be at least 1 or null"));
        }
        if self.min_samples_split < 2 {
            return Err(out_of_range(kind, "min_samples_split", "must be at least 2"));
        }
        if self.min_samples_leaf == 0 {
            return Err(out_of_range(kind, "min_samples_leaf", "must be at least 1"));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(out_of_range(kind, "max_features", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

/// Least-squares gradient boosting over regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: None,
        }
    }
}

impl GradientBoostingParams {
    fn validate(&self) -> Result<(), ExperimentError> {
        let kind = ModelKind::GradientBoosting;
        if self.n_estimators == 0 {
            return Err(out_of_range(kind, "n_estimators", "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(out_of_range(kind, "learning_rate", "must be positive"));
        }
        if self.max_depth == Some(0) {
            return Err(out_of_range(kind, "max_depth", "must be at least 1 or null"));
        }
        if self.min_samples_split < 2 {
            return Err(out_of_range(kind, "min_samples_split", "must be at least 2"));
        }
        if self.min_samples_leaf == 0 {
            return Err(out_of_range(kind, "min_samples_leaf", "must be at least 1"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(out_of_range(kind, "subsample", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

/// Ordinary (optionally non-negative) least squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearRegressionParams {
    pub fit_intercept: bool,
    /// Constrain every coefficient to be `>= 0`.
    pub positive: bool,
    #[serde(rename = "copy_X")]
    pub copy_x: bool,
    pub n_jobs: Option<i64>,
}

impl Default for LinearRegressionParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            positive: false,
            copy_x: true,
            n_jobs: None,
        }
    }
}

/// Optimiser requested for the Poisson GLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoissonSolver {
    #[default]
    Lbfgs,
    NewtonCholesky,
}

/// Poisson GLM with log link and L2 penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoissonParams {
    pub alpha: f64,
    pub fit_intercept: bool,
    pub max_iter: u64,
    pub tol: f64,
    pub solver: PoissonSolver,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
            max_iter: 100,
            tol: 1e-4,
            solver: PoissonSolver::Lbfgs,
        }
    }
}

impl PoissonParams {
    fn validate(&self) -> Result<(), ExperimentError> {
        let kind = ModelKind::Poisson;
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(out_of_range(kind, "alpha", "must be non-negative"));
        }
        if self.max_iter == 0 {
            return Err(out_of_range(kind, "max_iter", "must be at least 1"));
        }
        if !(self.tol > 0.0 && self.tol.is_finite()) {
            return Err(out_of_range(kind, "tol", "must be positive"));
        }
        Ok(())
    }
}
