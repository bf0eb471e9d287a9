//! Declarative experiment configuration.
//!
//! One JSON file describes one dual-target training run: which regressor to
//! build, its hyperparameters, where the dataset lives, the two target
//! columns, and how to split rows into training and test sets.

pub mod params;

pub use params::{
    GradientBoostingParams, LinearRegressionParams, ModelParams, PoissonParams, PoissonSolver,
    RandomForestParams,
};

use crate::error::ExperimentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Closed set of supported regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "RandomForestRegressor")]
    RandomForest,
    #[serde(rename = "GradientBoostingRegressor")]
    GradientBoosting,
    #[serde(rename = "LinearRegression")]
    LinearRegression,
    #[serde(rename = "PoissonRegressor")]
    Poisson,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
        ModelKind::LinearRegression,
        ModelKind::Poisson,
    ];

    /// Identifier used in configuration files and tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "RandomForestRegressor",
            Self::GradientBoosting => "GradientBoostingRegressor",
            Self::LinearRegression => "LinearRegression",
            Self::Poisson => "PoissonRegressor",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ExperimentError::UnsupportedModel {
                model_type: s.to_string(),
            })
    }
}

/// Dataset location and column roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub file_path: PathBuf,
    pub features: Vec<String>,
    /// Exactly two columns: local first, visitor second.
    pub targets: Vec<String>,
}

impl DatasetSpec {
    pub fn local_target(&self) -> &str {
        &self.targets[0]
    }

    pub fn visitor_target(&self) -> &str {
        &self.targets[1]
    }
}

/// Train/test split settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSpec {
    pub test_size: f64,
    pub random_state: u64,
}

/// Raw shape of a configuration file; `model_type` is checked separately so
/// an unknown identifier surfaces as `UnsupportedModel`.
#[derive(Debug, Deserialize)]
struct RawExperimentConfig {
    model_type: String,
    run_name: String,
    experiment_name: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    dataset: DatasetSpec,
    training: TrainingSpec,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// A validated experiment configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfig {
    pub model_type: ModelKind,
    pub run_name: String,
    pub experiment_name: String,
    /// Parameters exactly as written, logged verbatim to the tracking store.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub dataset: DatasetSpec,
    pub training: TrainingSpec,
    pub tags: BTreeMap<String, String>,
    #[serde(skip)]
    model_params: ModelParams,
}

impl ExperimentConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ExperimentError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExperimentError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(ExperimentError::ConfigInvalid {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        Self::parse(path, &content)
    }

    /// Validate configuration text; `origin` is only used in error messages.
    pub fn parse(origin: &Path, content: &str) -> Result<Self, ExperimentError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| ExperimentError::ConfigInvalid {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
        let raw: RawExperimentConfig = serde_json::from_value(value)
            .map_err(|e| ExperimentError::validation(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawExperimentConfig) -> Result<Self, ExperimentError> {
        if raw.run_name.trim().is_empty() {
            return Err(ExperimentError::validation("run_name must not be empty"));
        }
        if raw.experiment_name.trim().is_empty() {
            return Err(ExperimentError::validation(
                "experiment_name must not be empty",
            ));
        }
        validate_dataset(&raw.dataset)?;
        validate_training(&raw.training)?;

        let model_type: ModelKind = raw.model_type.parse()?;
        let model_params = ModelParams::from_parameters(model_type, &raw.parameters)?;

        Ok(Self {
            model_type,
            run_name: raw.run_name,
            experiment_name: raw.experiment_name,
            parameters: raw.parameters,
            dataset: raw.dataset,
            training: raw.training,
            tags: raw.tags,
            model_params,
        })
    }

    /// Typed hyperparameters checked against the variant's schema.
    pub fn model_params(&self) -> &ModelParams {
        &self.model_params
    }
}

fn validate_dataset(dataset: &DatasetSpec) -> Result<(), ExperimentError> {
    if dataset.file_path.as_os_str().is_empty() {
        return Err(ExperimentError::validation(
            "dataset.file_path must not be empty",
        ));
    }
    if dataset.features.is_empty() {
        return Err(ExperimentError::validation(
            "dataset.features must list at least one column",
        ));
    }
    for (i, feature) in dataset.features.iter().enumerate() {
        if dataset.features[..i].contains(feature) {
            return Err(ExperimentError::validation(format!(
                "dataset.features lists '{feature}' more than once"
            )));
        }
    }
    if dataset.targets.len() != 2 {
        return Err(ExperimentError::validation(format!(
            "dataset.targets must name exactly two columns (local, visitor), got {}",
            dataset.targets.len()
        )));
    }
    if dataset.targets[0] == dataset.targets[1] {
        return Err(ExperimentError::validation(
            "dataset.targets must name two different columns",
        ));
    }
    Ok(())
}

fn validate_training(training: &TrainingSpec) -> Result<(), ExperimentError> {
    let t = training.test_size;
    if !(t > 0.0 && t < 1.0) {
        return Err(ExperimentError::validation(format!(
            "training.test_size must lie strictly between 0 and 1, got {t}"
        )));
    }
    Ok(())
}
