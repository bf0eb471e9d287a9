//! Error types for the Goalcast core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering experiment configuration, the tracking store, the metrics
//! bridge, and application settings.

use std::path::PathBuf;

/// Top-level error type for the Goalcast core library.
#[derive(Debug, thiserror::Error)]
pub enum GoalcastError {
    #[error("Experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    #[error("Tracking store error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Metrics bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating an experiment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration file {} is not valid JSON: {message}", path.display())]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Invalid experiment configuration: {0}")]
    Validation(String),

    #[error("Unsupported model type: {model_type}")]
    UnsupportedModel { model_type: String },
}

impl ExperimentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors from talking to the experiment-tracking store.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Request to tracking store failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Tracking store returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Unsupported artifact location: {0}")]
    UnsupportedArtifactUri(String),

    #[error("Tracking store rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackingError {
    /// Whether the store reported that the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Status { status, body, .. } => {
                *status == 404 || body.contains("RESOURCE_DOES_NOT_EXIST")
            }
            _ => false,
        }
    }

    /// Whether the store reported that the resource is already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Status { body, .. } if body.contains("RESOURCE_ALREADY_EXISTS"))
    }
}

/// Errors from rendering the metrics exposition.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No experiments found in the tracking store")]
    NoExperiments,

    #[error("No runs found for experiments: {experiment_ids:?}")]
    NoRuns { experiment_ids: Vec<String> },

    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

/// Errors from resolving layered application settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to resolve settings: {0}")]
    Resolve(#[from] Box<figment::Error>),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}
