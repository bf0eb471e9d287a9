//! Error types for the goalcast-ml crate.

use goalcast_core::error::{ExperimentError, TrackingError};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for training, registration and batch operations.
#[derive(Debug, Error)]
pub enum MlError {
    /// The dataset could not be read or lacks a referenced column.
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    /// Training outlasted the run's time limit; nothing was registered.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Experiment(#[from] ExperimentError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }
}
