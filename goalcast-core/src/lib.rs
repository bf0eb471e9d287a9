//! # Goalcast Core
//!
//! Core library for Goalcast.
//! Provides experiment configuration, the tracking-store abstraction with its
//! MLflow client, the Prometheus metrics bridge, and layered settings.

pub mod bridge;
pub mod error;
pub mod experiment;
pub mod settings;
pub mod tracking;

// Re-export commonly used types at the crate root.
pub use bridge::{ExposedLine, MetricsBridge};
pub use error::{BridgeError, ExperimentError, GoalcastError, SettingsError, TrackingError};
pub use experiment::{DatasetSpec, ExperimentConfig, ModelKind, TrainingSpec};
pub use experiment::params::ModelParams;
pub use settings::{Isolation, Settings, load_settings};
pub use tracking::{InMemoryTrackingStore, MlflowClient, TrackingStore};

/// Result alias for Goalcast core operations.
pub type Result<T> = std::result::Result<T, GoalcastError>;
