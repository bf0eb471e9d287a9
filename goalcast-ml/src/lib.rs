//! # goalcast-ml: dual-target training, run registration and batch execution
//!
//! A configuration file names a regressor, its parameters, a CSV dataset
//! with two targets, and a split. [`training::execute_config`] trains one
//! model per target on a shared split, scores both, and records the run
//! and its two registered models in a tracking store. [`batch`] runs many
//! configurations with per-run isolation.

pub mod batch;
pub mod data;
pub mod error;
pub mod models;
pub mod training;

pub use batch::{BatchCommand, BatchFilter, BatchReport, BatchRunner, ConfigSummary};
pub use error::MlError;
pub use models::{Regressor, TrainedPair};
pub use training::{MetricSet, PipelineOutput, execute_config, execute_config_within};
