//! Tabular data loading and the deterministic train/test split.

pub mod source;
pub mod split;

pub use source::{CsvSource, DataTable};
pub use split::TrainTestSplit;
