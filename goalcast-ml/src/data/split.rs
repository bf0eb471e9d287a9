//! Seeded train/test partition shared by both targets.

use crate::error::MlError;
use ndarray::{Array1, Array2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Row indices of the training and test partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Partition `n_rows` rows: `ceil(test_size * n)` go to the test set.
    ///
    /// The same `(n_rows, test_size, seed)` always yields the same partition.
    pub fn new(n_rows: usize, test_size: f64, seed: u64) -> Result<Self, MlError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(MlError::training(format!(
                "test_size must lie strictly between 0 and 1, got {test_size}"
            )));
        }
        let n_test = (test_size * n_rows as f64).ceil() as usize;
        if n_test == 0 || n_test >= n_rows {
            return Err(MlError::dataset(format!(
                "cannot split {n_rows} rows with test_size {test_size}: \
                 both partitions need at least one row"
            )));
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let train = indices.split_off(n_test);
        Ok(Self {
            train,
            test: indices,
        })
    }

    pub fn train_rows(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(0), &self.train)
    }

    pub fn test_rows(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(0), &self.test)
    }

    pub fn train_values(&self, y: &Array1<f64>) -> Array1<f64> {
        y.select(Axis(0), &self.train)
    }

    pub fn test_values(&self, y: &Array1<f64>) -> Array1<f64> {
        y.select(Axis(0), &self.test)
    }
}
