//! Least-squares gradient boosting over regression trees.

use super::tree::{RegressionTree, TreeOptions};
use super::{Regressor, check_fit_input, check_predict_input, not_fitted};
use crate::error::MlError;
use goalcast_core::experiment::{GradientBoostingParams, ModelKind};
use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng, seq::index};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GradientBoostingModel {
    params: GradientBoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostingModel {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    fn raw_prediction(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        self.init
            + self.params.learning_rate
                * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

impl Regressor for GradientBoostingModel {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        check_fit_input(self.kind(), x, y)?;
        let n = x.nrows();
        let seed = self.params.random_state.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let options = TreeOptions {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: 1.0,
        };
        let sample_size = ((self.params.subsample * n as f64).round() as usize).clamp(1, n);

        let init = y.mean().unwrap_or(0.0);
        let mut current = vec![init; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, f)| t - f).collect();
            let rows: Vec<usize> = if sample_size < n {
                index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };
            let tree = RegressionTree::fit(x, &residuals, &rows, &options, &mut rng);
            for (i, row) in x.rows().into_iter().enumerate() {
                current[i] += self.params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.init = init;
        self.trees = trees;
        self.n_features = x.ncols();
        debug!(stages = self.trees.len(), seed, "gradient boosting fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.kind()));
        }
        check_predict_input(self.kind(), x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| self.raw_prediction(row)).collect())
    }

    fn to_artifact(&self) -> Result<serde_json::Value, MlError> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.kind()));
        }
        Ok(json!({
            "model_type": self.kind(),
            "params": self.params,
            "init": self.init,
            "n_features": self.n_features,
            "trees": self.trees,
        }))
    }
}
